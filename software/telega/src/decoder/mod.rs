//! Byte-stream decoders for the two device protocols.
//!
//! Each decoder is a state machine fed one byte at a time. Every completed or
//! failed unit (frame or sentence) returns the decoder to its initial stage, so
//! a corrupted byte cannot desynchronize it beyond the unit it belongs to.

pub mod gps;
pub mod replay;
pub mod stm;

use serde::{Deserialize, Serialize};

use crate::message::Message;

pub use gps::{DecodedSentence, Position, SentenceDecoder};
pub use replay::{Replay, decode_bytes, decode_log_file};
pub use stm::{DecodedRecord, FrameDecoder};

/// A validated unit of telemetry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Decoded {
    Record(DecodedRecord),
    Sentence(DecodedSentence),
}

/// Result of feeding one byte to a decoder.
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    Decoded(Decoded),
    Message(Message),
}

/// Byte-at-a-time decoder for one device protocol.
pub trait Decoder: Send {
    /// Advance the state machine by one byte.
    fn feed(&mut self, byte: u8) -> Option<Output>;

    /// Drop any partial unit and return to the initial stage.
    fn reset(&mut self);

    /// Whether the decoder is waiting for the start of a new unit.
    fn is_idle(&self) -> bool;
}
