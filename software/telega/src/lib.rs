//! Serial telemetry acquisition for an inertial sensor board and a GPS module.
//!
//! A [`Pipeline`] owns one serial [`link::Port`] and, while a session runs,
//! three threads connected by channels: a reader that owns the port, a decoder
//! that turns bytes into records or sentences, and a collector that logs raw
//! bytes and hands results to a [`Listener`].

pub mod actor;
pub mod collector;
pub mod command;
pub mod decoder;
pub mod device;
pub mod error;
pub mod link;
pub mod logging;
pub mod message;
pub mod pipeline;

pub use collector::{ChannelListener, LatestValueListener, Listener, ListenerEvent};
pub use command::Command;
pub use decoder::{Decoded, DecodedRecord, DecodedSentence, Position};
pub use device::DeviceKind;
pub use error::{Error, Result};
pub use message::{Message, Severity};
pub use pipeline::{Pipeline, PipelineCtx, PipelineState, SessionReport};
