//! Frame decoder for the inertial board.

use serde::{Deserialize, Serialize};

use telega_shared::stm::{
    COMMAND_BODY_LEN, FORMAT_COMMAND, FORMAT_DATA, INITIAL_SETTING_DONE, SYNC_1, SYNC_2, mod_code,
};

use super::{Decoded, Decoder, Output};
use crate::command::STOP_INITIAL_SETTING;
use crate::error::Error;
use crate::message::Message;

/// Names of the board's channels in frame order.
/// Channels past these are named `Channel_<index>`.
pub const CHANNEL_NAMES: [&str; 8] = [
    "Time", "Acc_X", "Acc_Y", "Acc_Z", "Gyro_X", "Gyro_Y", "Gyro_Z", "Temp",
];

/// Stage of frame reconstruction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    WantSync1,
    WantSync2,
    WantFormat,
    WantSize,
    WantBody,
    WantChecksum,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameKind {
    /// Fixed 2-byte command echo
    Command,
    /// Sized body of little-endian channel values
    #[default]
    Data,
}

/// One decoded data frame: named channels in frame order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedRecord {
    channels: Vec<(String, f64)>,
}

impl DecodedRecord {
    /// Decode a data frame body of little-endian sign-folded pairs.
    ///
    /// The first channel is a time counter in quarter units and the last one
    /// is a temperature in hundredths; the rest are in thousandths.
    /// Returns `None` if the body has odd length.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        if body.len() % 2 != 0 {
            return None;
        }
        let n = body.len() / 2;
        let channels = body
            .chunks_exact(2)
            .enumerate()
            .map(|(i, pair)| {
                let raw = mod_code(pair[0], pair[1]) as f64;
                let value = if i == 0 {
                    raw * 0.25
                } else if i == n - 1 {
                    raw / 100.0
                } else {
                    raw / 1000.0
                };
                (channel_name(i), value)
            })
            .collect();
        Some(Self { channels })
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.channels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.channels.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn names(&self) -> Vec<String> {
        self.channels.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.channels.iter().map(|(_, v)| *v).collect()
    }
}

fn channel_name(i: usize) -> String {
    match CHANNEL_NAMES.get(i) {
        Some(name) => (*name).to_owned(),
        None => format!("Channel_{i}"),
    }
}

/// Reconstructs checksummed frames from the board's byte stream.
///
/// The running checksum is the sum of every byte of the frame from the first
/// sync byte through the last body byte, compared against the low byte of
/// that sum when the checksum byte arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    stage: Stage,
    kind: FrameKind,
    sum: u32,
    size: usize,
    body: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn accumulate(&mut self, byte: u8) {
        self.sum += byte as u32;
    }

    /// Interpret a frame whose checksum has validated.
    fn complete(&mut self) -> Option<Output> {
        match self.kind {
            FrameKind::Data => match DecodedRecord::from_body(&self.body) {
                Some(record) => Some(Output::Decoded(Decoded::Record(record))),
                None => Some(Output::Message(Message::warning(format!(
                    "STM data frame with odd length {} dropped",
                    self.body.len()
                )))),
            },
            FrameKind::Command => {
                // Other echoes carry nothing the host acts on
                (self.body[..] == INITIAL_SETTING_DONE)
                    .then(|| Output::Message(Message::command(STOP_INITIAL_SETTING)))
            }
        }
    }
}

impl Decoder for FrameDecoder {
    fn feed(&mut self, byte: u8) -> Option<Output> {
        match self.stage {
            Stage::WantSync1 => {
                if byte == SYNC_1 {
                    self.reset();
                    self.accumulate(byte);
                    self.stage = Stage::WantSync2;
                }
                None
            }
            Stage::WantSync2 => {
                if byte == SYNC_2 {
                    self.accumulate(byte);
                    self.stage = Stage::WantFormat;
                    None
                } else {
                    // The mismatching byte may itself start the next frame
                    self.reset();
                    self.feed(byte)
                }
            }
            Stage::WantFormat => {
                self.accumulate(byte);
                match byte {
                    FORMAT_COMMAND => {
                        self.kind = FrameKind::Command;
                        self.size = COMMAND_BODY_LEN;
                        self.stage = Stage::WantBody;
                        None
                    }
                    FORMAT_DATA => {
                        self.kind = FrameKind::Data;
                        self.stage = Stage::WantSize;
                        None
                    }
                    other => {
                        self.reset();
                        Some(Output::Message(Message::warning(format!(
                            "STM frame with unknown format {other:#04x} dropped"
                        ))))
                    }
                }
            }
            Stage::WantSize => {
                self.accumulate(byte);
                self.size = byte as usize;
                self.stage = if self.size == 0 {
                    Stage::WantChecksum
                } else {
                    Stage::WantBody
                };
                None
            }
            Stage::WantBody => {
                self.accumulate(byte);
                self.body.push(byte);
                if self.body.len() == self.size {
                    self.stage = Stage::WantChecksum;
                }
                None
            }
            Stage::WantChecksum => {
                let computed = (self.sum & 0xFF) as u8;
                let out = if byte == computed {
                    self.complete()
                } else {
                    let err = Error::ChecksumMismatch {
                        computed,
                        received: byte,
                    };
                    Some(Output::Message(Message::warning(format!(
                        "STM frame dropped: {err}"
                    ))))
                };
                self.reset();
                out
            }
        }
    }

    fn reset(&mut self) {
        self.stage = Stage::WantSync1;
        self.kind = FrameKind::default();
        self.sum = 0;
        self.size = 0;
        self.body.clear();
    }

    fn is_idle(&self) -> bool {
        self.stage == Stage::WantSync1
    }
}
