//! Kinds of devices a pipeline can read from.

use std::fmt;

use serde::{Deserialize, Serialize};

use telega_shared::{gps, stm};

use crate::decoder::{Decoder, FrameDecoder, SentenceDecoder};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Inertial board speaking the checksummed binary framing
    #[default]
    Stm,
    /// GPS module emitting NMEA sentences
    Gps,
}

impl DeviceKind {
    /// Short tag used in file names and error callbacks.
    pub fn tag(self) -> &'static str {
        match self {
            DeviceKind::Stm => "STM",
            DeviceKind::Gps => "GPS",
        }
    }

    pub fn default_baud_rate(self) -> u32 {
        match self {
            DeviceKind::Stm => stm::BAUD_RATE,
            DeviceKind::Gps => gps::BAUD_RATE,
        }
    }

    /// Extension of the raw session log.
    /// The GPS stream is plain text, so its log is readable as-is.
    pub fn log_extension(self) -> &'static str {
        match self {
            DeviceKind::Stm => "bin",
            DeviceKind::Gps => "txt",
        }
    }

    /// A fresh decoder for this device's wire format.
    pub fn decoder(self) -> Box<dyn Decoder> {
        match self {
            DeviceKind::Stm => Box::new(FrameDecoder::new()),
            DeviceKind::Gps => Box::new(SentenceDecoder::new()),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
