//! Decode a captured session log without a device attached.

use std::fs;
use std::path::Path;

use super::{Decoded, Output};
use crate::device::DeviceKind;
use crate::error::Result;
use crate::message::Message;

/// Everything a decoder produced from a byte stream, in order of appearance
/// within each list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Replay {
    pub decoded: Vec<Decoded>,
    pub messages: Vec<Message>,
    /// Bytes left in an unfinished frame or sentence at the end of the stream
    pub trailing: bool,
}

/// Run `bytes` through a fresh decoder for `device`.
pub fn decode_bytes(device: DeviceKind, bytes: &[u8]) -> Replay {
    let mut decoder = device.decoder();
    let mut replay = Replay::default();
    for b in bytes {
        match decoder.feed(*b) {
            Some(Output::Decoded(d)) => replay.decoded.push(d),
            Some(Output::Message(m)) => replay.messages.push(m),
            None => {}
        }
    }
    replay.trailing = !decoder.is_idle();
    replay
}

/// Decode a raw session log as written by the collector.
pub fn decode_log_file(device: DeviceKind, path: &Path) -> Result<Replay> {
    let bytes = fs::read(path)?;
    Ok(decode_bytes(device, &bytes))
}
