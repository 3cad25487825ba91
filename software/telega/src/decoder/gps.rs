//! Sentence decoder for the GPS module.
//!
//! Only `$GPGLL` (geographic position) sentences are retained. Other sentence
//! types are skipped silently since the module emits several kinds per fix.

use std::fmt;

use serde::{Deserialize, Serialize};

use telega_shared::gps::{
    CHECKSUM_SEPARATOR, GPGLL, GPGLL_XOR, ID_LEN, MAX_SENTENCE_LEN, START, hex_value,
};

use super::{Decoded, Decoder, Output};
use crate::message::Message;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    WantStart,
    WantTalkerId,
    WantBody,
    WantChecksumHi,
    WantChecksumLo,
}

/// A checksum-validated `$GPGLL` sentence, including the `*HH` suffix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedSentence(String);

/// Position fix parsed from a `$GPGLL` sentence, in signed decimal degrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Positive north
    pub latitude: f64,
    /// Positive east
    pub longitude: f64,
    /// UTC time of the fix as `hhmmss.ss`, if reported
    pub utc: Option<String>,
    /// Status field was `A` (data valid)
    pub valid: bool,
}

impl DecodedSentence {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Parse the fix, or `None` if the module has no position yet
    /// (empty latitude/longitude fields) or the fields are malformed.
    pub fn position(&self) -> Option<Position> {
        let body = self.0.split('*').next()?;
        let fields: Vec<&str> = body.split(',').collect();
        let latitude = parse_coordinate(fields.get(1)?, fields.get(2)?, 'N', 'S')?;
        let longitude = parse_coordinate(fields.get(3)?, fields.get(4)?, 'E', 'W')?;
        let utc = fields
            .get(5)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        let valid = fields.get(6).is_some_and(|s| s.starts_with('A'));
        Some(Position {
            latitude,
            longitude,
            utc,
            valid,
        })
    }
}

impl fmt::Display for DecodedSentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convert `dddmm.mmmm` plus hemisphere into signed decimal degrees.
fn parse_coordinate(value: &str, hemisphere: &str, positive: char, negative: char) -> Option<f64> {
    let raw: f64 = value.parse().ok()?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let magnitude = degrees + minutes / 60.0;
    match hemisphere.chars().next()? {
        c if c == positive => Some(magnitude),
        c if c == negative => Some(-magnitude),
        _ => None,
    }
}

/// Reconstructs `$GPGLL` sentences validated by their XOR checksum.
#[derive(Debug, Default)]
pub struct SentenceDecoder {
    stage: Stage,
    sentence: Vec<u8>,
    checksum: u8,
}

impl SentenceDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn begin(&mut self) {
        self.reset();
        self.sentence.push(START);
        self.stage = Stage::WantTalkerId;
    }

    fn finish(&mut self) -> Option<Output> {
        let n = self.sentence.len();
        let (hi, lo) = (self.sentence[n - 2], self.sentence[n - 1]);
        let received = hex_value(hi).zip(hex_value(lo)).map(|(h, l)| h * 16 + l);
        let text = String::from_utf8_lossy(&self.sentence).into_owned();

        if received == Some(self.checksum) {
            Some(Output::Decoded(Decoded::Sentence(DecodedSentence(text))))
        } else {
            Some(Output::Message(Message::warning(format!(
                "GPS sentence dropped: checksum mismatch in `{text}`, received {}{}, computed {:02X}",
                hi as char, lo as char, self.checksum
            ))))
        }
    }
}

impl Decoder for SentenceDecoder {
    fn feed(&mut self, byte: u8) -> Option<Output> {
        // A start byte anywhere abandons the current sentence
        if byte == START {
            self.begin();
            return None;
        }

        match self.stage {
            Stage::WantStart => None,
            Stage::WantTalkerId => {
                self.sentence.push(byte);
                if self.sentence.len() == 1 + ID_LEN {
                    if &self.sentence[1..] == GPGLL {
                        self.checksum = GPGLL_XOR;
                        self.stage = Stage::WantBody;
                    } else {
                        self.reset();
                    }
                }
                None
            }
            Stage::WantBody => {
                if byte == CHECKSUM_SEPARATOR {
                    self.sentence.push(byte);
                    self.stage = Stage::WantChecksumHi;
                } else if self.sentence.len() + 3 >= MAX_SENTENCE_LEN {
                    // No room left for `*HH`
                    self.reset();
                } else {
                    self.checksum ^= byte;
                    self.sentence.push(byte);
                }
                None
            }
            Stage::WantChecksumHi => {
                self.sentence.push(byte);
                self.stage = Stage::WantChecksumLo;
                None
            }
            Stage::WantChecksumLo => {
                self.sentence.push(byte);
                let out = self.finish();
                self.reset();
                out
            }
        }
    }

    fn reset(&mut self) {
        self.stage = Stage::WantStart;
        self.sentence.clear();
        self.checksum = 0;
    }

    fn is_idle(&self) -> bool {
        self.stage == Stage::WantStart
    }
}
