//! Binary framing used by the inertial board.
//!
//! Every frame starts with the two sync bytes, followed by a format byte.
//! Command frames carry a fixed 2-byte body; data frames carry a size byte
//! and then `size` bytes of little-endian channel values. The frame ends
//! with the low byte of the sum of every preceding byte in the frame.
//!
//! ```text
//! 7E E7 FF <hi> <lo> <sum>              command (host -> board, and echoes)
//! 7E E7 C8 <size> <body...> <sum>       data (board -> host)
//! 7E E7 FF AA AA B8 00 00               confirmation (board -> host)
//! ```
use byte_struct::*;

use crate::enum_with_unknown;

/// First sync byte of every frame
pub const SYNC_1: u8 = 0x7E;

/// Second sync byte of every frame
pub const SYNC_2: u8 = 0xE7;

/// Format byte selecting a command frame with a fixed-size body
pub const FORMAT_COMMAND: u8 = 0xFF;

/// Format byte selecting a data frame with an explicit body size
pub const FORMAT_DATA: u8 = 0xC8;

/// Body length of a command frame
pub const COMMAND_BODY_LEN: usize = 2;

/// Command echo sent by the board when the initial setting has finished
pub const INITIAL_SETTING_DONE: [u8; COMMAND_BODY_LEN] = [0xBA, 0xAB];

/// Serial baud rate of the inertial board
pub const BAUD_RATE: u32 = 115_200;

/// Length of a data frame with a body of `body_len` bytes,
/// including sync, format, size and checksum bytes.
pub const fn data_frame_len(body_len: usize) -> usize {
    body_len + 5
}

enum_with_unknown!(
    /// Command codes understood by the board, sent high byte first.
    pub enum CommandCode(u16) {
        Restart = 0xFF00,
        StartInitialSetting = 0xABBA,
        StartMeasuring = 0xBCCB,
        StopMeasuring = 0xCDDC,
    }
);

impl ByteStructLen for CommandCode {
    const BYTE_LEN: usize = 2;
}

impl ByteStruct for CommandCode {
    fn read_bytes(bytes: &[u8]) -> Self {
        Self::from(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn write_bytes(&self, bytes: &mut [u8]) {
        bytes[..2].copy_from_slice(&u16::from(*self).to_be_bytes());
    }
}

/// Host -> board command frame
#[derive(ByteStruct, Clone, Copy, Debug, PartialEq, Eq)]
#[byte_struct_be]
pub struct CommandFrame {
    pub sync: [u8; 2],
    pub format: u8,
    pub code: CommandCode,
    pub checksum: u8,
}

impl CommandFrame {
    /// Build a frame for `code` with a valid checksum.
    pub fn new(code: CommandCode) -> Self {
        let mut frame = Self {
            sync: [SYNC_1, SYNC_2],
            format: FORMAT_COMMAND,
            code,
            checksum: 0,
        };
        let bytes = frame.to_bytes();
        frame.checksum = checksum(&bytes[..Self::BYTE_LEN - 1]);
        frame
    }

    pub fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut buf = [0_u8; Self::BYTE_LEN];
        self.write_bytes(&mut buf);
        buf
    }

    /// Check framing and checksum.
    pub fn is_valid(&self) -> bool {
        let bytes = self.to_bytes();
        self.sync == [SYNC_1, SYNC_2]
            && self.format == FORMAT_COMMAND
            && checksum(&bytes[..Self::BYTE_LEN - 1]) == self.checksum
    }
}

/// Board -> host acknowledgment of a command frame.
#[derive(ByteStruct, Clone, Copy, Debug, PartialEq, Eq)]
#[byte_struct_be]
pub struct ConfirmationFrame {
    pub sync: [u8; 2],
    pub format: u8,
    pub status: u16,
    pub checksum: u8,
    pub reserved: [u8; 2],
}

impl ConfirmationFrame {
    /// Status word of a positive acknowledgment
    pub const ACK_STATUS: u16 = 0xAAAA;

    /// The only confirmation the board sends on success.
    pub const fn ack() -> Self {
        Self {
            sync: [SYNC_1, SYNC_2],
            format: FORMAT_COMMAND,
            status: Self::ACK_STATUS,
            checksum: 0xB8,
            reserved: [0, 0],
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut buf = [0_u8; Self::BYTE_LEN];
        self.write_bytes(&mut buf);
        buf
    }

    /// Whether `bytes` is exactly the positive acknowledgment.
    pub fn is_ack(bytes: &[u8]) -> bool {
        bytes.len() == Self::BYTE_LEN && Self::read_bytes(bytes) == Self::ack()
    }
}

/// Low byte of the arithmetic sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0_u8, |acc, b| acc.wrapping_add(*b))
}

/// Decode the board's sign-folded 16-bit value.
///
/// Bit 15 is a sign flag and the magnitude is stored with its low 15 bits
/// inverted, so this is not two's complement.
pub fn mod_code(low: u8, high: u8) -> i32 {
    let v = (high as i32) * 256 + low as i32;
    if v & 0x8000 != 0 {
        -((v & 0x7FFF) ^ 0x7FFF)
    } else {
        v
    }
}

/// Inverse of [`mod_code`] for values in `-32767..=32767`, returning `(low, high)`.
pub fn encode_mod_code(value: i32) -> (u8, u8) {
    let raw: u16 = if value >= 0 {
        (value as u16) & 0x7FFF
    } else {
        0x8000 | (((-value) as u16 & 0x7FFF) ^ 0x7FFF)
    };
    let [low, high] = raw.to_le_bytes();
    (low, high)
}

/// Write a complete data frame for `body` into `out`,
/// returning the number of bytes written, or `None` if
/// the body does not fit in a frame or `out` is too short.
pub fn write_data_frame(body: &[u8], out: &mut [u8]) -> Option<usize> {
    let size = u8::try_from(body.len()).ok()?;
    let n = data_frame_len(body.len());
    if out.len() < n {
        return None;
    }
    out[0] = SYNC_1;
    out[1] = SYNC_2;
    out[2] = FORMAT_DATA;
    out[3] = size;
    out[4..4 + body.len()].copy_from_slice(body);
    out[n - 1] = checksum(&out[..n - 1]);
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_frames_match_board_firmware() {
        let cases = [
            (CommandCode::Restart, [0x7E, 0xE7, 0xFF, 0xFF, 0x00, 0x63]),
            (CommandCode::StartInitialSetting, [0x7E, 0xE7, 0xFF, 0xAB, 0xBA, 0xC9]),
            (CommandCode::StartMeasuring, [0x7E, 0xE7, 0xFF, 0xBC, 0xCB, 0xEB]),
            (CommandCode::StopMeasuring, [0x7E, 0xE7, 0xFF, 0xCD, 0xDC, 0x0D]),
        ];
        for (code, expected) in cases {
            let frame = CommandFrame::new(code);
            assert_eq!(frame.to_bytes(), expected, "wrong frame for {code:?}");
            assert!(frame.is_valid());
            assert_eq!(CommandFrame::read_bytes(&expected), frame);
        }
    }

    #[test]
    fn unknown_command_code_survives_conversion() {
        let code = CommandCode::from(0x1234);
        assert_eq!(code, CommandCode::Unknown(0x1234));
        assert_eq!(u16::from(code), 0x1234);
    }

    #[test]
    fn confirmation_is_fixed() {
        let ack = ConfirmationFrame::ack().to_bytes();
        assert_eq!(ack, [0x7E, 0xE7, 0xFF, 0xAA, 0xAA, 0xB8, 0x00, 0x00]);
        assert_eq!(checksum(&ack[..5]), ack[5]);
        assert!(ConfirmationFrame::is_ack(&ack));
        assert!(!ConfirmationFrame::is_ack(&ack[..7]));

        let mut nak = ack;
        nak[4] = 0x55;
        assert!(!ConfirmationFrame::is_ack(&nak));
    }

    #[test]
    fn mod_code_folds_sign_bit() {
        assert_eq!(mod_code(0x00, 0x00), 0);
        assert_eq!(mod_code(0x64, 0x00), 100);
        assert_eq!(mod_code(0xFF, 0x7F), 32767);
        // Bit 15 set: low 15 bits are inverted then negated
        assert_eq!(mod_code(0xFF, 0xFF), 0);
        assert_eq!(mod_code(0xFE, 0xFF), -1);
        assert_eq!(mod_code(0x00, 0x80), -32767);

        for raw in 0x8000_u32..=0xFFFF {
            let (low, high) = ((raw & 0xFF) as u8, (raw >> 8) as u8);
            let v = mod_code(low, high);
            assert!(v <= 0);
            assert_eq!(v, -(((raw as i32) & 0x7FFF) ^ 0x7FFF));
        }
    }

    #[test]
    fn encode_mod_code_inverts_decoding() {
        for v in [-32767, -1000, -1, 0, 1, 250, 32767] {
            let (low, high) = encode_mod_code(v);
            assert_eq!(mod_code(low, high), v);
        }
    }

    #[test]
    fn data_frame_checksum_covers_header() {
        let mut buf = [0_u8; 16];
        let n = write_data_frame(&[0x00, 0x00, 0x64, 0x00], &mut buf).unwrap();
        assert_eq!(n, 9);
        let sum = 0x7E_u32 + 0xE7 + 0xC8 + 0x04 + 0x64;
        assert_eq!(&buf[..n], &[0x7E, 0xE7, 0xC8, 0x04, 0x00, 0x00, 0x64, 0x00, (sum & 0xFF) as u8]);

        assert!(write_data_frame(&[0; 12], &mut buf).is_none());
    }
}
