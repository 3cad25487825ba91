//! NMEA sentence constants for the GPS module.

/// Start of every sentence
pub const START: u8 = b'$';

/// Separator between the sentence body and its checksum
pub const CHECKSUM_SEPARATOR: u8 = b'*';

/// Length of the talker + sentence type identifier, e.g. `GPGLL`
pub const ID_LEN: usize = 5;

/// Geographic position sentence, the only one retained
pub const GPGLL: &[u8; ID_LEN] = b"GPGLL";

/// Checksum accumulator after the `GPGLL` identifier
pub const GPGLL_XOR: u8 = xor(GPGLL);

/// Maximum sentence length allowed by NMEA 0183, including `$` and `*HH`
pub const MAX_SENTENCE_LEN: usize = 82;

/// Serial baud rate of the GPS module
pub const BAUD_RATE: u32 = 4800;

/// XOR of all bytes, as used by NMEA checksums.
pub const fn xor(bytes: &[u8]) -> u8 {
    let mut acc = 0;
    let mut i = 0;
    while i < bytes.len() {
        acc ^= bytes[i];
        i += 1;
    }
    acc
}

/// Value of an ASCII hex digit in either case.
pub const fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Upper-case ASCII hex digits of `value`.
pub const fn hex_digits(value: u8) -> [u8; 2] {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    [DIGITS[(value >> 4) as usize], DIGITS[(value & 0x0F) as usize]]
}
