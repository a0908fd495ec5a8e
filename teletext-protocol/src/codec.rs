//! Error-correcting byte codecs used on teletext packets.
//!
//! Three encodings appear on the wire:
//!
//! ```text
//! Hamming 8/4    1 byte  -> 4 data bits   (addresses, page numbers, control bits)
//! Hamming 24/18  3 bytes -> 18 data bits  (enhancement triplets, packets 26..29)
//! Odd parity     1 byte  -> 7 data bits   (displayable text)
//! ```
//!
//! Every raw byte a decoder touches goes through exactly one of these.

use crate::error::{ProtocolError, Result};

/// Hamming 8/4 codewords for the values 0..=15.
pub const HAMMING_84_ENCODE: [u8; 16] = [
    0x15, 0x02, 0x49, 0x5E, 0x64, 0x73, 0x38, 0x2F, 0xD0, 0xC7, 0x8C, 0x9B, 0xA1, 0xB6, 0xFD, 0xEA,
];

/// Marker stored in the decode table for uncorrectable bytes, and returned by
/// [`hamming_or_marker`].
pub const HAMMING_ERROR: u8 = 0xFF;

/// Hamming 8/4 decode table. A byte at distance 0 or 1 from a codeword maps to
/// that codeword's value; everything else is uncorrectable.
static HAMMING_84_DECODE: [u8; 256] = {
    let mut table = [HAMMING_ERROR; 256];
    let mut byte = 0;
    while byte < 256 {
        let mut value = 0;
        while value < 16 {
            if ((byte as u8) ^ HAMMING_84_ENCODE[value]).count_ones() <= 1 {
                table[byte] = value as u8;
            }
            value += 1;
        }
        byte += 1;
    }
    table
};

/// Bit positions (1-based, LSB of the first byte is position 1) carrying the
/// 18 data bits D1..D18 of a Hamming 24/18 triplet.
const DATA_POSITIONS: [u32; 18] = [3, 5, 6, 7, 9, 10, 11, 12, 13, 14, 15, 17, 18, 19, 20, 21, 22, 23];

/// Coverage masks of the five Hamming tests over positions 1..=23.
const CHECK_MASKS: [u32; 5] = {
    let mut masks = [0u32; 5];
    let mut k = 0;
    while k < 5 {
        let mut position = 1u32;
        while position <= 23 {
            if position & (1 << k) != 0 {
                masks[k] |= 1 << (position - 1);
            }
            position += 1;
        }
        k += 1;
    }
    masks
};

/// Decode a Hamming 8/4 byte into a nibble, correcting single-bit errors.
pub fn decode_hamming84(byte: u8) -> Result<u8> {
    match HAMMING_84_DECODE[byte as usize] {
        HAMMING_ERROR => Err(ProtocolError::Hamming(byte)),
        value => Ok(value),
    }
}

/// Encode a nibble as a Hamming 8/4 byte.
pub fn encode_hamming84(nibble: u8) -> u8 {
    HAMMING_84_ENCODE[(nibble & 0x0F) as usize]
}

/// Decode a Hamming 8/4 byte, returning [`HAMMING_ERROR`] when it cannot be
/// corrected. Used for hex digits that are displayed rather than acted on.
pub fn hamming_or_marker(byte: u8) -> u8 {
    HAMMING_84_DECODE[byte as usize]
}

/// Decode two Hamming 8/4 bytes into one byte, low nibble first.
pub fn decode_hamming84_pair(low: u8, high: u8) -> Result<u8> {
    Ok(decode_hamming84(low)? | (decode_hamming84(high)? << 4))
}

/// Decode a Hamming 24/18 triplet into its 18 data bits.
///
/// Single-bit errors anywhere in the 24 bits are corrected; double-bit
/// errors are reported.
pub fn decode_hamming2418(bytes: &[u8; 3]) -> Result<u32> {
    let word = bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16;

    let syndrome = CHECK_MASKS
        .iter()
        .enumerate()
        .filter(|&(_, mask)| (word & mask).count_ones() & 1 == 0)
        .fold(0u32, |acc, (k, _)| acc | 1 << k);
    let overall_odd = word.count_ones() & 1 == 1;

    let corrected = match (syndrome, overall_odd) {
        (0, true) => word,
        // Only the overall parity bit itself is wrong.
        (0, false) => word ^ 1 << 23,
        (position @ 1..=23, false) => word ^ 1 << (position - 1),
        _ => return Err(ProtocolError::Hamming24(*bytes)),
    };

    Ok(DATA_POSITIONS
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, &position)| {
            acc | ((corrected >> (position - 1)) & 1) << i
        }))
}

/// Encode 18 data bits as a Hamming 24/18 triplet.
pub fn encode_hamming2418(value: u32) -> [u8; 3] {
    let mut word = DATA_POSITIONS
        .iter()
        .enumerate()
        .filter(|&(i, _)| value >> i & 1 != 0)
        .fold(0u32, |acc, (_, &position)| acc | 1 << (position - 1));

    for (k, mask) in CHECK_MASKS.iter().enumerate() {
        if (word & mask).count_ones() & 1 == 0 {
            word |= 1 << ((1u32 << k) - 1);
        }
    }
    if word.count_ones() & 1 == 0 {
        word |= 1 << 23;
    }

    [word as u8, (word >> 8) as u8, (word >> 16) as u8]
}

/// Decode an odd-parity byte into its 7-bit value.
pub fn decode_parity(byte: u8) -> Result<u8> {
    if byte.count_ones() & 1 == 1 {
        Ok(byte & 0x7F)
    } else {
        Err(ProtocolError::Parity(byte))
    }
}

/// Encode a 7-bit value with odd parity in bit 7.
pub fn encode_parity(value: u8) -> u8 {
    let value = value & 0x7F;
    if value.count_ones() & 1 == 0 {
        value | 0x80
    } else {
        value
    }
}

/// Decode an odd-parity text byte, substituting a space on error.
pub fn parity_or_space(byte: u8) -> u8 {
    decode_parity(byte).unwrap_or(b' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hamming84_round_trip() {
        for nibble in 0..16u8 {
            assert_eq!(decode_hamming84(encode_hamming84(nibble)), Ok(nibble));
        }
    }

    #[test]
    fn test_hamming84_never_out_of_range() {
        for byte in 0..=255u8 {
            match decode_hamming84(byte) {
                Ok(value) => assert!(value < 16),
                Err(e) => assert_eq!(e, ProtocolError::Hamming(byte)),
            }
        }
    }

    #[test]
    fn test_hamming84_double_error_detected() {
        let code = encode_hamming84(0x0A);
        assert!(decode_hamming84(code ^ 0x03).is_err());
        assert_eq!(hamming_or_marker(code ^ 0x81), HAMMING_ERROR);
    }

    #[test]
    fn test_hamming84_pair() {
        let low = encode_hamming84(0x5);
        let high = encode_hamming84(0x2);
        assert_eq!(decode_hamming84_pair(low, high), Ok(0x25));
    }

    #[test]
    fn test_hamming2418_known_values() {
        for value in [0u32, 1, 0x3FFFF, 0x2AAAA, 0x15555, 0x0C0FE] {
            assert_eq!(decode_hamming2418(&encode_hamming2418(value)), Ok(value));
        }
    }

    #[test]
    fn test_parity() {
        assert_eq!(encode_parity(b'A'), 0xC1);
        assert_eq!(decode_parity(0xC1), Ok(b'A'));
        assert_eq!(decode_parity(b'A'), Err(ProtocolError::Parity(b'A')));
        assert_eq!(parity_or_space(b'A'), b' ');
    }

    proptest! {
        #[test]
        fn prop_hamming84_single_flip_corrected(nibble in 0u8..16, bit in 0u32..8) {
            let corrupted = encode_hamming84(nibble) ^ (1 << bit);
            prop_assert_eq!(decode_hamming84(corrupted), Ok(nibble));
        }

        #[test]
        fn prop_hamming2418_single_flip_corrected(value in 0u32..0x40000, bit in 0u32..24) {
            let mut bytes = encode_hamming2418(value);
            bytes[(bit / 8) as usize] ^= 1 << (bit % 8);
            prop_assert_eq!(decode_hamming2418(&bytes), Ok(value));
        }

        #[test]
        fn prop_hamming2418_double_flip_detected(value in 0u32..0x40000, a in 0u32..24, b in 0u32..24) {
            prop_assume!(a != b);
            let mut bytes = encode_hamming2418(value);
            bytes[(a / 8) as usize] ^= 1 << (a % 8);
            bytes[(b / 8) as usize] ^= 1 << (b % 8);
            prop_assert!(decode_hamming2418(&bytes).is_err());
        }

        #[test]
        fn prop_parity_round_trip(value in 0u8..0x80) {
            prop_assert_eq!(decode_parity(encode_parity(value)), Ok(value));
        }

        #[test]
        fn prop_parity_single_flip_detected(value in 0u8..0x80, bit in 0u32..8) {
            prop_assert!(decode_parity(encode_parity(value) ^ (1 << bit)).is_err());
        }
    }
}
