//! Dynamically redefinable characters.
//!
//! A DRCS page carries 48 characters of 12×10 pixels on rows 1..=24, two
//! characters per row. Each pixel row is two parity-coded bytes with six
//! pixel bits each, most significant bit on the left.

use serde::Serialize;
use teletext_protocol::{decode_parity, RawPageBuffer};

/// Characters per DRCS page.
pub const DRCS_CHARACTERS: u8 = 48;
pub const DRCS_WIDTH: usize = 12;
pub const DRCS_HEIGHT: usize = 10;

const BYTES_PER_CHARACTER: usize = 2 * DRCS_HEIGHT;

/// A 12×10 monochrome bitmap, one `u16` per pixel row (bit 11 leftmost).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrcsGlyph {
    pub rows: [u16; DRCS_HEIGHT],
}

impl DrcsGlyph {
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < DRCS_WIDTH && y < DRCS_HEIGHT && self.rows[y] >> (DRCS_WIDTH - 1 - x) & 1 != 0
    }

    /// Decode character `index` (0..48) of a DRCS page. Pixel rows with a
    /// parity error are left blank.
    pub fn decode(page: &RawPageBuffer, index: u8) -> Option<Self> {
        if index >= DRCS_CHARACTERS {
            return None;
        }
        let row = 1 + index as usize / 2;
        let offset = (index as usize % 2) * BYTES_PER_CHARACTER;
        let bytes = &page.row(row)?[offset..offset + BYTES_PER_CHARACTER];

        let mut rows = [0u16; DRCS_HEIGHT];
        for (pixels, pair) in rows.iter_mut().zip(bytes.chunks_exact(2)) {
            if let (Ok(left), Ok(right)) = (decode_parity(pair[0]), decode_parity(pair[1])) {
                *pixels = (left as u16 & 0x3F) << 6 | (right as u16 & 0x3F);
            }
        }
        Some(DrcsGlyph { rows })
    }
}
