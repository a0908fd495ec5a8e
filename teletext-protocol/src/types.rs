//! Page numbering and the raw page buffer handed over by the demultiplexer.

use serde::{Deserialize, Serialize};

use crate::charset::NationalSubset;
use crate::codec::{decode_hamming84, encode_hamming84, encode_parity};
use crate::error::{ProtocolError, Result};

/// Lowest addressable page.
pub const FIRST_PAGE: u16 = 0x100;

/// Highest addressable page (hex pages included).
pub const LAST_PAGE: u16 = 0x8FF;

/// Highest decimal page.
pub const LAST_DECIMAL_PAGE: u16 = 0x899;

/// Highest sub-page number.
pub const MAX_SUB_PAGE: u8 = 0x79;

/// Number of text columns per row.
pub const ROW_WIDTH: usize = 40;

/// Number of rows in the display grid (rows 0..=24).
pub const GRID_ROWS: usize = 25;

/// Number of transmitted body rows kept in a buffer (rows 0..=23).
pub const BODY_ROWS: usize = 24;

/// Basic TOP Table page.
pub const BTT_PAGE: u16 = 0x1F0;

/// Magazine Organisation Table page number within a magazine.
pub const MOT_PAGE_LOW: u16 = 0xFE;

/// Check that a page number lies within 0x100..=0x8FF.
pub fn validate_page(page: u16) -> Result<u16> {
    if (FIRST_PAGE..=LAST_PAGE).contains(&page) {
        Ok(page)
    } else {
        Err(ProtocolError::InvalidPageNumber(page))
    }
}

/// Check that a sub-page lies within 0..=0x79.
pub fn validate_sub_page(sub_page: u16) -> Result<u8> {
    if sub_page <= MAX_SUB_PAGE as u16 {
        Ok(sub_page as u8)
    } else {
        Err(ProtocolError::InvalidSubPage(sub_page))
    }
}

/// Whether `page` is a decimal page (all three digits 0..=9, magazine 1..=8).
pub fn is_decimal_page(page: u16) -> bool {
    (FIRST_PAGE..=LAST_DECIMAL_PAGE).contains(&page) && page & 0x0F <= 9 && (page >> 4) & 0x0F <= 9
}

/// Next page in decimal order, wrapping 899 → 100. Hex pages step to the
/// next decimal page above them.
pub fn next_decimal_page(page: u16) -> u16 {
    let hundreds = page >> 8;
    let tens = (page >> 4) & 0x0F;
    let units = page & 0x0F;
    let next = if tens >= 9 && (units >= 9 || tens > 9) {
        (hundreds + 1) << 8
    } else if units >= 9 {
        hundreds << 8 | (tens + 1) << 4
    } else {
        page + 1
    };
    if (FIRST_PAGE..=LAST_DECIMAL_PAGE).contains(&next) {
        next
    } else {
        FIRST_PAGE
    }
}

/// Previous page in decimal order, wrapping 100 → 899. Hex pages step to
/// the next decimal page below them.
pub fn previous_decimal_page(page: u16) -> u16 {
    let hundreds = page >> 8;
    let tens = (page >> 4) & 0x0F;
    let units = page & 0x0F;
    let previous = if tens > 9 {
        hundreds << 8 | 0x99
    } else if units > 9 {
        hundreds << 8 | tens << 4 | 0x09
    } else if units > 0 {
        page - 1
    } else if tens > 0 {
        hundreds << 8 | (tens - 1) << 4 | 0x09
    } else {
        hundreds.saturating_sub(1) << 8 | 0x99
    };
    if (FIRST_PAGE..=LAST_DECIMAL_PAGE).contains(&previous) {
        previous
    } else {
        LAST_DECIMAL_PAGE
    }
}

/// Index of a decimal page in 100..=899 order (0..800), as used by the BTT.
pub fn decimal_index(page: u16) -> Option<usize> {
    if !is_decimal_page(page) {
        return None;
    }
    let hundreds = (page >> 8) as usize - 1;
    let tens = ((page >> 4) & 0x0F) as usize;
    let units = (page & 0x0F) as usize;
    Some(hundreds * 100 + tens * 10 + units)
}

/// Magazine (1..=8) of a page number.
pub fn magazine_of(page: u16) -> u8 {
    match (page >> 8) as u8 & 0x07 {
        0 => 8,
        m => m,
    }
}

/// Build a page number from a transmitted magazine (0 meaning 8) and the
/// page tens/units byte.
pub fn page_from_parts(magazine: u8, tens_units: u8) -> u16 {
    let magazine = match magazine & 0x07 {
        0 => 8,
        m => m,
    };
    (magazine as u16) << 8 | tens_units as u16
}

/// Decoded page header control bits (packet X/0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeaderControl {
    /// C4: erase page.
    pub erase: bool,
    /// C5: newsflash (boxed).
    pub newsflash: bool,
    /// C6: subtitle (boxed).
    pub subtitle: bool,
    /// C7: suppress header row.
    pub suppress_header: bool,
    /// C8: update indicator.
    pub update: bool,
    /// C9: interrupted sequence.
    pub interrupted: bool,
    /// C10: inhibit display.
    pub inhibit_display: bool,
    /// C11: magazine serial.
    pub serial: bool,
    /// C12..C14: national option.
    pub national_option: u8,
}

impl HeaderControl {
    /// Decode control bits from the 8 Hamming bytes of the page header.
    ///
    /// Uncorrectable bytes leave the bits they carry cleared.
    pub fn parse(header: &[u8; 8]) -> Self {
        let nibble = |i: usize| decode_hamming84(header[i]).unwrap_or(0);
        let s2 = nibble(3);
        let s4 = nibble(5);
        let c7_c10 = nibble(6);
        let c11_c14 = nibble(7);

        HeaderControl {
            erase: s2 & 0x08 != 0,
            newsflash: s4 & 0x04 != 0,
            subtitle: s4 & 0x08 != 0,
            suppress_header: c7_c10 & 0x01 != 0,
            update: c7_c10 & 0x02 != 0,
            interrupted: c7_c10 & 0x04 != 0,
            inhibit_display: c7_c10 & 0x08 != 0,
            serial: c11_c14 & 0x01 != 0,
            national_option: (c11_c14 >> 1) & 0x07,
        }
    }

    /// Whether the page is a boxed (newsflash or subtitle) page.
    pub fn is_boxed(&self) -> bool {
        self.newsflash || self.subtitle
    }

    /// National sub-set implied by C12..C14.
    pub fn national_subset(&self) -> NationalSubset {
        NationalSubset::from_control_bits(self.national_option)
    }
}

/// One (page, sub-page)'s transmitted bytes as assembled by the receiver.
///
/// Text rows are odd-parity coded; the header and designation codes are
/// Hamming 8/4 coded; enhancement packets carry Hamming 24/18 triplets in
/// bytes 1..40 after the designation code in byte 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPageBuffer {
    /// Page number (0x100..=0x8FF).
    pub page: u16,
    /// Sub-page (0..=0x79).
    pub sub_page: u8,
    /// Page header prefix: units, tens, S1, S2, S3, S4, C7-C10, C11-C14.
    pub header: [u8; 8],
    /// Rows 0..=23. Row 0 columns 0..8 are not transmitted text.
    pub rows: [[u8; ROW_WIDTH]; BODY_ROWS],
    /// Row 24: FLOF display row, or packet-24 triplets on object pages.
    pub row24: Option<[u8; ROW_WIDTH]>,
    /// Row 25: packet-25 triplets on object pages.
    pub row25: Option<[u8; ROW_WIDTH]>,
    /// Packet 26 by designation code.
    pub packet26: [Option<[u8; ROW_WIDTH]>; 16],
    /// Packet 27 by designation code.
    pub packet27: [Option<[u8; ROW_WIDTH]>; 16],
    /// Packet 28 by designation code.
    pub packet28: [Option<[u8; ROW_WIDTH]>; 16],
}

impl RawPageBuffer {
    /// An all-space buffer for `page`/`sub_page`, as returned on a cache miss.
    pub fn blank(page: u16, sub_page: u8) -> Self {
        let space = encode_parity(b' ');
        let tens_units = (page & 0xFF) as u8;
        let mut header = [encode_hamming84(0); 8];
        header[0] = encode_hamming84(tens_units & 0x0F);
        header[1] = encode_hamming84(tens_units >> 4);
        header[2] = encode_hamming84(sub_page & 0x0F);
        header[4] = encode_hamming84(sub_page >> 4);

        RawPageBuffer {
            page,
            sub_page,
            header,
            rows: [[space; ROW_WIDTH]; BODY_ROWS],
            row24: None,
            row25: None,
            packet26: [None; 16],
            packet27: [None; 16],
            packet28: [None; 16],
        }
    }

    /// Decoded header control bits.
    pub fn control(&self) -> HeaderControl {
        HeaderControl::parse(&self.header)
    }

    /// Whether any packet 26/27/28 is present.
    pub fn has_enhancements(&self) -> bool {
        self.packet26.iter().any(Option::is_some)
            || self.packet27.iter().any(Option::is_some)
            || self.packet28.iter().any(Option::is_some)
    }

    /// Store a transmitted packet (row 1..=28, with `designation` for 26..=28).
    pub fn set_packet(&mut self, row: u8, designation: u8, data: &[u8]) -> Result<()> {
        let bytes: [u8; ROW_WIDTH] = data.try_into().map_err(|_| ProtocolError::PacketLength {
            expected: ROW_WIDTH,
            actual: data.len(),
        })?;
        if designation > 15 {
            return Err(ProtocolError::Designation { packet: row, designation });
        }

        match row {
            0..=23 => self.rows[row as usize] = bytes,
            24 => self.row24 = Some(bytes),
            25 => self.row25 = Some(bytes),
            26 => self.packet26[designation as usize] = Some(bytes),
            27 => self.packet27[designation as usize] = Some(bytes),
            28 => self.packet28[designation as usize] = Some(bytes),
            _ => return Err(ProtocolError::Designation { packet: row, designation }),
        }
        Ok(())
    }

    /// Write parity-coded text into a body row, padding with spaces.
    pub fn set_text_row(&mut self, row: usize, text: &[u8]) {
        let space = encode_parity(b' ');
        let mut bytes = [space; ROW_WIDTH];
        for (dst, &src) in bytes.iter_mut().zip(text) {
            *dst = encode_parity(src);
        }
        if row < BODY_ROWS {
            self.rows[row] = bytes;
        } else if row == BODY_ROWS {
            self.row24 = Some(bytes);
        }
    }

    /// Raw row bytes for rows 0..=25.
    pub fn row(&self, row: usize) -> Option<&[u8; ROW_WIDTH]> {
        match row {
            0..=23 => Some(&self.rows[row]),
            24 => self.row24.as_ref(),
            25 => self.row25.as_ref(),
            _ => None,
        }
    }
}
