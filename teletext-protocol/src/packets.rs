//! Decoders for enhancement and linking packets (X/26, X/27, X/28, M/29).
//!
//! Packet layout after the 2-byte address:
//! ```text
//! +-------------+----------------------------------------------+
//! | designation |            13 triplets (3 bytes each)        |
//! |  Ham 8/4    |            Hamming 24/18                     |
//! +-------------+----------------------------------------------+
//! |   1 byte    |                 39 bytes                     |
//! ```
//! Packet 27/0 (FLOF) is the exception: six 6-byte Hamming 8/4 links.

use serde::{Deserialize, Serialize};

use crate::charset::NationalSubset;
use crate::codec::{decode_hamming2418, decode_hamming84, encode_hamming2418, encode_hamming84};
use crate::error::Result;
use crate::types::{page_from_parts, ROW_WIDTH};

/// Triplets per enhancement packet.
pub const TRIPLETS_PER_PACKET: usize = 13;

/// One decoded 18-bit enhancement instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triplet {
    /// Address (6 bits): 0..=39 column group, 40..=63 row group.
    pub address: u8,
    /// Mode (5 bits).
    pub mode: u8,
    /// Data (7 bits).
    pub data: u8,
}

impl Triplet {
    /// Split 18 decoded bits into address, mode and data.
    pub fn from_bits(bits: u32) -> Self {
        Triplet {
            address: (bits & 0x3F) as u8,
            mode: ((bits >> 6) & 0x1F) as u8,
            data: ((bits >> 11) & 0x7F) as u8,
        }
    }

    /// Pack back into 18 bits.
    pub fn to_bits(self) -> u32 {
        (self.address as u32 & 0x3F) | (self.mode as u32 & 0x1F) << 6 | (self.data as u32 & 0x7F) << 11
    }

    /// Decode a Hamming 24/18 coded triplet.
    pub fn decode(bytes: &[u8; 3]) -> Result<Self> {
        decode_hamming2418(bytes).map(Self::from_bits)
    }

    /// Whether the triplet belongs to the row address group.
    pub fn is_row_address(&self) -> bool {
        self.address >= 40
    }
}

/// Read triplet `index` (0..13) of a stored enhancement packet.
pub fn packet_triplet(packet: &[u8; ROW_WIDTH], index: usize) -> Option<[u8; 3]> {
    if index >= TRIPLETS_PER_PACKET {
        return None;
    }
    let offset = 1 + 3 * index;
    Some([packet[offset], packet[offset + 1], packet[offset + 2]])
}

/// Build an enhancement packet from a designation code and up to 13 18-bit
/// words. Unused triplet slots are left as zero bytes, which do not decode.
pub fn encode_packet(designation: u8, words: &[u32]) -> [u8; ROW_WIDTH] {
    let mut packet = [0u8; ROW_WIDTH];
    packet[0] = encode_hamming84(designation);
    for (i, &word) in words.iter().take(TRIPLETS_PER_PACKET).enumerate() {
        packet[1 + 3 * i..4 + 3 * i].copy_from_slice(&encode_hamming2418(word));
    }
    packet
}

/// Sub-page value meaning "any sub-page" in a FLOF link.
pub const ANY_SUB_PAGE: u16 = 0x3F7F;

/// A page link decoded from packet 27/0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlofLink {
    pub page: u16,
    pub sub_page: u16,
}

/// The six editorial links of packet 27/0: red, green, yellow, cyan, next, index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlofLinks {
    pub links: [Option<FlofLink>; 6],
    /// Link control bit: display row 24.
    pub show_row24: bool,
}

impl FlofLinks {
    /// Decode packet 27/0 for a page in `magazine` (1..=8).
    ///
    /// Links with an uncorrectable byte, or with page bits 0xFF, are absent.
    pub fn parse(packet: &[u8; ROW_WIDTH], magazine: u8) -> Self {
        let mut links = [None; 6];
        for (i, link) in links.iter_mut().enumerate() {
            let bytes = &packet[1 + 6 * i..7 + 6 * i];
            let nibbles: Option<Vec<u8>> = bytes.iter().map(|&b| decode_hamming84(b).ok()).collect();
            let Some(n) = nibbles else {
                continue;
            };
            let tens_units = n[1] << 4 | n[0];
            if tens_units == 0xFF {
                continue;
            }
            let relative_magazine = (n[3] >> 3) | ((n[5] >> 1) & 0x06);
            let page = page_from_parts((magazine & 0x07) ^ relative_magazine, tens_units);
            let sub_page =
                (n[5] as u16 & 0x03) << 12 | (n[4] as u16) << 8 | (n[3] as u16 & 0x07) << 4 | n[2] as u16;
            *link = Some(FlofLink { page, sub_page });
        }

        let show_row24 = decode_hamming84(packet[37]).map(|c| c & 0x08 != 0).unwrap_or(false);

        FlofLinks { links, show_row24 }
    }

    /// Target page of the colour link `index` (0 red .. 3 cyan).
    pub fn colour(&self, index: usize) -> Option<u16> {
        self.links.get(index).copied().flatten().map(|l| l.page)
    }
}

/// Function of a compositional link (packet 27/4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkFunction {
    Gpop,
    Pop,
    Gdrcs,
    Drcs,
}

/// A compositional link to an object or DRCS page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub function: LinkFunction,
    pub page: u16,
    /// Mask of relevant sub-pages (bit n = sub-page n).
    pub sub_page_mask: u16,
    pub priority: u8,
    pub level25: bool,
    pub level35: bool,
}

impl PageLink {
    /// First sub-page selected by the mask (0 when the mask is empty).
    pub fn sub_page(&self) -> u8 {
        if self.sub_page_mask == 0 {
            0
        } else {
            self.sub_page_mask.trailing_zeros() as u8
        }
    }
}

/// Links of packet 27/4, indexed by [`LinkFunction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompositionLinks {
    pub gpop: Option<PageLink>,
    pub pop: Option<PageLink>,
    pub gdrcs: Option<PageLink>,
    pub drcs: Option<PageLink>,
}

impl CompositionLinks {
    /// Decode packet 27/4. Each link uses three triplets; a link with a
    /// Hamming error or without level-2.5 validity is dropped.
    pub fn parse(packet: &[u8; ROW_WIDTH]) -> Self {
        let mut links = CompositionLinks::default();
        for index in 0..4 {
            let decoded: Option<Vec<u32>> = (0..3)
                .map(|t| packet_triplet(packet, index * 3 + t).and_then(|b| decode_hamming2418(&b).ok()))
                .collect();
            let Some(t) = decoded else {
                continue;
            };
            let level25 = t[0] & 0x04 != 0;
            if !level25 {
                continue;
            }
            let function = match t[0] & 0x03 {
                0 => LinkFunction::Gpop,
                1 => LinkFunction::Pop,
                2 => LinkFunction::Gdrcs,
                _ => LinkFunction::Drcs,
            };
            let link = PageLink {
                function,
                page: page_from_parts(((t[0] >> 4) & 0x07) as u8, ((t[0] >> 7) & 0xFF) as u8),
                sub_page_mask: (t[1] & 0xFFFF) as u16,
                priority: ((t[1] >> 16) & 0x03) as u8,
                level25,
                level35: t[0] & 0x08 != 0,
            };
            let slot = match function {
                LinkFunction::Gpop => &mut links.gpop,
                LinkFunction::Pop => &mut links.pop,
                LinkFunction::Gdrcs => &mut links.gdrcs,
                LinkFunction::Drcs => &mut links.drcs,
            };
            slot.get_or_insert(link);
        }
        links
    }
}

/// Default 12-bit RGB palette: CLUT 0..3, 8 entries each.
/// CLUT 1 entry 0 (index 8) is transparent.
pub const DEFAULT_PALETTE: [u16; 32] = [
    0x000, 0xF00, 0x0F0, 0xFF0, 0x00F, 0xF0F, 0x0FF, 0xFFF, //
    0x000, 0x700, 0x070, 0x770, 0x007, 0x707, 0x077, 0x777, //
    0xF05, 0xF70, 0x0F7, 0xFFB, 0x0CA, 0x500, 0x652, 0xC77, //
    0x333, 0xF77, 0x7F7, 0xFF7, 0x77F, 0xF7F, 0x7FF, 0xDDD,
];

/// Palette index of the transparent colour.
pub const TRANSPARENT: u8 = 8;

/// Foreground CLUT offsets for the colour table remapping codes 0..=7.
pub const REMAP_FOREGROUND: [u8; 8] = [0, 0, 0, 8, 8, 16, 16, 16];

/// Background CLUT offsets for the colour table remapping codes 0..=7.
pub const REMAP_BACKGROUND: [u8; 8] = [0, 8, 16, 8, 16, 8, 16, 24];

/// Page enhancement data from packet 28/0 or 29/0, format 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEnhancement {
    pub page_function: u8,
    pub page_coding: u8,
    /// Default G0/G2 designation (7 bits).
    pub default_designation: u8,
    /// Second G0 designation, selected by ESC.
    pub second_designation: u8,
    pub left_panel: bool,
    pub right_panel: bool,
    pub panel_status: bool,
    pub left_columns: u8,
    /// Full palette with CLUT 2/3 redefinitions applied.
    pub palette: [u16; 32],
    pub default_screen_colour: u8,
    pub default_row_colour: u8,
    pub black_background_substitution: bool,
    /// Colour table remapping code (0..=7).
    pub colour_remap: u8,
}

impl Default for PageEnhancement {
    fn default() -> Self {
        PageEnhancement {
            page_function: 0,
            page_coding: 0,
            default_designation: 0,
            second_designation: 0,
            left_panel: false,
            right_panel: false,
            panel_status: false,
            left_columns: 0,
            palette: DEFAULT_PALETTE,
            default_screen_colour: 0,
            default_row_colour: 0,
            black_background_substitution: false,
            colour_remap: 0,
        }
    }
}

/// LSB-first reader over the 18-bit words of a packet.
struct BitReader {
    words: Vec<u32>,
    position: usize,
}

impl BitReader {
    fn take(&mut self, count: usize) -> u32 {
        let mut value = 0u32;
        for i in 0..count {
            let bit = self.position + i;
            let word = self.words.get(bit / 18).copied().unwrap_or(0);
            value |= ((word >> (bit % 18)) & 1) << i;
        }
        self.position += count;
        value
    }
}

impl PageEnhancement {
    /// Decode a format-1 packet 28/0, 28/4 or 29/0. A Hamming error in any
    /// triplet rejects the whole packet.
    pub fn parse(packet: &[u8; ROW_WIDTH]) -> Result<Self> {
        let words = (0..TRIPLETS_PER_PACKET)
            .filter_map(|i| packet_triplet(packet, i))
            .map(|bytes| decode_hamming2418(&bytes))
            .collect::<Result<Vec<u32>>>()?;
        let mut reader = BitReader { words, position: 0 };

        let page_function = reader.take(4) as u8;
        let page_coding = reader.take(3) as u8;
        let default_designation = reader.take(7) as u8;
        let second_designation = reader.take(7) as u8;
        let left_panel = reader.take(1) != 0;
        let right_panel = reader.take(1) != 0;
        let panel_status = reader.take(1) != 0;
        let left_columns = reader.take(4) as u8;

        let mut palette = DEFAULT_PALETTE;
        for entry in palette.iter_mut().skip(16) {
            let red = reader.take(4) as u16;
            let green = reader.take(4) as u16;
            let blue = reader.take(4) as u16;
            *entry = red << 8 | green << 4 | blue;
        }

        Ok(PageEnhancement {
            page_function,
            page_coding,
            default_designation,
            second_designation,
            left_panel,
            right_panel,
            panel_status,
            left_columns,
            palette,
            default_screen_colour: reader.take(5) as u8,
            default_row_colour: reader.take(5) as u8,
            black_background_substitution: reader.take(1) != 0,
            colour_remap: reader.take(3) as u8,
        })
    }

    /// Default G0 national sub-set.
    pub fn default_subset(&self) -> NationalSubset {
        NationalSubset::from_designation(self.default_designation)
    }

    /// National sub-set selected by ESC.
    pub fn second_subset(&self) -> NationalSubset {
        NationalSubset::from_designation(self.second_designation)
    }

    /// CLUT offsets applied to Level-1 foreground and background colours.
    pub fn remap(&self) -> (u8, u8) {
        let code = (self.colour_remap & 0x07) as usize;
        (REMAP_FOREGROUND[code], REMAP_BACKGROUND[code])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_hamming84;

    /// Pack fields LSB-first into 18-bit words.
    fn pack_bits(fields: &[(u32, usize)]) -> Vec<u32> {
        let mut words = vec![0u32; TRIPLETS_PER_PACKET];
        let mut position = 0;
        for &(value, width) in fields {
            for i in 0..width {
                let bit = position + i;
                words[bit / 18] |= ((value >> i) & 1) << (bit % 18);
            }
            position += width;
        }
        words
    }

    #[test]
    fn test_triplet_fields() {
        let t = Triplet::from_bits(0x2A | 0x04 << 6 | 0x15 << 11);
        assert_eq!(t.address, 0x2A);
        assert_eq!(t.mode, 0x04);
        assert_eq!(t.data, 0x15);
        assert!(t.is_row_address());
        assert_eq!(Triplet::from_bits(t.to_bits()), t);
    }

    #[test]
    fn test_flof_links() {
        let mut packet = [encode_hamming84(0); ROW_WIDTH];
        // Red link: page x23, same magazine, any sub-page.
        let red = [0x3, 0x2, 0xF, 0x7, 0xF, 0x3];
        for (i, &n) in red.iter().enumerate() {
            packet[1 + i] = encode_hamming84(n);
        }
        // Green link absent.
        for i in 0..2 {
            packet[7 + i] = encode_hamming84(0xF);
        }
        packet[37] = encode_hamming84(0x08);

        let links = FlofLinks::parse(&packet, 1);
        assert_eq!(links.colour(0), Some(0x123));
        assert_eq!(links.links[0].map(|l| l.sub_page), Some(ANY_SUB_PAGE));
        assert_eq!(links.colour(1), None);
        assert!(links.show_row24);
    }

    #[test]
    fn test_flof_relative_magazine() {
        let mut packet = [encode_hamming84(0); ROW_WIDTH];
        // M1 set in S2 byte: magazine 1 XOR 1 = 0 -> magazine 8.
        let link = [0x0, 0x5, 0x0, 0x8, 0x0, 0x0];
        for (i, &n) in link.iter().enumerate() {
            packet[1 + i] = encode_hamming84(n);
        }
        let links = FlofLinks::parse(&packet, 1);
        assert_eq!(links.colour(0), Some(0x850));
    }

    #[test]
    fn test_composition_links() {
        // POP link (function 1), level 2.5, magazine 2, page 0x2F0, sub-page 3.
        let t0 = 0x01 | 0x04 | 2 << 4 | 0xF0 << 7;
        let t1 = 1 << 3 | 1 << 16;
        let packet = encode_packet(4, &[t0, t1, 0]);
        let links = CompositionLinks::parse(&packet);
        let pop = links.pop.expect("pop link");
        assert_eq!(pop.page, 0x2F0);
        assert_eq!(pop.sub_page(), 3);
        assert_eq!(pop.priority, 1);
        assert!(links.gpop.is_none());
    }

    #[test]
    fn test_page_enhancement() {
        let mut fields = vec![(0, 4), (0, 3), (0x01, 7), (0x04, 7), (0, 1), (0, 1), (0, 1), (0, 4)];
        // Redefine CLUT 2 entry 0 as pure blue, keep the rest black.
        fields.push((0x0, 4));
        fields.push((0x0, 4));
        fields.push((0xF, 4));
        for _ in 1..16 {
            fields.push((0, 12));
        }
        fields.extend_from_slice(&[(4, 5), (1, 5), (1, 1), (3, 3)]);
        let packet = encode_packet(0, &pack_bits(&fields));

        let enhancement = PageEnhancement::parse(&packet).unwrap();
        assert_eq!(enhancement.default_subset(), NationalSubset::German);
        assert_eq!(enhancement.second_subset(), NationalSubset::French);
        assert_eq!(enhancement.palette[16], 0x00F);
        assert_eq!(enhancement.palette[0], 0x000);
        assert_eq!(enhancement.palette[7], 0xFFF);
        assert_eq!(enhancement.default_screen_colour, 4);
        assert_eq!(enhancement.default_row_colour, 1);
        assert!(enhancement.black_background_substitution);
        assert_eq!(enhancement.remap(), (8, 8));
    }

    #[test]
    fn test_page_enhancement_rejects_hamming_errors() {
        let mut packet = encode_packet(0, &[0; 13]);
        packet[5] ^= 0x03;
        assert!(PageEnhancement::parse(&packet).is_err());
    }
}
