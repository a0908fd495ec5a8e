//! TOP (Table Of Pages) navigation tables.
//!
//! The Basic TOP Table on page 1F0 classifies every decimal page and links
//! to the Additional Information Tables, which carry short text labels for
//! the FastText colour keys.
//!
//! BTT layout:
//! ```text
//! rows  1..=20   one Hamming 8/4 nibble per page 100..899 (40 per row)
//! rows 21..=22   5 links of 8 bytes: magazine, tens, units, 4 reserved, type
//! ```
//! AIT layout, two 20-byte entries per row on rows 1..=22:
//! ```text
//! magazine, tens, units, 5 reserved (Hamming 8/4) | 12 label characters (parity)
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use teletext_protocol::{
    decimal_index, hamming_or_marker, is_decimal_page, map_g0, next_decimal_page, page_from_parts,
    parity_or_space, previous_decimal_page, RawPageBuffer, HAMMING_ERROR, ROW_WIDTH,
};

const DECIMAL_PAGES: usize = 800;
const CLASS_ROWS: std::ops::RangeInclusive<usize> = 1..=20;
const LINK_ROWS: std::ops::RangeInclusive<usize> = 21..=22;
const LINK_SIZE: usize = 8;
const LINK_TYPE_AIT: u8 = 2;
const AIT_ENTRY_SIZE: usize = 20;
const AIT_LABEL_LEN: usize = 12;

/// TOP classification of a decimal page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TopClass {
    /// Not transmitted.
    Absent,
    /// A normal page (including subtitle pages).
    Normal,
    /// First page of a block (major topic).
    Block,
    /// First page of a group (minor topic).
    Group,
    /// Not classified: no BTT, a Hamming error, or a non-decimal page.
    NotFound,
}

impl TopClass {
    fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0x0 => TopClass::Absent,
            0x1 => TopClass::Normal,
            0x2 | 0x3 => TopClass::Block,
            0x4 | 0x5 => TopClass::Group,
            0x6..=0xB => TopClass::Normal,
            _ => TopClass::NotFound,
        }
    }
}

/// Type of a page referenced from the BTT link rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TopLink {
    pub page: u16,
    pub kind: u8,
}

/// Decoded Basic TOP Table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicTopTable {
    classes: Vec<TopClass>,
    links: Vec<TopLink>,
}

impl BasicTopTable {
    /// Decode page 1F0. Bytes that fail Hamming decoding classify their page
    /// as [`TopClass::NotFound`].
    pub fn parse(buffer: &RawPageBuffer) -> Self {
        let mut classes = Vec::with_capacity(DECIMAL_PAGES);
        for row in CLASS_ROWS {
            classes.extend(
                buffer.rows[row]
                    .iter()
                    .map(|&byte| TopClass::from_nibble(hamming_or_marker(byte))),
            );
        }

        let mut links = Vec::new();
        for row in LINK_ROWS {
            for entry in buffer.rows[row].chunks_exact(LINK_SIZE) {
                let nibbles: Vec<u8> = entry.iter().map(|&b| hamming_or_marker(b)).collect();
                if nibbles[..3].contains(&HAMMING_ERROR) || nibbles[7] == HAMMING_ERROR {
                    continue;
                }
                let tens_units = nibbles[1] << 4 | nibbles[2];
                if tens_units == 0xFF {
                    continue;
                }
                links.push(TopLink {
                    page: page_from_parts(nibbles[0], tens_units),
                    kind: nibbles[7],
                });
            }
        }

        BasicTopTable { classes, links }
    }

    /// Classification of `page`; non-decimal pages are never classified.
    pub fn class_of(&self, page: u16) -> TopClass {
        decimal_index(page)
            .and_then(|i| self.classes.get(i).copied())
            .unwrap_or(TopClass::NotFound)
    }

    /// Pages carrying Additional Information Tables.
    pub fn ait_pages(&self) -> impl Iterator<Item = u16> + '_ {
        self.links
            .iter()
            .filter(|link| link.kind == LINK_TYPE_AIT)
            .map(|link| link.page)
    }

    /// Walk the decimal page sequence from `from` (exclusive) and return the
    /// first page classified as `class`, or `None` after a full cycle.
    pub fn find(&self, from: u16, forward: bool, class: TopClass) -> Option<u16> {
        let step = if forward { next_decimal_page } else { previous_decimal_page };
        let start = if is_decimal_page(from) { from } else { step(from) };
        let mut page = step(start);
        while page != start {
            if self.class_of(page) == class {
                return Some(page);
            }
            page = step(page);
        }
        (self.class_of(start) == class && start != from).then_some(start)
    }
}

/// Page labels collected from the AIT pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdditionalInfoTable {
    labels: BTreeMap<u16, String>,
}

impl AdditionalInfoTable {
    /// Add the entries of one AIT page.
    pub fn merge(&mut self, buffer: &RawPageBuffer) {
        let subset = buffer.control().national_subset();
        for row in 1..=22 {
            for entry in buffer.rows[row][..ROW_WIDTH].chunks_exact(AIT_ENTRY_SIZE) {
                let nibbles: Vec<u8> = entry[..3].iter().map(|&b| hamming_or_marker(b)).collect();
                if nibbles.contains(&HAMMING_ERROR) {
                    continue;
                }
                let tens_units = nibbles[1] << 4 | nibbles[2];
                if tens_units == 0xFF {
                    continue;
                }
                let label: String = entry[AIT_ENTRY_SIZE - AIT_LABEL_LEN..]
                    .iter()
                    .map(|&b| map_g0(subset, parity_or_space(b)))
                    .collect();
                let label = label.trim();
                if !label.is_empty() {
                    self.labels
                        .insert(page_from_parts(nibbles[0], tens_units), label.to_string());
                }
            }
        }
    }

    pub fn label(&self, page: u16) -> Option<&str> {
        self.labels.get(&page).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
