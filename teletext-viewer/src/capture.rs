//! JSON page captures.
//!
//! A capture is a JSON array of pages as a demultiplexer assembled them:
//!
//! ```json
//! [{ "page": "100", "sub_page": 0, "header": "15 02 ...",
//!    "rows": ["...40 bytes hex..."], "row24": null,
//!    "packet26": { "0": "hex" }, "packet27": {}, "packet28": {},
//!    "text": { "1": "Plain text row" } }]
//! ```
//!
//! `rows` starts at row 0. `text` rows are parity-encoded on load and are
//! meant for hand-written captures. `packet29` carries the magazine-wide
//! enhancement data for the page's magazine.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use teletext::PageStore;
use teletext_protocol::{
    magazine_of, validate_page, validate_sub_page, PageEnhancement, ProtocolError, RawPageBuffer,
    ROW_WIDTH,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to read capture: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid capture JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Page {page}: invalid hex in {field}: {reason}")]
    Hex {
        page: String,
        field: String,
        reason: String,
    },

    #[error("Page {page}: {source}")]
    Protocol {
        page: String,
        #[source]
        source: ProtocolError,
    },
}

/// One captured (page, sub-page) transmission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapturedPage {
    /// Page number as three hex digits.
    pub page: String,
    #[serde(default)]
    pub sub_page: u16,
    /// The 8 Hamming-coded header bytes.
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub rows: Vec<String>,
    #[serde(default)]
    pub row24: Option<String>,
    #[serde(default)]
    pub packet26: BTreeMap<u8, String>,
    #[serde(default)]
    pub packet27: BTreeMap<u8, String>,
    #[serde(default)]
    pub packet28: BTreeMap<u8, String>,
    #[serde(default)]
    pub packet29: Option<String>,
    #[serde(default)]
    pub text: BTreeMap<usize, String>,
}

impl CapturedPage {
    fn hex_error(&self, field: impl Into<String>, reason: impl Into<String>) -> CaptureError {
        CaptureError::Hex {
            page: self.page.clone(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    fn protocol_error(&self, source: ProtocolError) -> CaptureError {
        CaptureError::Protocol {
            page: self.page.clone(),
            source,
        }
    }

    fn row_bytes(&self, field: &str, text: &str) -> Result<[u8; ROW_WIDTH], CaptureError> {
        let bytes = parse_hex(text).map_err(|reason| self.hex_error(field, reason))?;
        bytes.try_into().map_err(|bytes: Vec<u8>| {
            self.protocol_error(ProtocolError::PacketLength {
                expected: ROW_WIDTH,
                actual: bytes.len(),
            })
        })
    }

    /// Assemble the raw page buffer.
    pub fn to_buffer(&self) -> Result<RawPageBuffer, CaptureError> {
        let page = u16::from_str_radix(self.page.trim(), 16)
            .map_err(|e| self.hex_error("page", e.to_string()))?;
        let page = validate_page(page).map_err(|e| self.protocol_error(e))?;
        let sub_page = validate_sub_page(self.sub_page).map_err(|e| self.protocol_error(e))?;

        let mut buffer = RawPageBuffer::blank(page, sub_page);
        if let Some(header) = &self.header {
            let bytes = parse_hex(header).map_err(|reason| self.hex_error("header", reason))?;
            buffer.header = bytes.try_into().map_err(|bytes: Vec<u8>| {
                self.protocol_error(ProtocolError::PacketLength {
                    expected: 8,
                    actual: bytes.len(),
                })
            })?;
        }

        for (row, text) in self.rows.iter().enumerate() {
            let bytes = self.row_bytes(&format!("rows[{}]", row), text)?;
            match buffer.rows.get_mut(row) {
                Some(dst) => *dst = bytes,
                None => warn!("Page {}: ignoring row {}", self.page, row),
            }
        }
        if let Some(row24) = &self.row24 {
            buffer.row24 = Some(self.row_bytes("row24", row24)?);
        }

        let packets = [(26u8, &self.packet26), (27, &self.packet27), (28, &self.packet28)];
        for (packet, map) in packets {
            for (&designation, text) in map {
                let bytes = self.row_bytes(&format!("packet{}/{}", packet, designation), text)?;
                buffer
                    .set_packet(packet, designation, &bytes)
                    .map_err(|e| self.protocol_error(e))?;
            }
        }

        for (&row, text) in &self.text {
            buffer.set_text_row(row, text.as_bytes());
        }

        Ok(buffer)
    }

    /// Magazine enhancement data carried with this page, if any.
    pub fn magazine_enhancement(&self) -> Result<Option<PageEnhancement>, CaptureError> {
        let Some(text) = &self.packet29 else {
            return Ok(None);
        };
        let bytes = self.row_bytes("packet29", text)?;
        PageEnhancement::parse(&bytes)
            .map(Some)
            .map_err(|e| self.protocol_error(e))
    }
}

/// Parse whitespace-separated or contiguous hex bytes.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits ({})", digits.len()));
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).map_err(|e| e.to_string())?;
            u8::from_str_radix(pair, 16).map_err(|e| format!("{:?}: {}", pair, e))
        })
        .collect()
}

/// Format bytes as space-separated hex.
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn parse_capture(json: &str) -> Result<Vec<CapturedPage>, CaptureError> {
    Ok(serde_json::from_str(json)?)
}

/// Load every page of a capture into `store`. Returns the number of pages.
pub fn load_capture(path: &Path, store: &mut PageStore) -> Result<usize, CaptureError> {
    let json = std::fs::read_to_string(path)?;
    let pages = parse_capture(&json)?;
    insert_pages(&pages, store)
}

pub fn insert_pages(pages: &[CapturedPage], store: &mut PageStore) -> Result<usize, CaptureError> {
    for captured in pages {
        let buffer = captured.to_buffer()?;
        if let Some(enhancement) = captured.magazine_enhancement()? {
            debug!("Magazine {} enhancement data from page {}", magazine_of(buffer.page), captured.page);
            store.set_magazine_enhancement(magazine_of(buffer.page), enhancement);
        }
        store.insert(buffer);
    }
    Ok(pages.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use teletext_protocol::{encode_hamming84, encode_parity};

    fn hex_row(text: &str) -> String {
        let mut bytes = [encode_parity(b' '); ROW_WIDTH];
        for (dst, src) in bytes.iter_mut().zip(text.bytes()) {
            *dst = encode_parity(src);
        }
        format_hex(&bytes)
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("15 02 49"), Ok(vec![0x15, 0x02, 0x49]));
        assert_eq!(parse_hex("1502"), Ok(vec![0x15, 0x02]));
        assert!(parse_hex("150").is_err());
        assert!(parse_hex("zz").is_err());
        assert_eq!(format_hex(&[0x0A, 0xFF]), "0A FF");
    }

    #[test]
    fn test_capture_from_json() {
        let json = format!(
            r#"[{{"page": "100", "sub_page": 1, "rows": ["{}", "{}"]}},
                {{"page": "1a0", "text": {{"3": "Plain"}}}}]"#,
            hex_row(""),
            hex_row("Hello")
        );
        let pages = parse_capture(&json).unwrap();
        let mut store = PageStore::new();
        assert_eq!(insert_pages(&pages, &mut store).unwrap(), 2);

        let page = store.page(0x100, 1).unwrap();
        assert_eq!(page.rows[1][0], encode_parity(b'H'));
        assert_eq!(store.page(0x1A0, 0).unwrap().rows[3][4], encode_parity(b'n'));
    }

    #[test]
    fn test_capture_serde_round_trip() {
        let mut page = CapturedPage {
            page: "123".to_string(),
            sub_page: 4,
            row24: Some(hex_row("Index")),
            ..Default::default()
        };
        page.packet27.insert(0, format_hex(&[encode_hamming84(0xF); ROW_WIDTH]));
        let json = serde_json::to_string(&vec![page]).unwrap();

        let parsed = parse_capture(&json).unwrap();
        let buffer = parsed[0].to_buffer().unwrap();
        assert_eq!((buffer.page, buffer.sub_page), (0x123, 4));
        assert!(buffer.row24.is_some());
        assert!(buffer.packet27[0].is_some());
    }

    #[test]
    fn test_capture_errors() {
        let bad_page = CapturedPage {
            page: "950".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            bad_page.to_buffer(),
            Err(CaptureError::Protocol {
                source: ProtocolError::InvalidPageNumber(0x950),
                ..
            })
        ));

        let short_row = CapturedPage {
            page: "100".to_string(),
            rows: vec!["20 20".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            short_row.to_buffer(),
            Err(CaptureError::Protocol {
                source: ProtocolError::PacketLength { expected: 40, actual: 2 },
                ..
            })
        ));

        assert!(matches!(parse_capture("{"), Err(CaptureError::Json(_))));
    }
}
