//! Runtime settings of the decoder and navigation controller.
//!
//! Both structs deserialize from the host's configuration file; missing
//! fields take their defaults.

use serde::Deserialize;
use teletext_protocol::validate_page;

use crate::error::{EngineError, Result};

/// Presentation options applied on every decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DecoderSettings {
    /// Apply Level 2.5 enhancement data (packets 26 to 29).
    pub level25: bool,
    /// Reveal concealed text.
    pub hint: bool,
    /// Show row 24 (the FLOF link row) when transmitted.
    pub show_flof: bool,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        DecoderSettings {
            level25: true,
            hint: false,
            show_flof: true,
        }
    }
}

/// Initial navigation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NavigationSettings {
    /// Page shown at start, as a hexadecimal page number (0x100 is "100").
    pub start_page: u16,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        NavigationSettings { start_page: 0x100 }
    }
}

impl NavigationSettings {
    /// Parse a page number typed as three digits ("100", "1A0").
    pub fn parse_page(text: &str) -> Result<u16> {
        let page = u16::from_str_radix(text.trim(), 16)
            .map_err(|e| EngineError::Config(format!("Invalid page number {:?}: {}", text, e)))?;
        Ok(validate_page(page)?)
    }

    pub fn validate(&self) -> Result<()> {
        validate_page(self.start_page)?;
        Ok(())
    }
}
