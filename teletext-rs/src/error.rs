//! Engine error type.

use teletext_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the engine's public API.
///
/// Decoding itself never fails: transmission errors are masked inside the
/// decoders. These errors come from caller-supplied values and from explicit
/// lookups of pages that have not been received.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Page {page:03X}/{sub_page:02X} is not in the page cache")]
    NotCached { page: u16, sub_page: u8 },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
