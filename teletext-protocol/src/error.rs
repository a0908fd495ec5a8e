//! Error types for the teletext wire layer.

use thiserror::Error;

/// Errors raised while decoding transmitted teletext bytes.
///
/// Transmission errors are expected on broadcast data; callers are supposed
/// to mask them locally rather than abort a page decode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Hamming 8/4 byte with an uncorrectable (double-bit) error.
    #[error("Uncorrectable Hamming 8/4 byte: 0x{0:02X}")]
    Hamming(u8),

    /// Hamming 24/18 triplet with an uncorrectable error.
    #[error("Uncorrectable Hamming 24/18 triplet: {0:02X?}")]
    Hamming24([u8; 3]),

    /// Odd-parity byte failed its parity check.
    #[error("Parity error in byte 0x{0:02X}")]
    Parity(u8),

    /// Page number outside 0x100..=0x8FF.
    #[error("Invalid page number: 0x{0:03X}")]
    InvalidPageNumber(u16),

    /// Sub-page outside 0..=0x79.
    #[error("Invalid sub-page: 0x{0:02X}")]
    InvalidSubPage(u16),

    /// A packet buffer had the wrong length.
    #[error("Invalid packet length: expected {expected} bytes, got {actual}")]
    PacketLength { expected: usize, actual: usize },

    /// Designation code outside 0..=15 or not meaningful for the packet.
    #[error("Unsupported designation code {designation} for packet {packet}")]
    Designation { packet: u8, designation: u8 },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;
