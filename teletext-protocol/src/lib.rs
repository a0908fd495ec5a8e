//! Wire-level definitions for broadcast teletext (ETS 300 706).
//!
//! This crate covers everything that can be decided from the transmitted
//! bytes alone: the error-correcting codecs, the raw page buffer assembled
//! by a demultiplexer, and decoders for the linking and enhancement packets.
//!
//! # Packet coding
//!
//! ```text
//! header / designation codes   Hamming 8/4    -> nibbles
//! enhancement triplets         Hamming 24/18  -> 18-bit words
//! displayable text             odd parity     -> 7-bit codes
//! ```
//!
//! # Example
//!
//! ```rust
//! use teletext_protocol::{decode_hamming84, encode_hamming84, RawPageBuffer, next_decimal_page};
//!
//! assert_eq!(decode_hamming84(encode_hamming84(0x7)), Ok(0x7));
//!
//! let mut page = RawPageBuffer::blank(0x100, 0);
//! page.set_text_row(1, b"Hello, World!");
//! assert_eq!(next_decimal_page(0x109), 0x110);
//! ```

pub mod charset;
pub mod codec;
pub mod error;
pub mod packets;
pub mod types;

pub use charset::{compose, map_g0, map_g2, NationalSubset};
pub use codec::{
    decode_hamming2418, decode_hamming84, decode_hamming84_pair, decode_parity, encode_hamming2418,
    encode_hamming84, encode_parity, hamming_or_marker, parity_or_space, HAMMING_ERROR,
};
pub use error::{ProtocolError, Result};
pub use packets::{
    encode_packet, packet_triplet, CompositionLinks, FlofLink, FlofLinks, LinkFunction,
    PageEnhancement, PageLink, Triplet, DEFAULT_PALETTE, TRANSPARENT, TRIPLETS_PER_PACKET,
};
pub use types::{
    decimal_index, is_decimal_page, magazine_of, next_decimal_page, page_from_parts,
    previous_decimal_page, validate_page, validate_sub_page, HeaderControl, RawPageBuffer,
    BODY_ROWS, BTT_PAGE, FIRST_PAGE, GRID_ROWS, LAST_DECIMAL_PAGE, LAST_PAGE, MAX_SUB_PAGE,
    MOT_PAGE_LOW, ROW_WIDTH,
};
