//! teletext library - page decoding and navigation for broadcast teletext
//!
//! This library turns the raw pages cached by a receiver into character and
//! attribute grids (Level 1 plus Level 2.5 enhancements) and implements the
//! navigation state machine of a teletext set: digit entry, paging,
//! FastText/FLOF colour keys, TOP skipping and page catching.

pub mod decode;
pub mod engine;
pub mod error;
pub mod navigation;
pub mod settings;
pub mod store;
pub mod top;

// Re-export commonly used types
pub use decode::{decode_buffer, decode_page, DecodedPage, PageInfo};
pub use engine::Teletext;
pub use error::{EngineError, Result};
pub use navigation::{Action, ColourKey, NavigationState, Navigator, PageSource, PassiveSource};
pub use settings::{DecoderSettings, NavigationSettings};
pub use store::{PageCache, PageStore};
pub use top::TopClass;
