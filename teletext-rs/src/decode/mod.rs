//! Page decoding: raw packets to a character/attribute grid.
//!
//! [`level1`] interprets the spacing attributes of the text rows;
//! [`level25`] then overlays the enhancement objects of packets 26 to 29;
//! [`drcs`] decodes downloadable character bitmaps referenced by them.

pub mod attributes;
pub mod drcs;
pub mod level1;
pub mod level25;

use serde::Serialize;
use teletext_protocol::{FlofLinks, HeaderControl, NationalSubset};

pub use attributes::{
    blank_attributes, blank_grid, flash_visible, AttributeGrid, Attributes, Cell, CharacterGrid,
    Charset, FlashMode,
};
pub use drcs::DrcsGlyph;
pub use level1::{decode_buffer, decode_page, CellOutput, RowContext, RowDecodeState};
pub use level25::apply_enhancements;

use crate::top::TopClass;

/// Page-level facts gathered while decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub page: u16,
    pub sub_page: u8,
    pub control: HeaderControl,
    pub boxed: bool,
    pub subtitle: bool,
    pub newsflash: bool,
    /// Primary G0 national sub-set.
    pub national: NationalSubset,
    pub flof: Option<FlofLinks>,
    pub top_class: TopClass,
    /// Whether packet 26 objects were applied.
    pub level25_applied: bool,
    /// 12-bit RGB entries of CLUTs 0..3.
    pub palette: [u16; 32],
    /// Colour index of the screen border.
    pub screen_colour: u8,
    /// Whether row 24 is part of the grid.
    pub row24_shown: bool,
    /// Background index a Level 1 black background decodes to.
    pub black_background: u8,
}

/// Something the renderer draws on top of the character grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DrawKind {
    /// G3 smoothed mosaic or line-drawing character.
    Shape { code: u8 },
    /// Downloaded character; `glyph` is absent when the DRCS page is not
    /// cached.
    Drcs {
        slot: u8,
        character: u8,
        glyph: Option<DrcsGlyph>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawInstruction {
    pub row: u8,
    pub col: u8,
    pub fg: u8,
    pub bg: u8,
    pub kind: DrawKind,
}

/// Result of decoding one page.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPage {
    pub grid: CharacterGrid,
    pub attrs: AttributeGrid,
    pub info: PageInfo,
    /// Draw instructions in emission order.
    pub draws: Vec<DrawInstruction>,
}

impl DecodedPage {
    /// Text of one row with inherited cells as spaces. Mosaic, G3 and DRCS
    /// cells are shown by their raw code.
    pub fn row_text(&self, row: usize) -> String {
        self.grid
            .get(row)
            .map(|cells| cells.iter().map(|c| c.glyph().unwrap_or(' ')).collect())
            .unwrap_or_default()
    }
}
