//! Per-cell character and attribute types of a decoded page.

use serde::Serialize;
use teletext_protocol::{NationalSubset, GRID_ROWS, ROW_WIDTH};

/// One character cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Cell {
    Glyph(char),
    /// Lower half of a double-height character in the row above.
    Inherit,
}

impl Cell {
    pub const SPACE: Cell = Cell::Glyph(' ');

    /// The glyph, if the cell is not a double-height continuation.
    pub fn glyph(self) -> Option<char> {
        match self {
            Cell::Glyph(c) => Some(c),
            Cell::Inherit => None,
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::SPACE
    }
}

/// Character set a cell is rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Charset {
    G0(NationalSubset),
    G1Contiguous,
    G1Separated,
    G2,
    G3,
    /// DRCS slot: 0..16 global sub-pages, 16..32 normal sub-pages.
    Drcs(u8),
}

/// Flash behaviour of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FlashMode {
    #[default]
    Steady,
    Normal,
    Inverted,
    /// Alternate between the colour and its counterpart in the adjacent CLUT.
    Adjacent,
}

/// Presentation attributes of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Attributes {
    /// Foreground colour index (0..=31).
    pub fg: u8,
    /// Background colour index (0..=31).
    pub bg: u8,
    pub charset: Charset,
    pub flash: FlashMode,
    /// 0 slow (1 Hz), 1 fast (2 Hz), 2..=4 fast phase 1..3.
    pub flash_rate: u8,
    pub conceal: bool,
    pub boxed: bool,
    pub double_height: bool,
    pub double_width: bool,
    pub underline: bool,
    pub inverted: bool,
    /// Set on cells written or modified by Level 2.5 enhancement data.
    pub level25: bool,
}

impl Default for Attributes {
    fn default() -> Self {
        Attributes {
            fg: 7,
            bg: 0,
            charset: Charset::G0(NationalSubset::English),
            flash: FlashMode::Steady,
            flash_rate: 0,
            conceal: false,
            boxed: false,
            double_height: false,
            double_width: false,
            underline: false,
            inverted: false,
            level25: false,
        }
    }
}

pub type CharacterGrid = [[Cell; ROW_WIDTH]; GRID_ROWS];
pub type AttributeGrid = [[Attributes; ROW_WIDTH]; GRID_ROWS];

pub fn blank_grid() -> CharacterGrid {
    [[Cell::SPACE; ROW_WIDTH]; GRID_ROWS]
}

pub fn blank_attributes() -> AttributeGrid {
    [[Attributes::default(); ROW_WIDTH]; GRID_ROWS]
}

/// Whether a cell's glyph is drawn at `phase_ms` of the host's monotonic
/// clock.
///
/// Slow flash has a 1 s period and fast flash 500 ms, both visible in the
/// first half of the period. Phased fast flash (rates 2..=4) splits a 1.5 s
/// cycle in three and hides the glyph only during its own third. Inverted
/// flash is the complement. Adjacent-CLUT flash changes colour, not
/// visibility.
pub fn flash_visible(attrs: &Attributes, phase_ms: u64) -> bool {
    let on = match attrs.flash_rate {
        0 => phase_ms % 1000 < 500,
        1 => phase_ms % 500 < 250,
        rate @ 2..=4 => (phase_ms % 1500) / 500 != (rate - 2) as u64,
        _ => true,
    };
    match attrs.flash {
        FlashMode::Steady | FlashMode::Adjacent => true,
        FlashMode::Normal => on,
        FlashMode::Inverted => !on,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_attributes() {
        let attrs = Attributes::default();
        assert_eq!((attrs.fg, attrs.bg), (7, 0));
        assert_eq!(attrs.charset, Charset::G0(NationalSubset::English));
        assert_eq!(blank_grid()[24][39], Cell::SPACE);
    }

    #[test]
    fn test_flash_phases() {
        let mut attrs = Attributes::default();
        assert!(flash_visible(&attrs, 700));

        attrs.flash = FlashMode::Normal;
        assert!(flash_visible(&attrs, 100));
        assert!(!flash_visible(&attrs, 700));
        assert!(flash_visible(&attrs, 1100));

        attrs.flash = FlashMode::Inverted;
        assert!(!flash_visible(&attrs, 100));
        assert!(flash_visible(&attrs, 700));

        attrs.flash = FlashMode::Normal;
        attrs.flash_rate = 1;
        assert!(!flash_visible(&attrs, 300));

        attrs.flash_rate = 3;
        assert!(flash_visible(&attrs, 100));
        assert!(!flash_visible(&attrs, 600));
        assert!(flash_visible(&attrs, 1100));
    }

    #[test]
    fn test_inherit_has_no_glyph() {
        assert_eq!(Cell::Inherit.glyph(), None);
        assert_eq!(Cell::Glyph('x').glyph(), Some('x'));
    }
}
