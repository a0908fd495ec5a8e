//! Level 1 presentation: spacing attributes folded left to right per row.
//!
//! Each control code takes effect either at its own cell ("set-at") or from
//! the next cell on ("set-after"):
//!
//! ```text
//! set-at     09 steady, 0C normal size, 18 conceal, 19/1A contiguous/separated,
//!            1C black background, 1D new background, 1E hold mosaic
//! set-after  00-07 alpha colour, 08 flash, 0A/0B end/start box,
//!            0D-0F double height/width/size, 10-17 mosaic colour, 1B ESC,
//!            1F release mosaic
//! ```

use log::trace;
use teletext_protocol::{
    encode_parity, magazine_of, map_g0, parity_or_space, FlofLinks, NationalSubset, PageEnhancement,
    RawPageBuffer, DEFAULT_PALETTE, GRID_ROWS, ROW_WIDTH, TRANSPARENT,
};

use super::attributes::{blank_attributes, blank_grid, Attributes, Cell, Charset, FlashMode};
use super::{level25, DecodedPage, PageInfo};
use crate::settings::DecoderSettings;
use crate::store::PageStore;
use crate::top::TopClass;

/// Page-wide parameters shared by every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowContext {
    pub primary: NationalSubset,
    /// G0 set selected by ESC.
    pub secondary: NationalSubset,
    /// CLUT offsets added to Level 1 colours.
    pub fg_offset: u8,
    pub bg_offset: u8,
    /// Replacement for a black background (the default row colour).
    pub black_substitute: Option<u8>,
    /// Cells outside start/end box are transparent.
    pub boxed_page: bool,
    /// Double height is only honoured on rows 1..=22.
    pub allow_double_height: bool,
    pub hint: bool,
}

impl RowContext {
    /// Background index of a Level 1 black background.
    pub fn black_background(&self) -> u8 {
        self.black_substitute.unwrap_or(self.bg_offset)
    }
}

impl Default for RowContext {
    fn default() -> Self {
        RowContext {
            primary: NationalSubset::English,
            secondary: NationalSubset::English,
            fg_offset: 0,
            bg_offset: 0,
            black_substitute: None,
            boxed_page: false,
            allow_double_height: true,
            hint: false,
        }
    }
}

/// One decoded cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellOutput {
    pub cell: Cell,
    pub attrs: Attributes,
}

/// Attribute state of a row, reset to white-on-black alphanumerics at the
/// start of every row.
#[derive(Debug, Clone)]
pub struct RowDecodeState {
    ctx: RowContext,
    fg: u8,
    bg: u8,
    mosaic: bool,
    separated: bool,
    hold: bool,
    /// Last mosaic character and whether it was separated.
    held: Option<(u8, bool)>,
    flash: bool,
    conceal: bool,
    boxed: bool,
    double_height: bool,
    double_width: bool,
    secondary: bool,
}

impl RowDecodeState {
    pub fn new(ctx: RowContext) -> Self {
        RowDecodeState {
            ctx,
            fg: 7,
            bg: 0,
            mosaic: false,
            separated: false,
            hold: false,
            held: None,
            flash: false,
            conceal: false,
            boxed: false,
            double_height: false,
            double_width: false,
            secondary: false,
        }
    }

    /// Decode one transmitted byte.
    pub fn step(&mut self, byte: u8) -> CellOutput {
        let code = parity_or_space(byte);
        self.set_at(code);
        let output = self.render(code);
        self.set_after(code);
        output
    }

    fn set_at(&mut self, code: u8) {
        match code {
            0x09 => self.flash = false,
            0x0C => self.set_size(false, false),
            0x18 => self.conceal = true,
            0x19 => self.separated = false,
            0x1A => self.separated = true,
            0x1C => self.bg = 0,
            0x1D => self.bg = self.fg,
            0x1E => self.hold = true,
            _ => {}
        }
    }

    fn set_after(&mut self, code: u8) {
        match code {
            0x00..=0x07 => {
                if self.mosaic {
                    self.held = None;
                }
                self.fg = code;
                self.mosaic = false;
                self.conceal = false;
            }
            0x08 => self.flash = true,
            0x0A => self.boxed = false,
            0x0B => self.boxed = true,
            0x0D => self.set_size(true, false),
            0x0E => self.set_size(false, true),
            0x0F => self.set_size(true, true),
            0x10..=0x17 => {
                self.fg = code - 0x10;
                self.mosaic = true;
                self.conceal = false;
            }
            0x1B => self.secondary = !self.secondary,
            0x1F => self.hold = false,
            _ => {}
        }
    }

    fn set_size(&mut self, double_height: bool, double_width: bool) {
        if (double_height, double_width) != (self.double_height, self.double_width) {
            self.held = None;
        }
        self.double_height = double_height;
        self.double_width = double_width;
    }

    fn subset(&self) -> NationalSubset {
        if self.secondary {
            self.ctx.secondary
        } else {
            self.ctx.primary
        }
    }

    fn mosaic_charset(separated: bool) -> Charset {
        if separated {
            Charset::G1Separated
        } else {
            Charset::G1Contiguous
        }
    }

    fn render(&mut self, code: u8) -> CellOutput {
        let subset = self.subset();
        let (cell, charset) = if code < 0x20 {
            match self.held {
                Some((held, separated)) if self.hold && self.mosaic => {
                    (Cell::Glyph(held as char), Self::mosaic_charset(separated))
                }
                _ => (Cell::SPACE, Charset::G0(subset)),
            }
        } else if self.mosaic && code & 0x20 != 0 {
            self.held = Some((code, self.separated));
            (Cell::Glyph(code as char), Self::mosaic_charset(self.separated))
        } else {
            (Cell::Glyph(map_g0(subset, code)), Charset::G0(subset))
        };

        let bg = match self.ctx.black_substitute {
            Some(row_colour) if self.bg == 0 => row_colour,
            _ => self.bg + self.ctx.bg_offset,
        };
        let mut attrs = Attributes {
            fg: self.fg + self.ctx.fg_offset,
            bg,
            charset,
            flash: if self.flash { FlashMode::Normal } else { FlashMode::Steady },
            conceal: self.conceal && !self.ctx.hint,
            boxed: self.boxed,
            double_height: self.double_height && self.ctx.allow_double_height,
            double_width: self.double_width,
            ..Attributes::default()
        };

        if self.ctx.boxed_page && !self.boxed {
            attrs.fg = TRANSPARENT;
            attrs.bg = TRANSPARENT;
            return CellOutput { cell: Cell::SPACE, attrs };
        }
        CellOutput { cell, attrs }
    }
}

/// National sub-sets and colour parameters for a page.
fn page_context(
    store: &PageStore,
    buffer: &RawPageBuffer,
    settings: &DecoderSettings,
) -> (RowContext, [u16; 32], u8) {
    let control = buffer.control();
    let page_enhancement = buffer.packet28[0]
        .as_ref()
        .and_then(|packet| PageEnhancement::parse(packet).ok());

    let (primary, enhancement) = match page_enhancement {
        Some(enhancement) => (enhancement.default_subset(), Some(enhancement)),
        None => match store.magazine_enhancement(buffer.page) {
            Some(m29) => {
                let designation = (m29.default_designation & 0x78) | control.national_option;
                (NationalSubset::from_designation(designation), Some(m29.clone()))
            }
            None => (control.national_subset(), None),
        },
    };

    let mut ctx = RowContext {
        primary,
        secondary: enhancement.as_ref().map_or(primary, PageEnhancement::second_subset),
        boxed_page: control.is_boxed(),
        hint: settings.hint,
        ..RowContext::default()
    };

    match enhancement {
        Some(enhancement) if settings.level25 => {
            let (fg_offset, bg_offset) = enhancement.remap();
            ctx.fg_offset = fg_offset;
            ctx.bg_offset = bg_offset;
            if enhancement.black_background_substitution {
                ctx.black_substitute = Some(enhancement.default_row_colour);
            }
            (ctx, enhancement.palette, enhancement.default_screen_colour)
        }
        _ => (ctx, DEFAULT_PALETTE, 0),
    }
}

/// Row 0 as displayed: a page number label in columns 0..8, then the
/// transmitted header text.
fn header_row(buffer: &RawPageBuffer) -> [u8; ROW_WIDTH] {
    let mut bytes = buffer.rows[0];
    let label = format!("  P{:03X}  ", buffer.page);
    for (dst, src) in bytes.iter_mut().zip(label.bytes()) {
        *dst = encode_parity(src);
    }
    bytes
}

/// Decode (page, sub-page) from the store. A missing page decodes as an
/// all-space page.
pub fn decode_page(
    store: &mut PageStore,
    page: u16,
    sub_page: u8,
    settings: &DecoderSettings,
) -> DecodedPage {
    let top_class = store
        .top_table()
        .map_or(TopClass::NotFound, |top| top.class_of(page));
    let buffer = store.load_page(page, sub_page);
    decode_buffer(store, &buffer, settings, top_class)
}

/// Decode a buffer. The store supplies magazine enhancement data and the
/// object and DRCS pages referenced by Level 2.5 objects.
pub fn decode_buffer(
    store: &PageStore,
    buffer: &RawPageBuffer,
    settings: &DecoderSettings,
    top_class: TopClass,
) -> DecodedPage {
    let control = buffer.control();
    let (ctx, palette, screen_colour) = page_context(store, buffer, settings);
    let row24_shown = settings.show_flof && buffer.row24.is_some();
    let row_count = if row24_shown { GRID_ROWS } else { GRID_ROWS - 1 };

    let mut grid = blank_grid();
    let mut attrs = blank_attributes();
    if ctx.boxed_page {
        for cell in attrs.iter_mut().flatten() {
            cell.fg = TRANSPARENT;
            cell.bg = TRANSPARENT;
        }
    }

    let mut row = 0;
    while row < row_count {
        let bytes = match row {
            0 => header_row(buffer),
            _ => buffer.row(row).copied().unwrap_or([encode_parity(b' '); ROW_WIDTH]),
        };
        let mut state = RowDecodeState::new(RowContext {
            allow_double_height: (1..=22).contains(&row),
            ..ctx
        });
        for (col, &byte) in bytes.iter().enumerate() {
            let output = state.step(byte);
            grid[row][col] = output.cell;
            attrs[row][col] = output.attrs;
        }

        if row == 0 && control.suppress_header {
            grid[0] = [Cell::SPACE; ROW_WIDTH];
            for cell in attrs[0].iter_mut() {
                *cell = Attributes {
                    fg: TRANSPARENT,
                    bg: TRANSPARENT,
                    ..Attributes::default()
                };
            }
        }

        if attrs[row].iter().any(|a| a.double_height) {
            trace!("Row {} of {:03X} has double height", row, buffer.page);
            for col in 0..ROW_WIDTH {
                let upper = attrs[row][col];
                if upper.double_height {
                    grid[row + 1][col] = Cell::Inherit;
                    attrs[row + 1][col] = upper;
                } else {
                    grid[row + 1][col] = Cell::SPACE;
                    attrs[row + 1][col] = Attributes {
                        double_width: false,
                        flash: FlashMode::Steady,
                        conceal: false,
                        ..upper
                    };
                }
            }
            row += 2;
        } else {
            row += 1;
        }
    }

    let info = PageInfo {
        page: buffer.page,
        sub_page: buffer.sub_page,
        control,
        boxed: control.is_boxed(),
        subtitle: control.subtitle,
        newsflash: control.newsflash,
        national: ctx.primary,
        flof: buffer.packet27[0]
            .as_ref()
            .map(|packet| FlofLinks::parse(packet, magazine_of(buffer.page))),
        top_class,
        level25_applied: false,
        palette,
        screen_colour,
        row24_shown,
        black_background: ctx.black_background(),
    };

    let mut decoded = DecodedPage {
        grid,
        attrs,
        info,
        draws: Vec::new(),
    };
    if settings.level25 {
        level25::apply_enhancements(store, buffer, &mut decoded);
    }
    decoded
}
