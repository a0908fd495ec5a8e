//! Terminal and JSON output of decoded pages.

use colored::{Color, ColoredString, Colorize};
use serde::Serialize;
use teletext::decode::{flash_visible, Attributes, Cell, Charset, DrawInstruction, FlashMode};
use teletext::navigation::{CatchCursor, Zoom};
use teletext::{DecodedPage, NavigationState, PageInfo};
use teletext_protocol::{BODY_ROWS, TRANSPARENT};

/// Colours of the FastText label bar.
const LABEL_COLOURS: [Color; 4] = [Color::Red, Color::Green, Color::Yellow, Color::Cyan];

/// Unicode sextant for a G1 mosaic code.
pub fn sextant(code: u8) -> char {
    let cells = (code & 0x1F) | (code & 0x40) >> 1;
    match cells {
        0 => ' ',
        21 => '\u{258C}',
        42 => '\u{2590}',
        63 => '\u{2588}',
        n => {
            let skipped = (n > 21) as u32 + (n > 42) as u32;
            char::from_u32(0x1FB00 + n as u32 - 1 - skipped).unwrap_or('?')
        }
    }
}

/// Terminal character for a grid cell.
pub fn display_char(cell: Cell, attrs: &Attributes) -> char {
    match (cell, attrs.charset) {
        (Cell::Inherit, _) => ' ',
        (Cell::Glyph(c), Charset::G1Contiguous | Charset::G1Separated) => sextant(c as u8),
        (Cell::Glyph(_), Charset::G3) => '\u{2592}',
        (Cell::Glyph(_), Charset::Drcs(_)) => '\u{25C6}',
        (Cell::Glyph(c), _) => c,
    }
}

fn rgb(palette: &[u16; 32], index: u8) -> Color {
    let value = palette[(index & 0x1F) as usize];
    let nibble = |shift: u16| ((value >> shift) & 0xF) as u8 * 17;
    Color::TrueColor {
        r: nibble(8),
        g: nibble(4),
        b: nibble(0),
    }
}

/// Rows shown for a zoom mode, with their repeat count.
pub fn visible_rows(zoom: Zoom, row_count: usize) -> Vec<usize> {
    match zoom {
        Zoom::Full => (0..row_count).collect(),
        Zoom::TopHalf => (0..BODY_ROWS / 2).flat_map(|r| [r, r]).collect(),
        Zoom::BottomHalf => (BODY_ROWS / 2..BODY_ROWS).flat_map(|r| [r, r]).collect(),
    }
}

fn in_cursor(cursor: Option<CatchCursor>, row: usize, col: usize) -> bool {
    cursor.map_or(false, |c| c.row as usize == row && (c.col as usize..c.col as usize + 3).contains(&col))
}

fn styled_cell(decoded: &DecodedPage, row: usize, col: usize, phase_ms: u64, highlight: bool) -> ColoredString {
    let attrs = &decoded.attrs[row][col];
    let visible = !attrs.conceal && flash_visible(attrs, phase_ms);
    let c = if visible {
        display_char(decoded.grid[row][col], attrs)
    } else {
        ' '
    };

    let (mut fg, mut bg) = (attrs.fg, attrs.bg);
    if attrs.inverted {
        std::mem::swap(&mut fg, &mut bg);
    }
    if attrs.flash == FlashMode::Adjacent && !flash_visible(&Attributes { flash: FlashMode::Normal, ..*attrs }, phase_ms) {
        fg ^= 0x08;
    }

    let palette = &decoded.info.palette;
    let mut text = c.to_string().as_str().color(rgb(palette, fg));
    if bg != TRANSPARENT {
        text = text.on_color(rgb(palette, bg));
    }
    if attrs.underline {
        text = text.underline();
    }
    if highlight {
        text = text.reversed();
    }
    text
}

/// Render the page as coloured terminal text.
pub fn render_terminal(decoded: &DecodedPage, state: &NavigationState, phase_ms: u64) -> String {
    let row_count = if decoded.info.row24_shown { BODY_ROWS + 1 } else { BODY_ROWS };
    let mut out = String::new();
    for row in visible_rows(state.zoom, row_count) {
        for col in 0..decoded.grid[row].len() {
            let cell = styled_cell(decoded, row, col, phase_ms, in_cursor(state.catching, row, col));
            out.push_str(&cell.to_string());
            if state.enlarged {
                out.push_str(&cell.to_string());
            }
        }
        out.push('\n');
    }
    out
}

/// Render the page as plain text, one line per row.
pub fn render_plain(decoded: &DecodedPage, state: &NavigationState) -> String {
    let row_count = if decoded.info.row24_shown { BODY_ROWS + 1 } else { BODY_ROWS };
    visible_rows(state.zoom, row_count)
        .into_iter()
        .map(|row| {
            let line: String = decoded.grid[row]
                .iter()
                .zip(decoded.attrs[row].iter())
                .map(|(&cell, attrs)| if attrs.conceal { ' ' } else { display_char(cell, attrs) })
                .collect();
            line.trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The FastText bar below the page.
pub fn render_labels(labels: &[Option<String>; 4], colour: bool) -> String {
    labels
        .iter()
        .zip(LABEL_COLOURS)
        .map(|(label, c)| {
            let text = format!("{:<12}", label.as_deref().unwrap_or("-"));
            if colour {
                text.as_str().color(c).to_string()
            } else {
                text
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn status_line(state: &NavigationState) -> String {
    let mut status = format!("P{:03X}/{:02X}", state.page, state.sub_page);
    if state.pending {
        status.push_str(" (waiting)");
    }
    if let Some(cursor) = state.catching {
        status.push_str(&format!(" catch {:03X}", cursor.page));
    }
    status
}

/// JSON view of a rendered page.
#[derive(Debug, Serialize)]
pub struct PageView<'a> {
    pub page: String,
    pub sub_page: String,
    pub rows: Vec<String>,
    pub info: &'a PageInfo,
    pub draws: &'a [DrawInstruction],
    pub labels: &'a [Option<String>; 4],
    pub state: &'a NavigationState,
}

impl<'a> PageView<'a> {
    pub fn new(decoded: &'a DecodedPage, state: &'a NavigationState, labels: &'a [Option<String>; 4]) -> Self {
        let row_count = if decoded.info.row24_shown { BODY_ROWS + 1 } else { BODY_ROWS };
        PageView {
            page: format!("{:03X}", decoded.info.page),
            sub_page: format!("{:02X}", decoded.info.sub_page),
            rows: (0..row_count).map(|row| decoded.row_text(row)).collect(),
            info: &decoded.info,
            draws: &decoded.draws,
            labels,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use teletext::{DecoderSettings, NavigationSettings, PageStore, PassiveSource, Teletext};
    use teletext_protocol::RawPageBuffer;

    fn rendered(text: &[u8]) -> (DecodedPage, NavigationState) {
        let cache = PageStore::shared();
        let mut page = RawPageBuffer::blank(0x100, 0);
        page.set_text_row(1, text);
        cache.write().insert(page);
        let mut teletext = Teletext::new(
            cache,
            Arc::new(PassiveSource),
            DecoderSettings::default(),
            NavigationSettings::default(),
        )
        .unwrap();
        let decoded = teletext.render().unwrap();
        (decoded, teletext.state().clone())
    }

    #[test]
    fn test_sextants() {
        assert_eq!(sextant(0x20), ' ');
        assert_eq!(sextant(0x21), '\u{1FB00}');
        assert_eq!(sextant(0x35), '\u{258C}');
        assert_eq!(sextant(0x7F), '\u{2588}');
        assert_eq!(sextant(0x7E), '\u{1FB3B}');
    }

    #[test]
    fn test_plain_render() {
        let (decoded, state) = rendered(b"Hello\x11\x7F\x18Hidden");
        let text = render_plain(&decoded, &state);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), BODY_ROWS);
        assert!(lines[0].starts_with("  P100"));
        assert_eq!(lines[1], "Hello \u{2588}");
    }

    #[test]
    fn test_zoom_rows() {
        assert_eq!(visible_rows(Zoom::Full, 24).len(), 24);
        assert_eq!(&visible_rows(Zoom::TopHalf, 24)[..4], &[0, 0, 1, 1]);
        assert_eq!(visible_rows(Zoom::BottomHalf, 25)[0], 12);
    }

    #[test]
    fn test_json_view() {
        let (decoded, state) = rendered(b"News");
        let labels = [Some("Index".to_string()), None, None, None];
        let json = serde_json::to_value(PageView::new(&decoded, &state, &labels)).unwrap();
        assert_eq!(json["page"], "100");
        assert_eq!(json["sub_page"], "00");
        assert!(json["rows"][1].as_str().unwrap().starts_with("News"));
        assert_eq!(json["labels"][0], "Index");
        assert_eq!(json["state"]["pending"], false);
    }

    #[test]
    fn test_labels_and_status() {
        let labels = [Some("News".to_string()), None, None, Some("Sport".to_string())];
        let bar = render_labels(&labels, false);
        assert!(bar.starts_with("News"));
        assert!(bar.contains("Sport"));

        let (_, state) = rendered(b"");
        assert_eq!(status_line(&state), "P100/00");
    }
}
