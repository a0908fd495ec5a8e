//! Level 2.5 enhancement objects.
//!
//! Enhancement data is a stream of 18-bit triplets addressed in a 507-entry
//! triplet space:
//!
//! ```text
//! triplet n  ->  packet n / 13 + 3, offset 3 * (n % 13) + 1
//! packets  3..=23  body rows (object pages only)
//! packets 24, 25   extra rows (object pages only)
//! packets 26..=41  packet 26 designations 0..=15
//! ```
//!
//! The displayed page's local enhancement data starts at triplet 299 (26/0).
//! It may invoke objects defined locally or on POP/GPOP object pages, which
//! in turn may invoke objects of lower priority (active > adaptive >
//! passive). Passive objects are queued and stamped last.

use log::{debug, trace};
use teletext_protocol::{
    compose, hamming_or_marker, magazine_of, map_g0, map_g2, packet_triplet, page_from_parts,
    CompositionLinks, NationalSubset, ProtocolError, RawPageBuffer, Triplet, GRID_ROWS,
    HAMMING_ERROR, MOT_PAGE_LOW, ROW_WIDTH, TRANSPARENT, TRIPLETS_PER_PACKET,
};

use super::attributes::{Attributes, Cell, Charset, FlashMode};
use super::drcs::{DrcsGlyph, DRCS_CHARACTERS};
use super::{DecodedPage, DrawInstruction, DrawKind};
use crate::store::PageStore;

/// Size of the triplet space, and the step cap of one object.
const TRIPLET_SPACE: usize = 507;
/// First triplet of packet 26/0.
const LOCAL_START: usize = 299;
const MAX_DEPTH: u8 = 3;
/// Triplets evaluated for one page across all objects.
const STEP_BUDGET: usize = TRIPLET_SPACE * (MAX_DEPTH as usize + 1);
const MAX_PASSIVE: usize = 64;
const LAST_COLUMN: u8 = ROW_WIDTH as u8 - 1;
const LAST_ROW: u8 = GRID_ROWS as u8 - 1;

/// Triplets of one page buffer, addressed by triplet number.
#[derive(Clone, Copy)]
struct TripletSpace<'a> {
    page: &'a RawPageBuffer,
}

impl<'a> TripletSpace<'a> {
    /// `None` past the end of the space or in a packet that was not
    /// received.
    fn get(&self, n: usize) -> Option<Result<Triplet, ProtocolError>> {
        if n >= TRIPLET_SPACE {
            return None;
        }
        let packet = match n / TRIPLETS_PER_PACKET + 3 {
            row @ 3..=25 => self.page.row(row)?,
            designation => self.page.packet26[designation - 26].as_ref()?,
        };
        let bytes = packet_triplet(packet, n % TRIPLETS_PER_PACKET)?;
        Some(Triplet::decode(&bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    /// The page's own enhancement data.
    Local,
    Active,
    Adaptive,
    Passive,
}

impl ObjectKind {
    /// Object type invoked by modes 0x11..=0x13, defined by 0x15..=0x17.
    fn from_type(object_type: u8) -> Option<Self> {
        match object_type & 0x03 {
            1 => Some(ObjectKind::Active),
            2 => Some(ObjectKind::Adaptive),
            3 => Some(ObjectKind::Passive),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            ObjectKind::Local => 4,
            ObjectKind::Active => 3,
            ObjectKind::Adaptive => 2,
            ObjectKind::Passive => 1,
        }
    }

    fn may_invoke(self, other: ObjectKind) -> bool {
        other.rank() < self.rank()
    }
}

/// Where an object is anchored, plus a pending origin modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectEvalContext {
    pub origin_row: u8,
    pub origin_col: u8,
    /// Row and column offset consumed by the next invocation.
    pub temp_offset: Option<(u8, u8)>,
}

/// Object and DRCS pages of the displayed page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ObjectLinks {
    gpop: Option<u16>,
    pop: Option<u16>,
    gdrcs: Option<u16>,
    drcs: Option<u16>,
}

impl ObjectLinks {
    /// Links from packet 27/4, falling back to the magazine's MOT.
    fn resolve(store: &PageStore, page: &RawPageBuffer) -> Self {
        if let Some(packet) = page.packet27[4].as_ref() {
            let links = CompositionLinks::parse(packet);
            let resolved = ObjectLinks {
                gpop: links.gpop.map(|l| l.page),
                pop: links.pop.map(|l| l.page),
                gdrcs: links.gdrcs.map(|l| l.page),
                drcs: links.drcs.map(|l| l.page),
            };
            if resolved != ObjectLinks::default() {
                return resolved;
            }
        }
        Self::from_mot(store, page.page).unwrap_or_default()
    }

    /// MOT layout: rows 1..=8 hold two bytes per page (tens 0..F, units
    /// 0..9); rows 19/20 hold the GPOP and POP 1..7 links, rows 21/22 the
    /// GDRCS and DRCS 1..7 links, four 10-byte links per row.
    fn from_mot(store: &PageStore, page: u16) -> Option<Self> {
        let magazine = magazine_of(page);
        let mot_page = (magazine as u16) << 8 | MOT_PAGE_LOW;
        let mot = store.page(mot_page, store.first_sub_page(mot_page)?)?;

        let units = (page & 0x0F) as usize;
        let tens = (page >> 4 & 0x0F) as usize;
        if units > 9 {
            return None;
        }
        let index = tens * 10 + units;
        let row = &mot.rows[1 + index / 20];
        let objects = hamming_or_marker(row[(index % 20) * 2]);
        let drcs = hamming_or_marker(row[(index % 20) * 2 + 1]);

        let mut links = ObjectLinks::default();
        if objects != HAMMING_ERROR && objects & 0x08 != 0 {
            links.gpop = mot_link(mot, 19, 0);
            links.pop = match objects & 0x07 {
                0 => None,
                i => mot_link(mot, 19, i),
            };
        }
        if drcs != HAMMING_ERROR && drcs & 0x08 != 0 {
            links.gdrcs = mot_link(mot, 21, 0);
            links.drcs = match drcs & 0x07 {
                0 => None,
                i => mot_link(mot, 21, i),
            };
        }
        trace!("MOT {:03X} links for {:03X}: {:?}", mot_page, page, links);
        Some(links)
    }
}

/// Link `index` (0..8) of the MOT link rows starting at `first_row`:
/// magazine with a valid flag in bit 3, units, tens.
fn mot_link(mot: &RawPageBuffer, first_row: usize, index: u8) -> Option<u16> {
    let row = &mot.rows[first_row + index as usize / 4];
    let offset = (index as usize % 4) * 10;
    let magazine = hamming_or_marker(row[offset]);
    let units = hamming_or_marker(row[offset + 1]);
    let tens = hamming_or_marker(row[offset + 2]);
    if [magazine, units, tens].contains(&HAMMING_ERROR) || magazine & 0x08 == 0 {
        return None;
    }
    Some(page_from_parts(magazine, tens << 4 | units))
}

/// A passive object waiting to be stamped.
struct QueuedObject<'a> {
    space: TripletSpace<'a>,
    start: usize,
    ctx: ObjectEvalContext,
    depth: u8,
}

/// Evaluation state of one object.
struct ObjectState {
    kind: ObjectKind,
    ctx: ObjectEvalContext,
    row: u8,
    col: u8,
    /// Last column reached by attribute runs, absolute.
    end_col: u8,
    g0: Option<NationalSubset>,
    drcs_global: u8,
    drcs_normal: u8,
    /// Attributes carried by passive objects to the cells they write.
    pen: Attributes,
}

impl ObjectState {
    fn new(kind: ObjectKind, ctx: ObjectEvalContext) -> Self {
        ObjectState {
            kind,
            ctx,
            row: 0,
            col: 0,
            end_col: LAST_COLUMN,
            g0: None,
            drcs_global: 0,
            drcs_normal: 0,
            pen: Attributes {
                level25: true,
                ..Attributes::default()
            },
        }
    }

    fn absolute_row(&self) -> u8 {
        self.ctx.origin_row.saturating_add(self.row)
    }

    fn absolute_col(&self) -> u8 {
        self.ctx.origin_col.saturating_add(self.col)
    }

    /// Active position, if it lies on the grid.
    fn position(&self) -> Option<(usize, usize)> {
        let (row, col) = (self.absolute_row(), self.absolute_col());
        (row <= LAST_ROW && col <= LAST_COLUMN).then_some((row as usize, col as usize))
    }
}

#[derive(Clone, Copy)]
enum ColourTarget {
    Foreground,
    Background,
}

impl ColourTarget {
    fn of(self, attrs: &mut Attributes) -> &mut u8 {
        match self {
            ColourTarget::Foreground => &mut attrs.fg,
            ColourTarget::Background => &mut attrs.bg,
        }
    }
}

struct Interpreter<'a, 'd> {
    store: &'a PageStore,
    page: &'a RawPageBuffer,
    decoded: &'d mut DecodedPage,
    links: ObjectLinks,
    default_subset: NationalSubset,
    passive: Vec<QueuedObject<'a>>,
    /// Triplets left for the rest of the page.
    budget: usize,
}

impl<'a, 'd> Interpreter<'a, 'd> {
    fn eval(
        &mut self,
        space: TripletSpace<'a>,
        start: usize,
        kind: ObjectKind,
        ctx: ObjectEvalContext,
        depth: u8,
    ) {
        let mut state = ObjectState::new(kind, ctx);
        if kind == ObjectKind::Adaptive {
            state.end_col = adaptive_end(space, start, &state);
        }

        let mut n = start;
        for _ in 0..TRIPLET_SPACE {
            let triplet = match space.get(n) {
                Some(Ok(triplet)) => triplet,
                Some(Err(e)) => {
                    debug!("Object at {:03X} triplet {} terminated: {}", space.page.page, n, e);
                    return;
                }
                None => return,
            };
            if self.budget == 0 {
                debug!("Enhancement budget of {:03X} exhausted", self.page.page);
                return;
            }
            self.budget -= 1;
            n += 1;

            if triplet.is_row_address() {
                if !self.row_triplet(&mut state, space, n, triplet, depth) {
                    return;
                }
            } else {
                self.column_triplet(&mut state, triplet);
            }
        }
    }

    /// Handle a row-group triplet; `false` ends the object.
    fn row_triplet(
        &mut self,
        state: &mut ObjectState,
        space: TripletSpace<'a>,
        next: usize,
        triplet: Triplet,
        depth: u8,
    ) -> bool {
        let row = match triplet.address {
            40 => 24,
            address => address - 40,
        };
        match triplet.mode {
            0x00 => {
                if triplet.data >> 5 == 0 {
                    self.decoded.info.screen_colour = triplet.data & 0x1F;
                }
            }
            0x01 => {
                state.row = row;
                state.col = 0;
                self.full_row_colour(state, triplet.data);
                self.row_changed(state, space, next);
            }
            0x04 => {
                state.row = row;
                if triplet.data < ROW_WIDTH as u8 {
                    state.col = triplet.data;
                }
                self.row_changed(state, space, next);
            }
            0x07 if triplet.address == 0x3F => {
                state.row = 0;
                state.col = 0;
                self.full_row_colour(state, triplet.data);
                self.row_changed(state, space, next);
            }
            0x10 => {
                if triplet.data < 72 {
                    state.ctx.temp_offset = Some((triplet.address - 40, triplet.data));
                }
            }
            0x11..=0x13 => self.invoke(state, triplet, depth),
            0x15..=0x17 | 0x1F => return false,
            0x18 => {
                if triplet.data & 0x40 != 0 {
                    state.drcs_normal = triplet.data & 0x0F;
                } else {
                    state.drcs_global = triplet.data & 0x0F;
                }
            }
            _ => {}
        }
        true
    }

    fn row_changed(&self, state: &mut ObjectState, space: TripletSpace<'a>, next: usize) {
        if state.kind == ObjectKind::Adaptive {
            state.end_col = adaptive_end(space, next, state);
        }
    }

    fn full_row_colour(&mut self, state: &ObjectState, data: u8) {
        let colour = data & 0x1F;
        let first = state.absolute_row();
        let last = if data >> 5 & 0x03 == 0x03 { LAST_ROW } else { first };
        let black = self.decoded.info.black_background;
        let boxed = self.decoded.info.boxed;
        for row in first..=last.min(LAST_ROW) {
            for attrs in self.decoded.attrs[row as usize].iter_mut() {
                // Cells outside the boxes of a boxed page stay transparent.
                if boxed && attrs.fg == TRANSPARENT && attrs.bg == TRANSPARENT {
                    continue;
                }
                if attrs.bg == black || attrs.bg == 0 {
                    attrs.bg = colour;
                    attrs.level25 = true;
                }
            }
        }
    }

    fn invoke(&mut self, state: &mut ObjectState, triplet: Triplet, depth: u8) {
        let Some(kind) = ObjectKind::from_type(triplet.mode) else {
            return;
        };
        if !state.kind.may_invoke(kind) || depth >= MAX_DEPTH {
            debug!("{:?} object may not invoke {:?} object", state.kind, kind);
            return;
        }
        if self.budget == 0 {
            return;
        }

        let (row_offset, col_offset) = state.ctx.temp_offset.take().unwrap_or((0, 0));
        let ctx = ObjectEvalContext {
            origin_row: state.absolute_row().saturating_add(row_offset),
            origin_col: state.absolute_col().saturating_add(col_offset),
            temp_offset: None,
        };

        let Some((object_space, start)) = self.locate(triplet, kind) else {
            return;
        };
        if kind == ObjectKind::Passive {
            if self.passive.len() >= MAX_PASSIVE {
                debug!("Passive object queue of {:03X} full", self.page.page);
                return;
            }
            self.passive.push(QueuedObject {
                space: object_space,
                start,
                ctx,
                depth: depth + 1,
            });
        } else {
            self.eval(object_space, start, kind, ctx, depth + 1);
        }
    }

    /// Find the definition triplet an invocation refers to and return the
    /// space and triplet number the object body starts at.
    fn locate(&self, triplet: Triplet, kind: ObjectKind) -> Option<(TripletSpace<'a>, usize)> {
        let (object_space, definition) = match triplet.address >> 3 & 0x03 {
            1 => {
                let designation = ((triplet.address & 0x01) << 3 | triplet.data >> 4) as usize;
                let index = (triplet.data & 0x0F) as usize;
                if index >= TRIPLETS_PER_PACKET {
                    return None;
                }
                (
                    TripletSpace { page: self.page },
                    LOCAL_START + designation * TRIPLETS_PER_PACKET + index,
                )
            }
            source => {
                let link = if source == 3 { self.links.gpop } else { self.links.pop };
                let Some(object_page) = link else {
                    debug!("No object page linked for {:03X}", self.page.page);
                    return None;
                };
                let sub_page = triplet.data & 0x0F;
                let Some(buffer) = self.store.page(object_page, sub_page) else {
                    debug!("Object page {:03X}/{:02X} not cached", object_page, sub_page);
                    return None;
                };
                let pointers = packet_triplet(&buffer.rows[1], (triplet.data >> 4 & 0x07) as usize)?;
                let bits = Triplet::decode(&pointers).ok()?.to_bits();
                let pointer = (if triplet.address & 0x01 != 0 { bits >> 9 } else { bits }) & 0x1FF;
                (TripletSpace { page: buffer }, pointer as usize)
            }
        };

        match object_space.get(definition) {
            Some(Ok(found))
                if found.is_row_address()
                    && (0x15..=0x17).contains(&found.mode)
                    && ObjectKind::from_type(found.mode) == Some(kind) =>
            {
                Some((object_space, definition + 1))
            }
            _ => {
                debug!(
                    "No {:?} object definition at triplet {} of {:03X}",
                    kind, definition, object_space.page.page
                );
                None
            }
        }
    }

    fn column_triplet(&mut self, state: &mut ObjectState, triplet: Triplet) {
        state.col = triplet.address;
        let Some((row, col)) = state.position() else {
            return;
        };
        let data = triplet.data;

        match triplet.mode {
            0x00 if data >> 5 == 0 => self.colour_run(state, row, col, data, ColourTarget::Foreground),
            0x03 if data >> 5 == 0 => self.colour_run(state, row, col, data, ColourTarget::Background),
            0x01 if data >= 0x20 => {
                let charset = if self.decoded.attrs[row][col].underline {
                    Charset::G1Separated
                } else {
                    Charset::G1Contiguous
                };
                self.write(state, row, col, Cell::Glyph(data as char), charset);
            }
            0x02 | 0x0B if data >= 0x20 => {
                self.write(state, row, col, Cell::Glyph(data as char), Charset::G3);
                self.draw(row, col, DrawKind::Shape { code: data });
            }
            0x07 => {
                let flash = match data & 0x03 {
                    0 => FlashMode::Steady,
                    1 => FlashMode::Normal,
                    2 => FlashMode::Inverted,
                    _ => FlashMode::Adjacent,
                };
                let rate = data >> 2 & 0x07;
                self.attribute_run(state, row, col, |attrs| {
                    attrs.flash = flash;
                    attrs.flash_rate = rate;
                });
            }
            0x08 => state.g0 = Some(NationalSubset::from_designation(data)),
            0x09 if data >= 0x20 => {
                let subset = self.subset_at(state, row, col);
                self.write(state, row, col, Cell::Glyph(map_g0(subset, data)), Charset::G0(subset));
            }
            0x0C => {
                self.attribute_run(state, row, col, |attrs| {
                    attrs.double_height = data & 0x01 != 0;
                    attrs.boxed = data & 0x02 != 0;
                    attrs.conceal = data & 0x04 != 0;
                    attrs.inverted = data & 0x08 != 0;
                    attrs.underline = data & 0x10 != 0;
                    attrs.double_width = data & 0x40 != 0;
                });
            }
            0x0D => self.drcs_character(state, row, col, data),
            0x0F if data >= 0x20 => {
                self.write(state, row, col, Cell::Glyph(map_g2(data)), Charset::G2);
            }
            0x10..=0x1F if data >= 0x20 => {
                let subset = self.subset_at(state, row, col);
                let glyph = if triplet.mode == 0x10 && data == 0x2A {
                    '@'
                } else {
                    compose(map_g0(subset, data), triplet.mode & 0x0F)
                };
                self.write(state, row, col, Cell::Glyph(glyph), Charset::G0(subset));
            }
            _ => {}
        }
    }

    fn subset_at(&self, state: &ObjectState, row: usize, col: usize) -> NationalSubset {
        state.g0.unwrap_or(match self.decoded.attrs[row][col].charset {
            Charset::G0(subset) => subset,
            _ => self.default_subset,
        })
    }

    fn write(&mut self, state: &ObjectState, row: usize, col: usize, cell: Cell, charset: Charset) {
        let attrs = &mut self.decoded.attrs[row][col];
        if state.kind == ObjectKind::Passive {
            *attrs = Attributes { charset, ..state.pen };
        } else {
            attrs.charset = charset;
        }
        attrs.level25 = true;
        self.decoded.grid[row][col] = cell;
    }

    fn draw(&mut self, row: usize, col: usize, kind: DrawKind) {
        let attrs = self.decoded.attrs[row][col];
        self.decoded.draws.push(DrawInstruction {
            row: row as u8,
            col: col as u8,
            fg: attrs.fg,
            bg: attrs.bg,
            kind,
        });
    }

    /// Apply an attribute from `col` to the effective end column, or to the
    /// pen of a passive object.
    fn attribute_run(
        &mut self,
        state: &mut ObjectState,
        row: usize,
        col: usize,
        apply: impl Fn(&mut Attributes),
    ) {
        if state.kind == ObjectKind::Passive {
            apply(&mut state.pen);
            return;
        }
        let end = (state.end_col as usize).max(col);
        for attrs in self.decoded.attrs[row][col..=end].iter_mut() {
            apply(attrs);
            attrs.level25 = true;
        }
    }

    /// Colour cells from `col` while they still carry the colour the run
    /// started with.
    fn colour_run(
        &mut self,
        state: &mut ObjectState,
        row: usize,
        col: usize,
        colour: u8,
        target: ColourTarget,
    ) {
        if state.kind == ObjectKind::Passive {
            *target.of(&mut state.pen) = colour;
            return;
        }
        let end = (state.end_col as usize).max(col);
        let cells = &mut self.decoded.attrs[row][col..=end];
        let original = *target.of(&mut cells[0]);
        for attrs in cells.iter_mut() {
            let value = target.of(attrs);
            if *value != original {
                break;
            }
            *value = colour;
            attrs.level25 = true;
        }
    }

    fn drcs_character(&mut self, state: &ObjectState, row: usize, col: usize, data: u8) {
        let character = data & 0x3F;
        if character >= DRCS_CHARACTERS {
            return;
        }
        let normal = data & 0x40 != 0;
        let (link, sub_page, slot) = if normal {
            (self.links.drcs, state.drcs_normal, 16 + state.drcs_normal)
        } else {
            (self.links.gdrcs, state.drcs_global, state.drcs_global)
        };
        let glyph = link
            .and_then(|page| self.store.page(page, sub_page))
            .and_then(|buffer| DrcsGlyph::decode(buffer, character));
        if glyph.is_none() {
            debug!("DRCS page for slot {} not available", slot);
        }

        self.write(state, row, col, Cell::Glyph(character as char), Charset::Drcs(slot));
        self.draw(
            row,
            col,
            DrawKind::Drcs {
                slot,
                character,
                glyph,
            },
        );
    }

    fn flush_passive(&mut self) {
        for queued in std::mem::take(&mut self.passive) {
            self.eval(queued.space, queued.start, ObjectKind::Passive, queued.ctx, queued.depth);
        }
    }
}

/// Effective end column of an adaptive object: its origin plus the greatest
/// column addressed before the next row change, definition or termination.
fn adaptive_end(space: TripletSpace<'_>, from: usize, state: &ObjectState) -> u8 {
    let mut widest = 0;
    for n in from..TRIPLET_SPACE {
        match space.get(n) {
            Some(Ok(t)) if !t.is_row_address() => widest = widest.max(t.address),
            Some(Ok(t)) if matches!(t.mode, 0x01 | 0x04 | 0x07 | 0x15..=0x17 | 0x1F) => break,
            Some(Ok(_)) => {}
            _ => break,
        }
    }
    state.ctx.origin_col.saturating_add(widest).min(LAST_COLUMN)
}

/// Overlay the page's packet 26 enhancement data on a Level 1 decode.
///
/// Pages without packet 26 are left untouched. Transmission errors end the
/// affected object silently; nothing here fails.
pub fn apply_enhancements(store: &PageStore, page: &RawPageBuffer, decoded: &mut DecodedPage) {
    if !page.packet26.iter().any(Option::is_some) {
        return;
    }
    let steps = enhance(store, page, decoded);
    trace!("Evaluated {} triplets for {:03X}", steps, page.page);
    decoded.info.level25_applied = true;
}

/// Run the local enhancement data and the passive queue, returning the
/// number of triplets evaluated.
fn enhance(store: &PageStore, page: &RawPageBuffer, decoded: &mut DecodedPage) -> usize {
    let links = ObjectLinks::resolve(store, page);
    let default_subset = decoded.info.national;
    let mut interpreter = Interpreter {
        store,
        page,
        decoded,
        links,
        default_subset,
        passive: Vec::new(),
        budget: STEP_BUDGET,
    };
    interpreter.eval(
        TripletSpace { page },
        LOCAL_START,
        ObjectKind::Local,
        ObjectEvalContext::default(),
        0,
    );
    interpreter.flush_passive();
    STEP_BUDGET - interpreter.budget
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::level1::decode_buffer;
    use crate::settings::DecoderSettings;
    use crate::top::TopClass;
    use teletext_protocol::{encode_hamming84, encode_packet};

    fn t(address: u8, mode: u8, data: u8) -> u32 {
        Triplet { address, mode, data }.to_bits()
    }

    fn terminate() -> u32 {
        t(63, 0x1F, 0)
    }

    /// A page whose packet 26 carries `words` from designation 0 on.
    fn enhanced_page(page: u16, words: &[u32]) -> RawPageBuffer {
        let mut buffer = RawPageBuffer::blank(page, 0);
        for (designation, chunk) in words.chunks(TRIPLETS_PER_PACKET).enumerate() {
            buffer.packet26[designation] = Some(encode_packet(designation as u8, chunk));
        }
        buffer
    }

    fn decode(store: &PageStore, buffer: &RawPageBuffer) -> DecodedPage {
        decode_buffer(store, buffer, &DecoderSettings::default(), TopClass::NotFound)
    }

    fn level1_only(buffer: &RawPageBuffer) -> DecodedPage {
        let settings = DecoderSettings {
            level25: false,
            ..DecoderSettings::default()
        };
        decode_buffer(&PageStore::new(), buffer, &settings, TopClass::NotFound)
    }

    #[test]
    fn test_local_characters_and_colour_run() {
        let buffer = enhanced_page(
            0x100,
            &[t(45, 0x04, 0), t(3, 0x00, 1), t(10, 0x09, b'X'), terminate()],
        );
        let decoded = decode(&PageStore::new(), &buffer);

        assert!(decoded.info.level25_applied);
        assert_eq!(decoded.grid[5][10], Cell::Glyph('X'));
        assert!(decoded.attrs[5][10].level25);
        assert_eq!(decoded.attrs[5][2].fg, 7);
        assert!(decoded.attrs[5][3..].iter().all(|a| a.fg == 1));
    }

    #[test]
    fn test_colour_run_stops_at_level1_colour_change() {
        let mut buffer = enhanced_page(0x100, &[t(45, 0x04, 0), t(0, 0x00, 4), terminate()]);
        buffer.rows[5] = crate::decode::level1::tests::coded_row(&[b'a', b'b', 0x02, b'c']);
        let decoded = decode(&PageStore::new(), &buffer);

        assert_eq!(decoded.attrs[5][0].fg, 4);
        assert_eq!(decoded.attrs[5][2].fg, 4);
        assert_eq!(decoded.attrs[5][3].fg, 2);
    }

    #[test]
    fn test_corrupt_triplet_terminates_object() {
        let mut buffer = enhanced_page(
            0x100,
            &[
                t(45, 0x04, 0),
                t(3, 0x00, 1),
                t(10, 0x09, b'X'),
                t(12, 0x09, b'Y'),
                terminate(),
            ],
        );
        // Two-bit error in triplet 2.
        if let Some(packet) = buffer.packet26[0].as_mut() {
            packet[7] ^= 0x03;
        }
        let decoded = decode(&PageStore::new(), &buffer);
        let plain = level1_only(&buffer);

        assert!(decoded.attrs[5][3..].iter().all(|a| a.fg == 1));
        assert_eq!(decoded.grid[5][10], Cell::SPACE);
        assert_eq!(decoded.grid[5][12], Cell::SPACE);
        for row in (0..25).filter(|&r| r != 5) {
            assert_eq!(decoded.grid[row], plain.grid[row]);
            assert_eq!(decoded.attrs[row], plain.attrs[row]);
        }
    }

    #[test]
    fn test_truncated_packet_terminates_object() {
        // Designation 1 is missing: the object runs off the received data.
        let words: Vec<u32> = std::iter::once(t(46, 0x04, 0))
            .chain((0..12).map(|col| t(col, 0x09, b'a' + col)))
            .collect();
        let mut buffer = enhanced_page(0x100, &words);
        buffer.packet26[2] = Some(encode_packet(2, &[t(46, 0x04, 0), t(30, 0x09, b'Z')]));
        let decoded = decode(&PageStore::new(), &buffer);

        assert_eq!(decoded.grid[6][11], Cell::Glyph('l'));
        assert_eq!(decoded.grid[6][30], Cell::SPACE);
    }

    #[test]
    fn test_local_object_invocation() {
        let buffer = enhanced_page(
            0x100,
            &[
                t(45, 0x04, 10),
                t(40, 0x11, 0x04),
                terminate(),
                terminate(),
                t(40, 0x15, 0x04),
                t(0, 0x09, b'Q'),
                t(2, 0x00, 2),
                // An active object may not invoke another active object.
                t(40, 0x11, 0x04),
                terminate(),
            ],
        );
        let decoded = decode(&PageStore::new(), &buffer);

        assert_eq!(decoded.grid[5][10], Cell::Glyph('Q'));
        assert_eq!(decoded.attrs[5][11].fg, 7);
        assert_eq!(decoded.attrs[5][12].fg, 2);
        assert_eq!(decoded.attrs[5][39].fg, 2);
    }

    #[test]
    fn test_origin_modifier_offsets_invocation() {
        let buffer = enhanced_page(
            0x100,
            &[
                t(45, 0x04, 0),
                t(42, 0x10, 3),
                t(40, 0x11, 0x05),
                t(40, 0x11, 0x05),
                terminate(),
                t(40, 0x15, 0x05),
                t(0, 0x09, b'O'),
                terminate(),
            ],
        );
        let decoded = decode(&PageStore::new(), &buffer);

        // First invocation consumes the offset, the second one has none.
        assert_eq!(decoded.grid[7][3], Cell::Glyph('O'));
        assert_eq!(decoded.grid[5][0], Cell::Glyph('O'));
    }

    #[test]
    fn test_passive_objects_stamped_last() {
        let buffer = enhanced_page(
            0x100,
            &[
                t(42, 0x04, 0),
                t(40, 0x13, 0x05),
                t(40, 0x11, 0x08),
                terminate(),
                terminate(),
                t(40, 0x17, 0x05),
                t(0, 0x00, 3),
                t(1, 0x09, b'P'),
                t(40, 0x15, 0x08),
                t(1, 0x09, b'A'),
                t(2, 0x09, b'B'),
                terminate(),
            ],
        );
        let decoded = decode(&PageStore::new(), &buffer);

        assert_eq!(decoded.grid[2][1], Cell::Glyph('P'));
        assert_eq!(decoded.attrs[2][1].fg, 3);
        // The passive colour only applies to cells the object writes.
        assert_eq!(decoded.attrs[2][0].fg, 7);
        assert_eq!(decoded.grid[2][2], Cell::Glyph('B'));
        assert_eq!(decoded.attrs[2][2].fg, 7);
    }

    #[test]
    fn test_adaptive_end_column() {
        let object = |mode: u8, definition: u8| {
            vec![
                t(41, 0x04, 0),
                t(40, mode, 0x04),
                terminate(),
                terminate(),
                t(40, definition, 0x04),
                t(0, 0x03, 4),
                t(5, 0x09, b'a'),
                terminate(),
            ]
        };

        let adaptive = decode(&PageStore::new(), &enhanced_page(0x100, &object(0x12, 0x16)));
        assert!(adaptive.attrs[1][..=5].iter().all(|a| a.bg == 4));
        assert_eq!(adaptive.attrs[1][6].bg, 0);

        let active = decode(&PageStore::new(), &enhanced_page(0x100, &object(0x11, 0x15)));
        assert!(active.attrs[1].iter().all(|a| a.bg == 4));
    }

    #[test]
    fn test_definition_type_must_match() {
        // Invokes an adaptive object, but the definition is for an active one.
        let buffer = enhanced_page(
            0x100,
            &[
                t(41, 0x04, 0),
                t(40, 0x12, 0x03),
                terminate(),
                t(40, 0x15, 0x03),
                t(0, 0x09, b'N'),
                terminate(),
            ],
        );
        let decoded = decode(&PageStore::new(), &buffer);
        assert_eq!(decoded.grid[1][0], Cell::SPACE);
    }

    #[test]
    fn test_character_sets_and_draws() {
        let buffer = enhanced_page(
            0x100,
            &[
                t(43, 0x04, 0),
                t(0, 0x02, 0x30),
                t(1, 0x0F, 0x23),
                t(2, 0x12, b'e'),
                t(3, 0x10, 0x2A),
                t(4, 0x01, 0x7F),
                t(5, 0x08, 0x01),
                t(6, 0x09, 0x7B),
                terminate(),
            ],
        );
        let decoded = decode(&PageStore::new(), &buffer);

        assert_eq!(decoded.grid[3][0], Cell::Glyph('0'));
        assert_eq!(decoded.attrs[3][0].charset, Charset::G3);
        assert_eq!(
            decoded.draws,
            vec![DrawInstruction {
                row: 3,
                col: 0,
                fg: 7,
                bg: 0,
                kind: DrawKind::Shape { code: 0x30 },
            }]
        );
        assert_eq!(decoded.grid[3][1], Cell::Glyph('£'));
        assert_eq!(decoded.attrs[3][1].charset, Charset::G2);
        assert_eq!(decoded.grid[3][2], Cell::Glyph('é'));
        assert_eq!(decoded.grid[3][3], Cell::Glyph('@'));
        assert_eq!(decoded.attrs[3][4].charset, Charset::G1Contiguous);
        assert_eq!(decoded.grid[3][6], Cell::Glyph('ä'));
        assert_eq!(decoded.attrs[3][6].charset, Charset::G0(NationalSubset::German));
    }

    #[test]
    fn test_row_and_screen_colour() {
        let buffer = enhanced_page(
            0x100,
            &[t(40, 0x00, 5), t(44, 0x01, 0x60 | 4), t(42, 0x01, 6), terminate()],
        );
        let decoded = decode(&PageStore::new(), &buffer);

        assert_eq!(decoded.info.screen_colour, 5);
        assert_eq!(decoded.attrs[2][0].bg, 6);
        assert_eq!(decoded.attrs[3][0].bg, 0);
        assert_eq!(decoded.attrs[4][0].bg, 4);
        assert_eq!(decoded.attrs[24][39].bg, 4);
    }

    #[test]
    fn test_display_attributes_and_flash() {
        let buffer = enhanced_page(
            0x100,
            &[t(48, 0x04, 0), t(30, 0x0C, 0x04 | 0x10), t(35, 0x07, 0x02 | 1 << 2), terminate()],
        );
        let decoded = decode(&PageStore::new(), &buffer);

        assert!(!decoded.attrs[8][29].conceal);
        assert!(decoded.attrs[8][30].conceal && decoded.attrs[8][30].underline);
        assert_eq!(decoded.attrs[8][34].flash, FlashMode::Steady);
        assert_eq!(decoded.attrs[8][39].flash, FlashMode::Inverted);
        assert_eq!(decoded.attrs[8][39].flash_rate, 1);
    }

    /// Object page with an active object whose definition is at triplet 20,
    /// reached through the lower pointer of pointer triplet 0.
    fn object_page(page: u16, sub_page: u8, glyph: u8) -> RawPageBuffer {
        let mut buffer = RawPageBuffer::blank(page, sub_page);
        buffer.rows[1] = encode_packet(0, &[20]);
        let mut words = vec![terminate(); 7];
        words.extend_from_slice(&[t(40, 0x15, 0), t(0, 0x09, glyph), terminate()]);
        buffer.rows[4] = encode_packet(1, &words);
        buffer
    }

    #[test]
    fn test_pop_object_through_page_link() {
        let mut store = PageStore::new();
        store.insert(object_page(0x1B0, 1, b'L'));

        let mut buffer = enhanced_page(0x100, &[t(49, 0x04, 2), t(48, 0x11, 0x01), terminate()]);
        let link = 0x01 | 0x04 | 1 << 4 | 0xB0 << 7;
        buffer.packet27[4] = Some(encode_packet(4, &[link, 0x0002, 0]));
        let decoded = decode(&store, &buffer);

        assert_eq!(decoded.grid[9][2], Cell::Glyph('L'));
    }

    #[test]
    fn test_pop_object_missing_page_is_skipped() {
        let mut buffer = enhanced_page(0x100, &[t(49, 0x04, 2), t(48, 0x11, 0x01), t(3, 0x09, b'k')]);
        let link = 0x01 | 0x04 | 1 << 4 | 0xB0 << 7;
        buffer.packet27[4] = Some(encode_packet(4, &[link, 0x0002, 0]));
        let decoded = decode(&PageStore::new(), &buffer);

        assert_eq!(decoded.grid[9][2], Cell::SPACE);
        assert_eq!(decoded.grid[9][3], Cell::Glyph('k'));
    }

    /// MOT for magazine 1 giving page 100 POP link 1 (1B0) and DRCS link 1
    /// (1C0).
    fn mot_page() -> RawPageBuffer {
        let mut mot = RawPageBuffer::blank(0x1FE, 0);
        for row in [1, 19, 20, 21, 22] {
            mot.rows[row] = [encode_hamming84(0); ROW_WIDTH];
        }
        mot.rows[1][0] = encode_hamming84(0x08 | 1);
        mot.rows[1][1] = encode_hamming84(0x08 | 1);
        mot.rows[19][10..13].copy_from_slice(&[
            encode_hamming84(0x08 | 1),
            encode_hamming84(0x0),
            encode_hamming84(0xB),
        ]);
        mot.rows[21][10..13].copy_from_slice(&[
            encode_hamming84(0x08 | 1),
            encode_hamming84(0x0),
            encode_hamming84(0xC),
        ]);
        mot
    }

    #[test]
    fn test_mot_fallback_links() {
        let mut store = PageStore::new();
        store.insert(mot_page());
        store.insert(object_page(0x1B0, 1, b'M'));
        store.insert(RawPageBuffer::blank(0x1C0, 0));

        let links = ObjectLinks::from_mot(&store, 0x100).unwrap();
        assert_eq!(links.pop, Some(0x1B0));
        assert_eq!(links.gpop, None);
        assert_eq!(links.drcs, Some(0x1C0));
        assert_eq!(links.gdrcs, None);
        // Pages with hex units have no MOT entry.
        assert_eq!(ObjectLinks::from_mot(&store, 0x10A), None);

        let buffer = enhanced_page(
            0x100,
            &[t(49, 0x04, 0), t(48, 0x11, 0x01), t(5, 0x0D, 0x40 | 5), t(6, 0x0D, 7), terminate()],
        );
        let decoded = decode(&store, &buffer);

        assert_eq!(decoded.grid[9][0], Cell::Glyph('M'));
        assert_eq!(decoded.attrs[9][5].charset, Charset::Drcs(16));
        assert_eq!(decoded.draws.len(), 2);
        match &decoded.draws[0].kind {
            DrawKind::Drcs { slot, character, glyph } => {
                assert_eq!((*slot, *character), (16, 5));
                assert!(glyph.is_some());
            }
            other => panic!("unexpected draw {:?}", other),
        }
        // No GDRCS page: the instruction is still emitted, without a glyph.
        assert_eq!(
            decoded.draws[1].kind,
            DrawKind::Drcs {
                slot: 0,
                character: 7,
                glyph: None
            }
        );
    }

    #[test]
    fn test_object_runs_to_end_of_triplet_space() {
        // Packets 26/0..15 full of characters and no termination triplet.
        let words: Vec<u32> = std::iter::once(t(45, 0x04, 0))
            .chain((0..207u32).map(|i| t((i % 40) as u8, 0x09, b'a' + (i % 26) as u8)))
            .collect();
        let buffer = enhanced_page(0x100, &words);
        let plain = level1_only(&buffer);
        let mut decoded = plain.clone();

        assert_eq!(enhance(&PageStore::new(), &buffer, &mut decoded), TRIPLET_SPACE - LOCAL_START);
        // Columns 0..6 were written six times, the last pass wins.
        assert_eq!(decoded.grid[5][6], Cell::Glyph((b'a' + (206 % 26) as u8) as char));
        assert_eq!(decoded.grid[5][0], Cell::Glyph((b'a' + (200 % 26) as u8) as char));
        for row in (0..25).filter(|&r| r != 5) {
            assert_eq!(decoded.grid[row], plain.grid[row]);
            assert_eq!(decoded.attrs[row], plain.attrs[row]);
        }
    }

    /// Object page 1B0/1: an active object at triplet 0 that invokes the
    /// adaptive object at triplet 122 with every triplet it has.
    fn fan_out_page() -> RawPageBuffer {
        const ADAPTIVE: u32 = 122;
        let mut buffer = RawPageBuffer::blank(0x1B0, 1);
        buffer.rows[1] = encode_packet(0, &[ADAPTIVE << 9]);
        let mut words = vec![t(40, 0x15, 0)];
        words.extend(std::iter::repeat(t(49, 0x12, 0x01)).take(120));
        words.push(terminate());
        words.push(t(40, 0x16, 0));
        words.extend(std::iter::repeat(t(5, 0x00, 1)).take(140));
        words.push(terminate());
        for (i, chunk) in words.chunks(TRIPLETS_PER_PACKET).enumerate() {
            buffer.rows[3 + i] = encode_packet(0, chunk);
        }
        buffer
    }

    #[test]
    fn test_nested_invocations_share_one_budget() {
        let mut store = PageStore::new();
        store.insert(fan_out_page());

        let words: Vec<u32> = std::iter::once(t(49, 0x04, 0))
            .chain(std::iter::repeat(t(48, 0x11, 0x01)).take(200))
            .chain(std::iter::once(terminate()))
            .collect();
        let mut buffer = enhanced_page(0x100, &words);
        let link = 0x01 | 0x04 | 1 << 4 | 0xB0 << 7;
        buffer.packet27[4] = Some(encode_packet(4, &[link, 0x0002, 0]));

        let mut decoded = level1_only(&buffer);
        assert_eq!(enhance(&store, &buffer, &mut decoded), STEP_BUDGET);
        assert_eq!(decoded.attrs[9][5].fg, 1);
        assert_eq!(decoded.attrs[9][4].fg, 7);

        let started = std::time::Instant::now();
        let decoded = decode(&store, &buffer);
        assert!(decoded.info.level25_applied);
        assert!(started.elapsed() < std::time::Duration::from_millis(200));
    }

    #[test]
    fn test_passive_queue_is_bounded() {
        // 150 invocations of one local passive object defined at triplet
        // 152 (designation 11, triplet 9).
        let words: Vec<u32> = std::iter::once(t(41, 0x04, 0))
            .chain(std::iter::repeat(t(41, 0x13, 0x39)).take(150))
            .chain([terminate(), t(40, 0x17, 0x39), t(0, 0x09, b'P'), terminate()])
            .collect();
        let buffer = enhanced_page(0x100, &words);
        let mut decoded = level1_only(&buffer);

        // The local data, then two triplets per queued object.
        assert_eq!(enhance(&PageStore::new(), &buffer, &mut decoded), 152 + MAX_PASSIVE * 2);
        assert_eq!(decoded.grid[1][0], Cell::Glyph('P'));
    }

    #[test]
    fn test_row_colour_replaces_remapped_black() {
        use crate::decode::level1::tests::enhancement_words;

        // Remap 1 moves Level 1 backgrounds to CLUT 1.
        let mut buffer = enhanced_page(0x100, &[t(42, 0x01, 6), terminate()]);
        buffer.packet28[0] = Some(encode_packet(0, &enhancement_words(1, false, 0)));
        let decoded = decode(&PageStore::new(), &buffer);
        assert_eq!(decoded.info.black_background, 8);
        assert_eq!(decoded.attrs[2][0].bg, 6);
        assert_eq!(decoded.attrs[3][0].bg, 8);

        // Black background substitution uses the default row colour.
        buffer.packet28[0] = Some(encode_packet(0, &enhancement_words(0, true, 17)));
        let decoded = decode(&PageStore::new(), &buffer);
        assert_eq!(decoded.info.black_background, 17);
        assert_eq!(decoded.attrs[2][39].bg, 6);
        assert_eq!(decoded.attrs[3][39].bg, 17);
    }

    #[test]
    fn test_level25_disabled() {
        let buffer = enhanced_page(0x100, &[t(45, 0x04, 0), t(10, 0x09, b'X'), terminate()]);
        let decoded = level1_only(&buffer);
        assert!(!decoded.info.level25_applied);
        assert_eq!(decoded.grid[5][10], Cell::SPACE);
    }
}
