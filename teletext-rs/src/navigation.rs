//! Page navigation: digit entry, paging, FastText/FLOF colour keys,
//! TOP-assisted skipping and page catching.
//!
//! Every operation takes the page store by reference; the caller holds the
//! page cache lock for the duration of one call.

use std::sync::Arc;

use log::{debug, trace};
use serde::Serialize;
use teletext_protocol::{
    is_decimal_page, magazine_of, next_decimal_page, previous_decimal_page, validate_page,
    FlofLinks, MAX_SUB_PAGE, ROW_WIDTH,
};

use crate::decode::{Cell, Charset, DecodedPage};
use crate::error::Result;
use crate::store::PageStore;
use crate::top::TopClass;

/// Receiver-side hook asked to acquire pages that are not cached yet.
///
/// Requests must not block: the navigation controller calls this while the
/// page cache lock is held.
pub trait PageSource: Send + Sync {
    fn request(&self, page: u16);
}

/// A source that ignores requests, for hosts that receive every page anyway.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassiveSource;

impl PageSource for PassiveSource {
    fn request(&self, _page: u16) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColourKey {
    Red,
    Green,
    Yellow,
    Blue,
}

impl ColourKey {
    pub const ALL: [ColourKey; 4] = [ColourKey::Red, ColourKey::Green, ColourKey::Yellow, ColourKey::Blue];

    fn index(self) -> usize {
        self as usize
    }
}

/// Input actions dispatched by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Digit(u8),
    Up,
    Down,
    Left,
    Right,
    ZoomToggle,
    SizeToggle,
    Select,
    Colour(ColourKey),
    Hint,
}

/// Which part of the page is enlarged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Zoom {
    #[default]
    Full,
    TopHalf,
    BottomHalf,
}

impl Zoom {
    fn next(self) -> Self {
        match self {
            Zoom::Full => Zoom::TopHalf,
            Zoom::TopHalf => Zoom::BottomHalf,
            Zoom::BottomHalf => Zoom::Full,
        }
    }
}

/// Highlighted page number while catching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatchCursor {
    pub row: u8,
    pub col: u8,
    pub page: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationState {
    pub page: u16,
    pub sub_page: u8,
    pub previous_page: u16,
    /// Digits typed so far (at most two; the third completes the entry).
    pub digits: Vec<u8>,
    pub catching: Option<CatchCursor>,
    pub zoom: Zoom,
    /// Double-size display toggle.
    pub enlarged: bool,
    /// Reveal concealed text.
    pub hint: bool,
    /// The current page was requested and has not arrived yet.
    pub pending: bool,
}

impl NavigationState {
    fn new(start_page: u16) -> Self {
        NavigationState {
            page: start_page,
            sub_page: 0,
            previous_page: start_page,
            digits: Vec::new(),
            catching: None,
            zoom: Zoom::Full,
            enlarged: false,
            hint: false,
            pending: false,
        }
    }

    /// Header label for the page number field: typed digits padded with
    /// dashes while entering, else the current page.
    pub fn page_label(&self) -> String {
        if self.digits.is_empty() {
            return format!("{:03X}", self.page);
        }
        let typed: String = self.digits.iter().map(|d| char::from(b'0' + d)).collect();
        format!("{:-<3}", typed)
    }
}

pub struct Navigator {
    state: NavigationState,
    source: Arc<dyn PageSource>,
}

impl Navigator {
    pub fn new(start_page: u16, source: Arc<dyn PageSource>) -> Self {
        Navigator {
            state: NavigationState::new(start_page),
            source,
        }
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    /// Dispatch an input action. `current` is the last decode of the
    /// current page, used for page catching.
    ///
    /// Returns whether the current page or sub-page changed.
    pub fn handle(&mut self, store: &mut PageStore, current: Option<&DecodedPage>, action: Action) -> bool {
        let before = (self.state.page, self.state.sub_page);
        trace!("Navigation action {:?} on {:03X}", action, before.0);

        match action {
            Action::Digit(digit) => self.enter_digit(store, digit),
            Action::Up | Action::Down if self.state.catching.is_some() => {
                if let Some(decoded) = current {
                    if action == Action::Up {
                        self.catch_previous(decoded);
                    } else {
                        self.catch_next(decoded);
                    }
                }
            }
            Action::Up => self.step_page(store, true),
            Action::Down => self.step_page(store, false),
            Action::Left => self.step_sub_page(store, false),
            Action::Right => self.step_sub_page(store, true),
            Action::ZoomToggle => self.state.zoom = self.state.zoom.next(),
            Action::SizeToggle => self.state.enlarged = !self.state.enlarged,
            Action::Select => {
                if self.state.catching.is_some() {
                    self.confirm_catch(store);
                } else if let Some(decoded) = current {
                    self.start_catching(decoded);
                }
            }
            Action::Colour(key) => self.colour_key(store, key),
            Action::Hint => self.state.hint = !self.state.hint,
        }

        before != (self.state.page, self.state.sub_page)
    }

    /// Validate and jump to a page, as if its three digits were typed.
    pub fn goto_page(&mut self, store: &mut PageStore, page: u16) -> Result<()> {
        validate_page(page)?;
        self.show(store, page);
        Ok(())
    }

    /// Select a cached sub-page of the current page.
    pub fn goto_sub_page(&mut self, store: &PageStore, sub_page: u8) -> bool {
        if sub_page > MAX_SUB_PAGE || store.page(self.state.page, sub_page).is_none() {
            return false;
        }
        self.state.sub_page = sub_page;
        true
    }

    /// Make `page` current. A page that is not cached becomes current with
    /// sub-page 0, is marked pending and is requested from the source.
    fn show(&mut self, store: &mut PageStore, page: u16) {
        self.state.digits.clear();
        self.state.catching = None;
        if page != self.state.page {
            self.state.previous_page = self.state.page;
        }
        self.state.page = page;

        match store.first_sub_page(page) {
            Some(sub_page) => {
                self.state.sub_page = sub_page;
                self.state.pending = false;
            }
            None => {
                debug!("Page {:03X} not cached, requesting", page);
                self.state.sub_page = 0;
                self.state.pending = true;
                self.source.request(page);
            }
        }
    }

    /// Resolve a pending page once it has been received. Returns whether
    /// the page became available.
    pub fn refresh(&mut self, store: &PageStore) -> bool {
        if !self.state.pending {
            return false;
        }
        match store.first_sub_page(self.state.page) {
            Some(sub_page) => {
                self.state.sub_page = sub_page;
                self.state.pending = false;
                true
            }
            None => false,
        }
    }

    /// Digit entry. A leading 0 returns to the previous page; the first
    /// digit must be a magazine 1..=8.
    pub fn enter_digit(&mut self, store: &mut PageStore, digit: u8) {
        if digit > 9 {
            return;
        }
        self.state.catching = None;

        match self.state.digits.len() {
            0 if digit == 0 => {
                let previous = self.state.previous_page;
                self.show(store, previous);
            }
            0 if digit > 8 => trace!("Ignoring magazine digit {}", digit),
            0 | 1 => self.state.digits.push(digit),
            _ => {
                let page = self
                    .state
                    .digits
                    .iter()
                    .chain(std::iter::once(&digit))
                    .fold(0u16, |page, &d| page << 4 | d as u16);
                self.show(store, page);
            }
        }
    }

    /// Next or previous cached decimal page, or `None` if no other page is
    /// cached.
    pub fn linear_target(&self, store: &PageStore, forward: bool) -> Option<u16> {
        let step = if forward { next_decimal_page } else { previous_decimal_page };
        let start = self.state.page;
        let mut page = step(start);
        for _ in 0..800 {
            if page == start {
                return None;
            }
            if store.is_cached(page) {
                return Some(page);
            }
            page = step(page);
        }
        None
    }

    pub fn step_page(&mut self, store: &mut PageStore, forward: bool) {
        if let Some(page) = self.linear_target(store, forward) {
            self.show(store, page);
        }
    }

    /// Next or previous cached sub-page of the current page, wrapping over
    /// 0..=0x79.
    pub fn step_sub_page(&mut self, store: &PageStore, forward: bool) {
        let subs: Vec<u8> = store.sub_pages(self.state.page).collect();
        let current = self.state.sub_page;
        let target = if forward {
            subs.iter().find(|&&s| s > current).or_else(|| subs.first())
        } else {
            subs.iter().rev().find(|&&s| s < current).or_else(|| subs.last())
        };
        if let Some(&sub_page) = target {
            if sub_page != current {
                self.state.sub_page = sub_page;
            }
        }
    }

    /// TOP-assisted target: the next block page, else the next group page,
    /// else the linear step.
    pub fn top_target(&self, store: &mut PageStore, forward: bool) -> Option<u16> {
        let page = self.state.page;
        let top = store.top_table().and_then(|top| {
            top.find(page, forward, TopClass::Block)
                .or_else(|| top.find(page, forward, TopClass::Group))
        });
        top.or_else(|| self.linear_target(store, forward))
    }

    pub fn top_step(&mut self, store: &mut PageStore, forward: bool) {
        if let Some(page) = self.top_target(store, forward) {
            self.show(store, page);
        }
    }

    /// FLOF links of the current page, when transmitted.
    fn flof_links(&self, store: &PageStore) -> Option<FlofLinks> {
        let buffer = store.page(self.state.page, self.state.sub_page)?;
        let packet = buffer.packet27[0].as_ref()?;
        Some(FlofLinks::parse(packet, magazine_of(self.state.page)))
    }

    /// Targets of the four colour keys: the FLOF links when the page has
    /// them, else previous block, previous group, next group and next block.
    pub fn colour_targets(&self, store: &mut PageStore) -> [Option<u16>; 4] {
        if let Some(links) = self.flof_links(store) {
            return [0, 1, 2, 3].map(|i| links.colour(i));
        }

        let page = self.state.page;
        match store.top_table() {
            Some(top) => [
                top.find(page, false, TopClass::Block),
                top.find(page, false, TopClass::Group),
                top.find(page, true, TopClass::Group),
                top.find(page, true, TopClass::Block),
            ],
            None => [None; 4],
        }
    }

    pub fn colour_key(&mut self, store: &mut PageStore, key: ColourKey) {
        match self.colour_targets(store)[key.index()] {
            Some(page) => self.show(store, page),
            None => trace!("No {:?} link on {:03X}", key, self.state.page),
        }
    }

    /// AIT labels for the colour key targets.
    pub fn fasttext_labels(&self, store: &mut PageStore) -> [Option<String>; 4] {
        let targets = self.colour_targets(store);
        match store.additional_info() {
            Some(ait) => targets.map(|t| t.and_then(|page| ait.label(page)).map(str::to_string)),
            None => Default::default(),
        }
    }

    /// Page-number candidates of a decoded page in reading order.
    pub fn catch_candidates(decoded: &DecodedPage) -> Vec<CatchCursor> {
        let digit = |row: usize, col: usize| -> Option<u8> {
            let attrs = &decoded.attrs[row][col];
            match (decoded.grid[row][col], attrs.charset) {
                (Cell::Glyph(c @ '0'..='9'), Charset::G0(_)) if !attrs.conceal => Some(c as u8 - b'0'),
                _ => None,
            }
        };

        let mut candidates = Vec::new();
        for row in 1..=23 {
            for col in 0..=ROW_WIDTH - 3 {
                let (Some(d0), Some(d1), Some(d2)) = (digit(row, col), digit(row, col + 1), digit(row, col + 2)) else {
                    continue;
                };
                let before = col > 0 && digit(row, col - 1).is_some();
                let after = col + 3 < ROW_WIDTH && digit(row, col + 3).is_some();
                let page = (d0 as u16) << 8 | (d1 as u16) << 4 | d2 as u16;
                if !before && !after && is_decimal_page(page) {
                    candidates.push(CatchCursor {
                        row: row as u8,
                        col: col as u8,
                        page,
                    });
                }
            }
        }
        candidates
    }

    /// Enter catching mode on the first candidate, if any.
    pub fn start_catching(&mut self, decoded: &DecodedPage) {
        self.state.digits.clear();
        self.state.catching = Self::catch_candidates(decoded).into_iter().next();
    }

    pub fn catch_next(&mut self, decoded: &DecodedPage) {
        self.move_catch(decoded, true);
    }

    pub fn catch_previous(&mut self, decoded: &DecodedPage) {
        self.move_catch(decoded, false);
    }

    fn move_catch(&mut self, decoded: &DecodedPage, forward: bool) {
        let Some(cursor) = self.state.catching else {
            return;
        };
        let candidates = Self::catch_candidates(decoded);
        let position = (cursor.row, cursor.col);
        let target = if forward {
            candidates
                .iter()
                .find(|c| (c.row, c.col) > position)
                .or_else(|| candidates.first())
        } else {
            candidates
                .iter()
                .rev()
                .find(|c| (c.row, c.col) < position)
                .or_else(|| candidates.last())
        };
        self.state.catching = target.copied();
    }

    /// Navigate to the highlighted page and leave catching mode.
    pub fn confirm_catch(&mut self, store: &mut PageStore) {
        if let Some(cursor) = self.state.catching.take() {
            self.show(store, cursor.page);
        }
    }
}
