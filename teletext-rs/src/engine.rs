//! The engine facade hosts drive from their update loop.

use std::sync::Arc;

use log::{debug, trace};
use teletext_protocol::RawPageBuffer;

use crate::decode::{decode_buffer, Cell, DecodedPage};
use crate::error::Result;
use crate::navigation::{Action, NavigationState, Navigator, PageSource};
use crate::settings::{DecoderSettings, NavigationSettings};
use crate::store::PageCache;
use crate::top::TopClass;

/// Header columns holding the page number.
const PAGE_LABEL_COLUMN: usize = 3;

/// Decoder plus navigation controller over a shared page cache.
///
/// Each call takes the cache lock once and does no I/O while holding it.
pub struct Teletext {
    cache: PageCache,
    navigator: Navigator,
    settings: DecoderSettings,
    /// Last successful decode, shown while a requested page is pending.
    last: Option<DecodedPage>,
    /// Buffer the last decode was made from.
    last_buffer: Option<Arc<RawPageBuffer>>,
}

impl Teletext {
    pub fn new(
        cache: PageCache,
        source: Arc<dyn PageSource>,
        settings: DecoderSettings,
        navigation: NavigationSettings,
    ) -> Result<Self> {
        navigation.validate()?;
        let mut navigator = Navigator::new(navigation.start_page, source);
        navigator.goto_page(&mut cache.write(), navigation.start_page)?;

        Ok(Teletext {
            cache,
            navigator,
            settings,
            last: None,
            last_buffer: None,
        })
    }

    pub fn state(&self) -> &NavigationState {
        self.navigator.state()
    }

    pub fn settings(&self) -> &DecoderSettings {
        &self.settings
    }

    /// Dispatch one input action; returns whether the page changed.
    pub fn handle(&mut self, action: Action) -> bool {
        let mut store = self.cache.write();
        self.navigator.handle(&mut store, self.last.as_ref(), action)
    }

    pub fn goto_page(&mut self, page: u16) -> Result<()> {
        let mut store = self.cache.write();
        self.navigator.goto_page(&mut store, page)
    }

    /// Select a cached sub-page of the current page.
    pub fn goto_sub_page(&mut self, sub_page: u8) -> bool {
        let store = self.cache.read();
        self.navigator.goto_sub_page(&store, sub_page)
    }

    /// TOP-assisted page step.
    pub fn top_step(&mut self, forward: bool) {
        let mut store = self.cache.write();
        self.navigator.top_step(&mut store, forward);
    }

    pub fn fasttext_labels(&self) -> [Option<String>; 4] {
        let mut store = self.cache.write();
        self.navigator.fasttext_labels(&mut store)
    }

    /// Decode the current page. While the page is missing the last decode
    /// is returned with the requested page number in its header; `None`
    /// means nothing has been shown yet.
    pub fn render(&mut self) -> Option<DecodedPage> {
        let mut store = self.cache.write();
        if self.navigator.refresh(&store) {
            debug!("Requested page {:03X} arrived", self.navigator.state().page);
        }

        let state = self.navigator.state();
        let (page, sub_page) = (state.page, state.sub_page);
        let settings = DecoderSettings {
            hint: self.settings.hint || state.hint,
            ..self.settings
        };

        if let Some(buffer) = store.page(page, sub_page).cloned() {
            let top_class = store
                .top_table()
                .map_or(TopClass::NotFound, |top| top.class_of(page));
            trace!("Decoding {:03X}/{:02X}", page, sub_page);
            self.last = Some(decode_buffer(&store, &buffer, &settings, top_class));
            self.last_buffer = Some(buffer);
        }
        drop(store);

        let mut decoded = self.last.clone()?;
        let state = self.navigator.state();
        if !state.digits.is_empty() || state.pending {
            overlay_label(&mut decoded, &state.page_label());
        }
        Some(decoded)
    }

    /// Whether the cached buffer for the current page differs from the one
    /// last rendered. Hosts poll this to pick up retransmissions and pages
    /// that arrive after a request.
    pub fn is_current_changed(&self) -> bool {
        let store = self.cache.read();
        let state = self.navigator.state();
        let sub_page = if state.pending {
            store.first_sub_page(state.page)
        } else {
            Some(state.sub_page)
        };

        match (sub_page.and_then(|s| store.page(state.page, s)), &self.last_buffer) {
            (Some(current), Some(last)) => !Arc::ptr_eq(current, last),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

fn overlay_label(decoded: &mut DecodedPage, label: &str) {
    let header = &mut decoded.grid[0][PAGE_LABEL_COLUMN..];
    for (cell, c) in header.iter_mut().zip(label.chars()) {
        *cell = Cell::Glyph(c);
    }
}
