//! Sparse cache of received teletext pages.
//!
//! The receiver inserts fully assembled [`RawPageBuffer`]s; the decoders and
//! the navigation controller only read them. Both sides share the store
//! through a [`PageCache`] and take the lock once per operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::RwLock;
use teletext_protocol::{magazine_of, PageEnhancement, RawPageBuffer, BTT_PAGE};

use crate::error::{EngineError, Result};
use crate::top::{AdditionalInfoTable, BasicTopTable};

/// Page store shared between the receiver and the engine.
pub type PageCache = Arc<RwLock<PageStore>>;

/// Cache keyed by page number, then sub-page.
///
/// Buffers are held behind `Arc` so the engine can compare identities to
/// detect retransmissions without copying page data.
#[derive(Debug, Default)]
pub struct PageStore {
    pages: BTreeMap<u16, BTreeMap<u8, Arc<RawPageBuffer>>>,
    /// Packet M/29 enhancement data, indexed by magazine - 1.
    magazine_enhancements: [Option<PageEnhancement>; 8],
    top: Option<BasicTopTable>,
    additional_info: Option<AdditionalInfoTable>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store wrapped for sharing.
    pub fn shared() -> PageCache {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Insert or replace a page. A retransmission replaces the previous
    /// buffer for the same (page, sub-page) wholesale.
    pub fn insert(&mut self, buffer: RawPageBuffer) {
        trace!("Caching page {:03X}/{:02X}", buffer.page, buffer.sub_page);
        self.pages
            .entry(buffer.page)
            .or_default()
            .insert(buffer.sub_page, Arc::new(buffer));
    }

    /// Cached buffer for exactly (page, sub-page).
    pub fn page(&self, page: u16, sub_page: u8) -> Option<&Arc<RawPageBuffer>> {
        self.pages.get(&page)?.get(&sub_page)
    }

    /// Like [`PageStore::page`], but a miss is an error.
    pub fn try_page(&self, page: u16, sub_page: u8) -> Result<&Arc<RawPageBuffer>> {
        self.page(page, sub_page)
            .ok_or(EngineError::NotCached { page, sub_page })
    }

    /// Best cached buffer for (page, sub-page): the exact sub-page, else the
    /// first cached sub-page of the page, else an all-space buffer.
    pub fn load_page(&self, page: u16, sub_page: u8) -> Arc<RawPageBuffer> {
        if let Some(buffer) = self.page(page, sub_page) {
            return Arc::clone(buffer);
        }
        match self.pages.get(&page).and_then(|subs| subs.values().next()) {
            Some(buffer) => Arc::clone(buffer),
            None => {
                debug!("Page {:03X}/{:02X} not cached, using blank page", page, sub_page);
                Arc::new(RawPageBuffer::blank(page, sub_page))
            }
        }
    }

    /// Cached sub-pages of `page` in ascending order.
    pub fn sub_pages(&self, page: u16) -> impl Iterator<Item = u8> + '_ {
        self.pages
            .get(&page)
            .into_iter()
            .flat_map(|subs| subs.keys().copied())
    }

    pub fn first_sub_page(&self, page: u16) -> Option<u8> {
        self.sub_pages(page).next()
    }

    /// Whether any sub-page of `page` is cached.
    pub fn is_cached(&self, page: u16) -> bool {
        self.pages.get(&page).map_or(false, |subs| !subs.is_empty())
    }

    /// Number of cached (page, sub-page) buffers.
    pub fn len(&self) -> usize {
        self.pages.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Store packet M/29 data for a magazine (1..=8).
    pub fn set_magazine_enhancement(&mut self, magazine: u8, enhancement: PageEnhancement) {
        if let Some(slot) = self.magazine_enhancements.get_mut((magazine as usize).wrapping_sub(1)) {
            *slot = Some(enhancement);
        }
    }

    /// Packet M/29 data applying to `page`'s magazine.
    pub fn magazine_enhancement(&self, page: u16) -> Option<&PageEnhancement> {
        self.magazine_enhancements[magazine_of(page) as usize - 1].as_ref()
    }

    /// Drop every cached page and the memoised TOP tables.
    pub fn reset(&mut self) {
        debug!("Resetting page cache ({} buffers)", self.len());
        self.pages.clear();
        self.magazine_enhancements = Default::default();
        self.top = None;
        self.additional_info = None;
    }

    /// The Basic TOP Table, decoded once page 1F0 has been received.
    pub fn top_table(&mut self) -> Option<&BasicTopTable> {
        if self.top.is_none() {
            let parsed = self
                .first_sub_page(BTT_PAGE)
                .and_then(|sub| self.page(BTT_PAGE, sub))
                .map(|buffer| BasicTopTable::parse(buffer));
            if parsed.is_some() {
                debug!("Decoded basic TOP table");
            }
            self.top = parsed;
        }
        self.top.as_ref()
    }

    /// Page labels from the Additional Information Tables, decoded once the
    /// BTT and every AIT page it lists have been received.
    pub fn additional_info(&mut self) -> Option<&AdditionalInfoTable> {
        if self.additional_info.is_none() {
            let ait_pages: Vec<u16> = self.top_table()?.ait_pages().collect();
            if ait_pages.is_empty() || !ait_pages.iter().all(|&p| self.is_cached(p)) {
                return None;
            }
            let mut table = AdditionalInfoTable::default();
            for page in ait_pages {
                if let Some(buffer) = self.first_sub_page(page).and_then(|sub| self.page(page, sub)) {
                    table.merge(buffer);
                }
            }
            debug!("Decoded additional information table ({} labels)", table.len());
            self.additional_info = Some(table);
        }
        self.additional_info.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with_text(page: u16, sub_page: u8, text: &str) -> RawPageBuffer {
        let mut buffer = RawPageBuffer::blank(page, sub_page);
        buffer.set_text_row(1, text.as_bytes());
        buffer
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut store = PageStore::new();
        assert!(store.is_empty());
        store.insert(page_with_text(0x100, 0, "A"));
        store.insert(page_with_text(0x100, 2, "B"));
        store.insert(page_with_text(0x101, 1, "C"));

        assert_eq!(store.len(), 3);
        assert!(store.is_cached(0x100));
        assert!(!store.is_cached(0x102));
        assert_eq!(store.sub_pages(0x100).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(store.first_sub_page(0x101), Some(1));
        assert_eq!(store.first_sub_page(0x102), None);
    }

    #[test]
    fn test_retransmission_replaces_buffer() {
        let mut store = PageStore::new();
        store.insert(page_with_text(0x100, 0, "OLD"));
        let before = Arc::clone(store.page(0x100, 0).unwrap());
        store.insert(page_with_text(0x100, 0, "NEW"));
        let after = store.page(0x100, 0).unwrap();

        assert!(!Arc::ptr_eq(&before, after));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_load_page_fallbacks() {
        let mut store = PageStore::new();
        store.insert(page_with_text(0x150, 3, "X"));

        assert_eq!(store.load_page(0x150, 3).sub_page, 3);
        // Missing sub-page falls back to the first cached one.
        assert_eq!(store.load_page(0x150, 7).sub_page, 3);
        // Missing page is blank.
        let blank = store.load_page(0x151, 0);
        assert_eq!(*blank, RawPageBuffer::blank(0x151, 0));
    }

    #[test]
    fn test_try_page_miss() {
        let store = PageStore::new();
        assert_eq!(
            store.try_page(0x100, 0).unwrap_err(),
            EngineError::NotCached { page: 0x100, sub_page: 0 }
        );
    }

    #[test]
    fn test_magazine_enhancement() {
        let mut store = PageStore::new();
        let enhancement = PageEnhancement {
            default_row_colour: 4,
            ..Default::default()
        };
        store.set_magazine_enhancement(8, enhancement.clone());
        store.set_magazine_enhancement(0, PageEnhancement::default());
        store.set_magazine_enhancement(9, PageEnhancement::default());

        assert_eq!(store.magazine_enhancement(0x8A0), Some(&enhancement));
        assert_eq!(store.magazine_enhancement(0x100), None);
    }

    #[test]
    fn test_reset_drops_everything() {
        let mut store = PageStore::new();
        store.insert(page_with_text(0x100, 0, "A"));
        store.insert(RawPageBuffer::blank(BTT_PAGE, 0));
        assert!(store.top_table().is_some());

        store.reset();
        assert!(store.is_empty());
        assert!(store.top_table().is_none());
    }
}
