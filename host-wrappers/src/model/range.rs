use std::rc::Rc;

use crate::cache::LazyChildCache;
use crate::enumeration::EnumerationSession;
use crate::errors::WrapperResult;
use crate::model::{Borders, Font};
use crate::owned_wrapper;
use crate::registry::DisposableRegistry;
use crate::value::HostValue;
use crate::wrapper::{HostObject, WrapperCore};

/// A contiguous span of content. Also a collection of its cells.
pub struct Range {
    core: WrapperCore,
    font: LazyChildCache<Font>,
    borders: LazyChildCache<Borders>,
    cells: DisposableRegistry<Range>,
}

owned_wrapper!(Range, slots: [font, borders, cells]);

impl HostObject for Range {
    const KIND: &'static str = "Range";

    fn from_core(core: WrapperCore) -> Self {
        Self {
            core,
            font: LazyChildCache::new(),
            borders: LazyChildCache::new(),
            cells: DisposableRegistry::new(),
        }
    }
}

impl Range {
    /// Default: empty string.
    pub fn text(&self) -> String {
        self.core.get("Text", String::new())
    }

    pub fn set_text(&self, text: &str) -> WrapperResult<()> {
        self.core.set("Text", text)
    }

    /// Default: `0`.
    pub fn start(&self) -> i64 {
        self.core.get("Start", 0)
    }

    /// Default: `0`.
    pub fn end(&self) -> i64 {
        self.core.get("End", 0)
    }

    /// Default: `None`.
    pub fn font(&self) -> Option<Rc<Font>> {
        self.font.get(|| self.core.child("Font"))
    }

    /// Default: `None`.
    pub fn borders(&self) -> Option<Rc<Borders>> {
        self.borders.get(|| self.core.child("Borders"))
    }

    /// Default: `0`.
    pub fn count(&self) -> usize {
        self.core.count()
    }

    /// Cell at `index` (1-based). Collection-owned.
    pub fn cell(&self, index: usize) -> WrapperResult<Rc<Self>> {
        let cell = Rc::new(self.core.element::<Self>(index)?);
        self.cells.add(Rc::clone(&cell));
        Ok(cell)
    }

    /// Walks every cell. Collection-owned.
    pub fn cells(&self) -> EnumerationSession<'_, Self> {
        EnumerationSession::collection_owned(&self.core, &self.cells)
    }

    /// Walks every cell, handing each one to the caller.
    pub fn detached_cells(&self) -> EnumerationSession<'_, Self> {
        EnumerationSession::caller_owned(&self.core)
    }

    /// An independent copy of this range. Caller-owned.
    pub fn duplicate(&self) -> WrapperResult<Self> {
        self.core.create("Duplicate", &[], "Duplicate")
    }

    /// Deletes the content from the host. The wrapper stays live.
    pub fn delete(&self) -> WrapperResult<()> {
        self.core.call("Delete", &[]).map(drop)
    }

    /// Inserts `text` after the range.
    pub fn insert_after(&self, text: &str) -> WrapperResult<()> {
        self.core
            .call("InsertAfter", &[HostValue::from(text)])
            .map(drop)
    }
}
