use std::rc::Rc;

use chrono::NaiveDateTime;

use crate::cache::LazyChildCache;
use crate::enumeration::EnumerationSession;
use crate::errors::{WrapperError, WrapperResult};
use crate::model::Range;
use crate::owned_wrapper;
use crate::registry::DisposableRegistry;
use crate::value::HostValue;
use crate::wrapper::{HostObject, OwnedWrapper, WrapperCore};

/// The open-documents collection.
///
/// Documents reached through [`Documents::item`] or [`Documents::iter`] are
/// collection-owned and disposed with the collection. [`Documents::add`]
/// hands the new document to the caller.
pub struct Documents {
    core: WrapperCore,
    opened: DisposableRegistry<Document>,
}

owned_wrapper!(Documents, slots: [opened]);

impl HostObject for Documents {
    const KIND: &'static str = "Documents";

    fn from_core(core: WrapperCore) -> Self {
        Self {
            core,
            opened: DisposableRegistry::new(),
        }
    }
}

impl Documents {
    /// Default: `0`.
    pub fn count(&self) -> usize {
        self.core.count()
    }

    /// Document at `index` (1-based). Collection-owned.
    pub fn item(&self, index: usize) -> WrapperResult<Rc<Document>> {
        let document = Rc::new(self.core.element::<Document>(index)?);
        self.opened.add(Rc::clone(&document));
        Ok(document)
    }

    /// Walks every open document. Collection-owned.
    pub fn iter(&self) -> EnumerationSession<'_, Document> {
        EnumerationSession::collection_owned(&self.core, &self.opened)
    }

    /// Creates a document, optionally from a template path. Caller-owned.
    pub fn add(&self, template: Option<&str>) -> WrapperResult<Document> {
        let args = match template {
            Some("") => {
                return Err(WrapperError::Argument(
                    "template path must not be empty".into(),
                ));
            }
            Some(path) => vec![HostValue::from(path)],
            None => Vec::new(),
        };
        self.core.create("Add", &args, "Add()")
    }

    /// Number of collection-owned documents handed out so far.
    pub fn tracked(&self) -> usize {
        self.opened.len()
    }
}

/// One open document.
pub struct Document {
    core: WrapperCore,
    content: LazyChildCache<Range>,
}

owned_wrapper!(Document, slots: [content]);

impl HostObject for Document {
    const KIND: &'static str = "Document";

    fn from_core(core: WrapperCore) -> Self {
        Self {
            core,
            content: LazyChildCache::new(),
        }
    }
}

impl Document {
    /// Default: empty string.
    pub fn name(&self) -> String {
        self.core.get("Name", String::new())
    }

    /// Default: empty string.
    pub fn full_name(&self) -> String {
        self.core.get("FullName", String::new())
    }

    /// Default: `false`, so a failed read never hides unsaved work.
    pub fn saved(&self) -> bool {
        self.core.get("Saved", false)
    }

    /// Default: `None`.
    pub fn last_saved(&self) -> Option<NaiveDateTime> {
        self.core.get("LastSaved", None)
    }

    /// The whole-document range. Default: `None`.
    pub fn content(&self) -> Option<Rc<Range>> {
        self.content.get(|| self.core.child("Content"))
    }

    /// A sub-range by character offsets. Caller-owned.
    pub fn range(&self, start: i64, end: i64) -> WrapperResult<Range> {
        if start < 0 || end < start {
            return Err(WrapperError::Argument(format!(
                "invalid range {start}..{end}"
            )));
        }
        self.core.create(
            "Range",
            &[HostValue::Int(start), HostValue::Int(end)],
            &format!("Range({start},{end})"),
        )
    }

    pub fn save(&self) -> WrapperResult<()> {
        self.core.call("Save", &[]).map(drop)
    }

    /// Closes the host document and disposes this wrapper.
    ///
    /// On a host fault the wrapper stays live so the caller can retry.
    pub fn close(&self, save_changes: bool) -> WrapperResult<()> {
        self.core.call("Close", &[HostValue::Bool(save_changes)])?;
        self.dispose();
        Ok(())
    }
}
