use std::rc::Rc;

use crate::cache::LazyChildCache;
use crate::errors::WrapperResult;
use crate::handle::{HandleId, HostModel};
use crate::model::Documents;
use crate::owned_wrapper;
use crate::wrapper::{OwnedWrapper, WrapperCore};

/// Root of a wrapper tree: the host application object.
pub struct Application {
    core: WrapperCore,
    documents: LazyChildCache<Documents>,
}

owned_wrapper!(Application, slots: [documents]);

impl Application {
    pub const KIND: &'static str = "Application";

    /// Takes ownership of the host's root object.
    pub fn attach(host: Rc<dyn HostModel>, root: HandleId) -> Self {
        Self {
            core: WrapperCore::root(host, root, Self::KIND),
            documents: LazyChildCache::new(),
        }
    }

    /// Default: empty string.
    pub fn name(&self) -> String {
        self.core.get("Name", String::new())
    }

    /// Default: empty string.
    pub fn version(&self) -> String {
        self.core.get("Version", String::new())
    }

    /// Default: `false`.
    pub fn visible(&self) -> bool {
        self.core.get("Visible", false)
    }

    pub fn set_visible(&self, visible: bool) -> WrapperResult<()> {
        self.core.set("Visible", visible)
    }

    /// Default: `None`.
    pub fn documents(&self) -> Option<Rc<Documents>> {
        self.documents.get(|| self.core.child("Documents"))
    }

    /// Asks the host to exit, then disposes the whole tree.
    ///
    /// The tree is disposed even when the host rejects the call.
    pub fn quit(&self) -> WrapperResult<()> {
        let outcome = self.core.call("Quit", &[]).map(drop);
        self.dispose();
        outcome
    }
}
