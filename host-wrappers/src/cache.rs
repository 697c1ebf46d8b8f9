use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::errors::WrapperResult;
use crate::wrapper::{ChildSlot, OwnedWrapper};

/// Memoization slot for one object-valued property.
///
/// The first successful construction is cached and handed out by identity
/// until the owner disposes the slot. A failed construction caches nothing,
/// so the next access retries. After [`LazyChildCache::dispose_if_present`]
/// the slot is sealed and never constructs again.
pub struct LazyChildCache<T> {
    value: RefCell<Option<Rc<T>>>,
    sealed: Cell<bool>,
}

impl<T> LazyChildCache<T> {
    pub const fn new() -> Self {
        Self {
            value: RefCell::new(None),
            sealed: Cell::new(false),
        }
    }

    pub fn is_constructed(&self) -> bool {
        self.value.borrow().is_some()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.get()
    }

    /// The cached child, without constructing it.
    pub fn peek(&self) -> Option<Rc<T>> {
        self.value.borrow().clone()
    }
}

impl<T: OwnedWrapper> LazyChildCache<T> {
    /// Returns the cached child, running `factory` on first access.
    ///
    /// `None` is the documented default: the factory failed (host fault or
    /// disposed owner) or the slot is sealed.
    pub fn get(&self, factory: impl FnOnce() -> WrapperResult<T>) -> Option<Rc<T>> {
        if let Some(child) = self.peek() {
            return Some(child);
        }
        if self.sealed.get() {
            return None;
        }

        match factory() {
            Ok(child) => {
                let child = Rc::new(child);
                tracing::debug!(path = %child.core().path(), "cached child constructed");
                *self.value.borrow_mut() = Some(Rc::clone(&child));
                Some(child)
            }
            Err(err) => {
                tracing::warn!(error = %err, "cached child construction failed, will retry");
                None
            }
        }
    }

    /// Disposes the cached child, if any, and seals the slot.
    pub fn dispose_if_present(&self) {
        self.sealed.set(true);
        let taken = self.value.borrow_mut().take();
        if let Some(child) = taken {
            child.dispose();
        }
    }
}

impl<T: OwnedWrapper> ChildSlot for LazyChildCache<T> {
    fn dispose_children(&self) {
        self.dispose_if_present();
    }
}

impl<T> Default for LazyChildCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LazyChildCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyChildCache")
            .field("constructed", &self.is_constructed())
            .field("sealed", &self.sealed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{HostFault, WrapperError};
    use crate::handle::{HandleId, MockHostModel};
    use crate::wrapper::WrapperCore;

    struct Probe {
        core: WrapperCore,
    }

    crate::owned_wrapper!(Probe);

    fn probe(id: u64) -> Probe {
        let mut mock = MockHostModel::new();
        mock.expect_release().times(1).returning(|_| Ok(()));
        Probe {
            core: WrapperCore::root(Rc::new(mock), HandleId(id), "Probe"),
        }
    }

    fn fault() -> WrapperResult<Probe> {
        Err(WrapperError::OperationFailed {
            operation: "create Borders".into(),
            target: "Range".into(),
            source: HostFault::new(-1, "busy"),
        })
    }

    #[test]
    fn failed_factory_leaves_slot_unconstructed() {
        let cache = LazyChildCache::new();
        assert!(cache.get(fault).is_none());
        assert!(!cache.is_constructed());

        let child = cache.get(|| Ok(probe(2))).expect("retry should construct");
        assert!(cache.is_constructed());
        assert_eq!(child.core().handle().id(), HandleId(2));
        cache.dispose_if_present();
    }

    #[test]
    fn second_get_returns_same_instance_without_factory() {
        let cache = LazyChildCache::new();
        let first = cache.get(|| Ok(probe(2))).unwrap();
        let second = cache
            .get(|| panic!("factory must not run twice"))
            .unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        cache.dispose_if_present();
    }

    #[test]
    fn dispose_seals_and_disposes_child() {
        let cache = LazyChildCache::new();
        let child = cache.get(|| Ok(probe(2))).unwrap();
        cache.dispose_if_present();
        assert!(child.is_disposed());
        assert!(cache.is_sealed());
        assert!(!cache.is_constructed());
        assert!(cache.get(|| Ok(probe(3))).is_none());
        cache.dispose_if_present();
    }
}
