use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::wrapper::{ChildSlot, OwnedWrapper};

/// Append-only list of transient children handed out by a collection
/// wrapper's indexers and enumerators.
///
/// Members are disposed in insertion order when the registry is flushed,
/// which the owning collection does as part of its own explicit disposal.
/// Flushing an empty registry is a no-op, so flushing twice is harmless.
pub struct DisposableRegistry<T> {
    members: RefCell<Vec<Rc<T>>>,
}

impl<T> DisposableRegistry<T> {
    pub const fn new() -> Self {
        Self {
            members: RefCell::new(Vec::new()),
        }
    }

    /// Takes shared ownership of `child`. No dedup.
    pub fn add(&self, child: Rc<T>) {
        self.members.borrow_mut().push(child);
    }

    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    /// Snapshot of the tracked children, in insertion order.
    pub fn members(&self) -> Vec<Rc<T>> {
        self.members.borrow().clone()
    }
}

impl<T: OwnedWrapper> DisposableRegistry<T> {
    /// Disposes every tracked child in insertion order, then empties the list.
    ///
    /// Returns the number of children flushed.
    pub fn flush(&self) -> usize {
        let drained = std::mem::take(&mut *self.members.borrow_mut());
        for child in &drained {
            child.dispose();
        }
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "registry flushed");
        }
        drained.len()
    }
}

impl<T: OwnedWrapper> ChildSlot for DisposableRegistry<T> {
    fn dispose_children(&self) {
        self.flush();
    }
}

impl<T> Default for DisposableRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for DisposableRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposableRegistry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{HandleId, MockHostModel};
    use crate::wrapper::WrapperCore;
    use std::sync::{Arc, Mutex};

    struct Item {
        core: WrapperCore,
    }

    crate::owned_wrapper!(Item);

    fn tracked(id: u64, log: &Arc<Mutex<Vec<HandleId>>>) -> Rc<Item> {
        let mut mock = MockHostModel::new();
        let log = Arc::clone(log);
        mock.expect_release().times(1).returning(move |handle| {
            log.lock().unwrap().push(handle);
            Ok(())
        });
        Rc::new(Item {
            core: WrapperCore::root(Rc::new(mock), HandleId(id), "Item"),
        })
    }

    #[test]
    fn flush_disposes_in_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = DisposableRegistry::new();
        for id in [3, 1, 2] {
            registry.add(tracked(id, &log));
        }
        assert_eq!(registry.len(), 3);
        let ids: Vec<_> = registry
            .members()
            .iter()
            .map(|item| item.core().handle().id())
            .collect();
        assert_eq!(ids, vec![HandleId(3), HandleId(1), HandleId(2)]);

        assert_eq!(registry.flush(), 3);
        assert!(registry.members().is_empty());
        assert!(registry.is_empty());
        assert_eq!(
            *log.lock().unwrap(),
            vec![HandleId(3), HandleId(1), HandleId(2)]
        );
    }

    #[test]
    fn second_flush_is_noop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = DisposableRegistry::new();
        registry.add(tracked(1, &log));
        assert_eq!(registry.flush(), 1);
        assert_eq!(registry.flush(), 0);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn member_disposed_by_caller_is_released_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = DisposableRegistry::new();
        let item = tracked(9, &log);
        registry.add(Rc::clone(&item));
        item.dispose();
        registry.flush();
        assert_eq!(*log.lock().unwrap(), vec![HandleId(9)]);
    }
}
