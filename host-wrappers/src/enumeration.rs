//! Enumeration of host collections into fresh child wrappers.

use std::fmt;
use std::rc::Rc;

use crate::errors::WrapperResult;
use crate::registry::DisposableRegistry;
use crate::wrapper::{HostObject, WrapperCore};

/// Who owns the wrappers an enumeration produces. Fixed per call site.
pub enum Ownership<'a, T> {
    /// Each element is also added to the collection's registry and disposed
    /// with the collection. The caller may use it but is not its sole owner.
    Collection(&'a DisposableRegistry<T>),
    /// Each element belongs to the caller alone, who must dispose or drop it.
    Caller,
}

impl<T> fmt::Debug for Ownership<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection(_) => f.write_str("Collection"),
            Self::Caller => f.write_str("Caller"),
        }
    }
}

/// One produced element and its 1-based host position.
#[derive(Debug, Clone)]
pub struct Indexed<T> {
    pub index: usize,
    pub item: T,
}

/// Lazily walks `1..=Count` of a host collection.
///
/// Nothing is read from the host until the first call to `next`, which
/// reads the element count once. Every pass builds new wrappers, even over
/// elements seen before. A parent disposed by then yields an empty
/// sequence; a host fault yields one `Err` and ends the sequence.
pub struct EnumerationSession<'a, T> {
    parent: &'a WrapperCore,
    ownership: Ownership<'a, T>,
    count: Option<usize>,
    next: usize,
    done: bool,
}

impl<'a, T: HostObject> EnumerationSession<'a, T> {
    pub const fn new(parent: &'a WrapperCore, ownership: Ownership<'a, T>) -> Self {
        Self {
            parent,
            ownership,
            count: None,
            next: 1,
            done: false,
        }
    }

    /// Elements are registered with `registry` as they are produced.
    pub const fn collection_owned(
        parent: &'a WrapperCore,
        registry: &'a DisposableRegistry<T>,
    ) -> Self {
        Self::new(parent, Ownership::Collection(registry))
    }

    /// Elements are handed to the caller and tracked nowhere else.
    pub const fn caller_owned(parent: &'a WrapperCore) -> Self {
        Self::new(parent, Ownership::Caller)
    }

    /// Element count read from the host, or `None` before the first `next`.
    pub const fn host_count(&self) -> Option<usize> {
        self.count
    }

    fn start(&mut self) -> WrapperResult<usize> {
        if self.parent.is_disposed() {
            tracing::debug!(path = %self.parent.path(), "enumerating disposed collection");
            self.count = Some(0);
            return Ok(0);
        }
        let count = self.parent.try_count()?;
        tracing::trace!(path = %self.parent.path(), count, ownership = ?self.ownership, "enumeration started");
        self.count = Some(count);
        Ok(count)
    }
}

impl<T: HostObject> Iterator for EnumerationSession<'_, T> {
    type Item = WrapperResult<Indexed<Rc<T>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let count = match self.count {
            Some(count) => count,
            None => match self.start() {
                Ok(count) => count,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            },
        };
        if self.next > count {
            self.done = true;
            return None;
        }

        let index = self.next;
        self.next += 1;

        match self.parent.element::<T>(index) {
            Ok(element) => {
                let item = Rc::new(element);
                if let Ownership::Collection(registry) = &self.ownership {
                    registry.add(Rc::clone(&item));
                }
                tracing::trace!(path = %self.parent.path(), index, "element produced");
                Some(Ok(Indexed { index, item }))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        match self.count {
            Some(count) => (0, Some((count + 1).saturating_sub(self.next))),
            None => (0, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{HostFault, WrapperError};
    use crate::handle::{HandleId, MockHostModel};
    use crate::wrapper::OwnedWrapper;

    struct Element {
        core: WrapperCore,
    }

    crate::owned_wrapper!(Element);

    impl HostObject for Element {
        const KIND: &'static str = "Element";

        fn from_core(core: WrapperCore) -> Self {
            Self { core }
        }
    }

    fn collection(mock: MockHostModel) -> WrapperCore {
        WrapperCore::root(Rc::new(mock), HandleId(100), "Cells")
    }

    #[test]
    fn caller_owned_elements_are_not_registered() {
        let mut mock = MockHostModel::new();
        mock.expect_count().times(1).returning(|_| Ok(2));
        mock.expect_item()
            .times(2)
            .returning(|_, index| Ok(HandleId(100 + index as u64)));
        mock.expect_release().times(3).returning(|_| Ok(()));

        let parent = collection(mock);
        let items: Vec<_> = EnumerationSession::<Element>::caller_owned(&parent)
            .collect::<WrapperResult<_>>()
            .unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|e| Rc::strong_count(&e.item) == 1));
        assert_eq!(items[1].item.core().handle().id(), HandleId(102));
    }

    #[test]
    fn count_fault_yields_single_error() {
        let mut mock = MockHostModel::new();
        mock.expect_count()
            .returning(|_| Err(HostFault::disconnected()));
        mock.expect_item().never();
        mock.expect_release().returning(|_| Ok(()));

        let parent = collection(mock);
        let registry = DisposableRegistry::new();
        let mut session = EnumerationSession::<Element>::collection_owned(&parent, &registry);
        assert!(matches!(
            session.next(),
            Some(Err(WrapperError::OperationFailed { .. }))
        ));
        assert!(session.next().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn item_fault_stops_after_partial_registration() {
        let mut mock = MockHostModel::new();
        mock.expect_count().returning(|_| Ok(3));
        mock.expect_item().returning(|_, index| {
            if index == 2 {
                Err(HostFault::new(0x8002_000B_u32 as i32, "bad index"))
            } else {
                Ok(HandleId(index as u64))
            }
        });
        mock.expect_release().times(2).returning(|_| Ok(()));

        let parent = collection(mock);
        let registry = DisposableRegistry::new();
        let results: Vec<_> =
            EnumerationSession::<Element>::collection_owned(&parent, &registry).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(registry.len(), 1);
        drop(results);
        registry.flush();
        parent.finalize();
    }

    #[test]
    fn disposed_parent_yields_nothing() {
        let mut mock = MockHostModel::new();
        mock.expect_count().never();
        mock.expect_release().times(1).returning(|_| Ok(()));

        let parent = collection(mock);
        parent.dispose_with(&[]);
        let mut session = EnumerationSession::<Element>::caller_owned(&parent);
        assert!(session.next().is_none());
        assert_eq!(session.host_count(), Some(0));
    }

    #[test]
    fn size_hint_bounds_remaining() {
        let mut mock = MockHostModel::new();
        mock.expect_count().returning(|_| Ok(2));
        mock.expect_item()
            .returning(|_, index| Ok(HandleId(index as u64)));
        mock.expect_release().returning(|_| Ok(()));

        let parent = collection(mock);
        let mut session = EnumerationSession::<Element>::caller_owned(&parent);
        assert_eq!(session.size_hint(), (0, None));
        let _first = session.next();
        assert_eq!(session.size_hint(), (0, Some(1)));
    }

    #[test]
    fn count_is_read_on_first_next() {
        let mut mock = MockHostModel::new();
        mock.expect_count().times(1).returning(|_| Ok(1));
        mock.expect_item().times(1).returning(|_, _| Ok(HandleId(7)));
        mock.expect_release().returning(|_| Ok(()));

        let parent = collection(mock);
        let mut session = EnumerationSession::<Element>::caller_owned(&parent);
        assert_eq!(session.host_count(), None);

        let first = session.next().unwrap().unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(session.host_count(), Some(1));
        assert!(session.next().is_none());
        assert!(session.next().is_none());
    }
}
