//! The host boundary and the owned handle type built on it.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

#[cfg(any(test, feature = "test-support"))]
use mockall::automock;

use crate::errors::HostResult;
use crate::value::HostValue;

/// Opaque token naming one host-owned native object.
///
/// The token itself owns nothing; ownership lives in [`ExternalHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The leaf capabilities of the host automation object model.
///
/// Implementations forward each call synchronously to the host. Every
/// call except [`HostModel::release`] may fail with a host fault; the
/// wrapper layer decides whether a fault is swallowed or propagated.
///
/// The trait is deliberately not `Send`: host objects are bound to the
/// apartment that created them.
#[cfg_attr(any(test, feature = "test-support"), automock)]
pub trait HostModel {
    /// Materializes an object-valued property or creates a new object.
    fn create_child(&self, parent: HandleId, kind: &str, args: &[HostValue])
    -> HostResult<HandleId>;

    /// Drops the layer's reference to `handle`. Called at most once per handle.
    fn release(&self, handle: HandleId) -> HostResult<()>;

    fn get_property(&self, handle: HandleId, name: &str) -> HostResult<HostValue>;

    fn set_property(&self, handle: HandleId, name: &str, value: HostValue) -> HostResult<()>;

    /// Calls a method such as `Delete` or `Save`.
    fn invoke_method(&self, handle: HandleId, name: &str, args: &[HostValue])
    -> HostResult<HostValue>;

    /// Number of elements in a host collection.
    fn count(&self, handle: HandleId) -> HostResult<usize>;

    /// Element `index` of a host collection, 1-based like the host itself.
    fn item(&self, handle: HandleId, index: usize) -> HostResult<HandleId>;
}

/// Non-owning back-reference from a child to its parent.
///
/// Only used to build error messages and log fields; it never keeps the
/// parent alive and never takes part in disposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    path: Rc<str>,
}

impl ParentLink {
    pub fn new(path: impl Into<Rc<str>>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Exclusive owner of one host reference.
///
/// [`ExternalHandle::release`] is idempotent and never fails from the
/// caller's point of view. Dropping an unreleased handle releases it; that
/// drop is the finalizer backstop and touches nothing but this handle.
pub struct ExternalHandle {
    id: HandleId,
    host: Rc<dyn HostModel>,
    released: Cell<bool>,
    path: Rc<str>,
}

impl ExternalHandle {
    /// Takes ownership of `id`. The caller must not release it elsewhere.
    pub fn adopt(host: Rc<dyn HostModel>, id: HandleId, path: impl Into<Rc<str>>) -> Self {
        let path = path.into();
        tracing::trace!(handle = %id, path = %path, "handle adopted");
        Self {
            id,
            host,
            released: Cell::new(false),
            path,
        }
    }

    pub const fn id(&self) -> HandleId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.released.get()
    }

    /// The host this handle belongs to, for adopting children.
    pub fn host(&self) -> &Rc<dyn HostModel> {
        &self.host
    }

    /// Forwards a leaf call to the host.
    ///
    /// Returns `None` without touching the host once the handle has been
    /// released.
    pub fn invoke<R>(
        &self,
        call: impl FnOnce(&dyn HostModel, HandleId) -> HostResult<R>,
    ) -> Option<HostResult<R>> {
        if self.released.get() {
            tracing::trace!(handle = %self.id, path = %self.path, "call skipped on released handle");
            return None;
        }
        Some(call(self.host.as_ref(), self.id))
    }

    /// Releases the host reference. Faults are logged and swallowed.
    pub fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        match self.host.release(self.id) {
            Ok(()) => tracing::trace!(handle = %self.id, path = %self.path, "handle released"),
            Err(fault) => tracing::warn!(
                handle = %self.id,
                path = %self.path,
                error = %fault,
                "host fault during release ignored"
            ),
        }
    }
}

impl fmt::Debug for ExternalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("released", &self.released.get())
            .finish_non_exhaustive()
    }
}

impl Drop for ExternalHandle {
    fn drop(&mut self) {
        if !self.released.get() {
            tracing::debug!(handle = %self.id, path = %self.path, "releasing undisposed handle on drop");
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HostFault;
    use mockall::predicate::eq;

    fn shared(mock: MockHostModel) -> Rc<dyn HostModel> {
        Rc::new(mock)
    }

    #[test]
    fn release_is_called_once_for_repeated_release() {
        let mut mock = MockHostModel::new();
        mock.expect_release()
            .with(eq(HandleId(7)))
            .times(1)
            .returning(|_| Ok(()));

        let handle = ExternalHandle::adopt(shared(mock), HandleId(7), "Root");
        handle.release();
        handle.release();
        assert!(handle.is_released());
        drop(handle);
    }

    #[test]
    fn drop_releases_unreleased_handle() {
        let mut mock = MockHostModel::new();
        mock.expect_release()
            .with(eq(HandleId(3)))
            .times(1)
            .returning(|_| Ok(()));

        drop(ExternalHandle::adopt(shared(mock), HandleId(3), "Root"));
    }

    #[test]
    fn release_swallows_host_fault() {
        let mut mock = MockHostModel::new();
        mock.expect_release()
            .times(1)
            .returning(|_| Err(HostFault::disconnected()));

        let handle = ExternalHandle::adopt(shared(mock), HandleId(1), "Root");
        handle.release();
        assert!(handle.is_released());
    }

    #[test]
    fn invoke_after_release_never_reaches_host() {
        let mut mock = MockHostModel::new();
        mock.expect_release().times(1).returning(|_| Ok(()));
        mock.expect_get_property().never();

        let handle = ExternalHandle::adopt(shared(mock), HandleId(1), "Root");
        handle.release();
        let outcome = handle.invoke(|host, id| host.get_property(id, "Name"));
        assert!(outcome.is_none());
    }

    #[test]
    fn invoke_forwards_to_host() {
        let mut mock = MockHostModel::new();
        mock.expect_get_property()
            .withf(|id, name| *id == HandleId(5) && name == "Name")
            .times(1)
            .returning(|_, _| Ok(HostValue::from("Book1")));
        mock.expect_release().times(1).returning(|_| Ok(()));

        let handle = ExternalHandle::adopt(shared(mock), HandleId(5), "Root");
        let value = handle.invoke(|host, id| host.get_property(id, "Name"));
        assert_eq!(value, Some(Ok(HostValue::Text("Book1".into()))));
    }
}
