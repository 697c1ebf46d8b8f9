//! The owned-wrapper base: one handle, a dispose state machine, and the
//! getter / mutator contracts every wrapper type shares.
//!
//! Explicit disposal ([`OwnedWrapper::dispose`]) cascades to every
//! registered child slot before releasing the wrapper's own handle.
//! Finalizer disposal ([`WrapperCore::finalize`], and dropping the
//! wrapper) releases only the wrapper's own handle.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::errors::{HostFault, HostResult, WrapperError, WrapperResult};
use crate::handle::{ExternalHandle, HandleId, HostModel, ParentLink};
use crate::value::{FromHostValue, HostValue};

/// Lifecycle of a wrapper. `Disposed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Live,
    Disposed,
}

/// Why a getter returned its documented default instead of a host value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultReason {
    /// The wrapper was already disposed; the host was not called.
    Disposed,
    /// The host rejected the read.
    Fault(HostFault),
    /// The host answered with a value of the wrong shape.
    Conversion(String),
}

/// Outcome of a property read.
///
/// Getters collapse this to a plain value; callers that must tell "the
/// host reported the default" apart from "the read failed" use
/// [`WrapperCore::read`] directly.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyRead<T> {
    Host(T),
    Defaulted { value: T, reason: DefaultReason },
}

impl<T> PropertyRead<T> {
    pub fn into_value(self) -> T {
        match self {
            Self::Host(value) | Self::Defaulted { value, .. } => value,
        }
    }

    pub const fn is_defaulted(&self) -> bool {
        matches!(self, Self::Defaulted { .. })
    }

    pub const fn reason(&self) -> Option<&DefaultReason> {
        match self {
            Self::Host(_) => None,
            Self::Defaulted { reason, .. } => Some(reason),
        }
    }
}

/// Something disposed as part of its owner's explicit disposal.
pub trait ChildSlot {
    fn dispose_children(&self);
}

/// Common behaviour of every wrapper type.
///
/// Implementors expose their [`WrapperCore`] and list the child slots that
/// explicit disposal must cascade into; the dispose state machine itself
/// lives here and is not meant to be overridden. The
/// [`owned_wrapper!`](crate::owned_wrapper) macro writes the impl.
pub trait OwnedWrapper {
    fn core(&self) -> &WrapperCore;

    /// Child slots disposed, in order, before the wrapper's own handle.
    fn child_slots(&self) -> Vec<&dyn ChildSlot> {
        Vec::new()
    }

    /// Explicit disposal: cascade into child slots, then release the handle.
    /// Idempotent.
    fn dispose(&self) {
        self.core().dispose_with(&self.child_slots());
    }

    fn is_disposed(&self) -> bool {
        self.core().is_disposed()
    }
}

/// A wrapper type that can be built around a freshly adopted handle.
pub trait HostObject: OwnedWrapper + Sized {
    /// Host-side type name, used in paths and log fields.
    const KIND: &'static str;

    fn from_core(core: WrapperCore) -> Self;
}

/// Implements [`OwnedWrapper`] for a struct with a `core: WrapperCore` field,
/// registering the listed fields as cascade slots.
///
/// ```ignore
/// owned_wrapper!(Range, slots: [font, borders, cells]);
/// ```
#[macro_export]
macro_rules! owned_wrapper {
    ($ty:ty) => {
        impl $crate::wrapper::OwnedWrapper for $ty {
            fn core(&self) -> &$crate::wrapper::WrapperCore {
                &self.core
            }
        }
    };
    ($ty:ty, slots: [$($slot:ident),+ $(,)?]) => {
        impl $crate::wrapper::OwnedWrapper for $ty {
            fn core(&self) -> &$crate::wrapper::WrapperCore {
                &self.core
            }

            fn child_slots(&self) -> Vec<&dyn $crate::wrapper::ChildSlot> {
                vec![$(&self.$slot as &dyn $crate::wrapper::ChildSlot),+]
            }
        }
    };
}

/// The state every wrapper owns: its handle, lifecycle, and parent link.
pub struct WrapperCore {
    handle: ExternalHandle,
    kind: &'static str,
    parent: Option<ParentLink>,
    state: Cell<LifecycleState>,
}

impl WrapperCore {
    /// Adopts a root handle obtained directly from the host.
    pub fn root(host: Rc<dyn HostModel>, id: HandleId, kind: &'static str) -> Self {
        Self {
            handle: ExternalHandle::adopt(host, id, kind),
            kind,
            parent: None,
            state: Cell::new(LifecycleState::Live),
        }
    }

    fn adopt(&self, id: HandleId, kind: &'static str, path: String) -> Self {
        Self {
            handle: ExternalHandle::adopt(Rc::clone(self.handle.host()), id, path),
            kind,
            parent: Some(ParentLink::new(self.path())),
            state: Cell::new(LifecycleState::Live),
        }
    }

    pub const fn handle(&self) -> &ExternalHandle {
        &self.handle
    }

    pub const fn kind(&self) -> &'static str {
        self.kind
    }

    /// Diagnostic path such as `Application/Documents[1]/Range`.
    pub fn path(&self) -> &str {
        self.handle.path()
    }

    pub const fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.get() == LifecycleState::Disposed
    }

    /// Explicit disposal with the given cascade slots. No-op once disposed.
    pub fn dispose_with(&self, slots: &[&dyn ChildSlot]) {
        if self.state.replace(LifecycleState::Disposed) == LifecycleState::Disposed {
            return;
        }
        for slot in slots {
            slot.dispose_children();
        }
        self.handle.release();
        tracing::debug!(
            handle = %self.handle.id(),
            path = %self.path(),
            slots = slots.len(),
            "wrapper disposed"
        );
    }

    /// Finalizer disposal: releases this wrapper's handle only.
    ///
    /// Cached and registered children are left alone; they are released by
    /// their own finalization when their last owner drops them.
    pub fn finalize(&self) {
        if self.state.replace(LifecycleState::Disposed) == LifecycleState::Disposed {
            return;
        }
        self.handle.release();
        tracing::debug!(handle = %self.handle.id(), path = %self.path(), "wrapper finalized");
    }

    fn live_invoke<R>(
        &self,
        call: impl FnOnce(&dyn HostModel, HandleId) -> HostResult<R>,
    ) -> Option<HostResult<R>> {
        if self.is_disposed() {
            return None;
        }
        self.handle.invoke(call)
    }

    /// Reads a property, reporting whether the value came from the host.
    pub fn read<T: FromHostValue>(&self, property: &str, default: T) -> PropertyRead<T> {
        self.read_with(property, default, T::from_host_value)
    }

    /// Like [`WrapperCore::read`] with a custom conversion.
    pub fn read_with<T>(
        &self,
        property: &str,
        default: T,
        convert: impl FnOnce(HostValue) -> WrapperResult<T>,
    ) -> PropertyRead<T> {
        let Some(outcome) = self.live_invoke(|host, id| host.get_property(id, property)) else {
            tracing::debug!(path = %self.path(), property, "read on disposed wrapper, using default");
            return PropertyRead::Defaulted {
                value: default,
                reason: DefaultReason::Disposed,
            };
        };

        match outcome.map_err(DefaultReason::Fault).and_then(|raw| {
            convert(raw).map_err(|err| DefaultReason::Conversion(err.to_string()))
        }) {
            Ok(value) => PropertyRead::Host(value),
            Err(reason) => {
                tracing::warn!(
                    path = %self.path(),
                    property,
                    reason = ?reason,
                    "property read failed, using default"
                );
                PropertyRead::Defaulted {
                    value: default,
                    reason,
                }
            }
        }
    }

    /// Getter contract: the host value, or `default` on any failure.
    pub fn get<T: FromHostValue>(&self, property: &str, default: T) -> T {
        self.read(property, default).into_value()
    }

    fn mutate<R>(
        &self,
        operation: &str,
        call: impl FnOnce(&dyn HostModel, HandleId) -> HostResult<R>,
    ) -> WrapperResult<R> {
        match self.live_invoke(call) {
            None => Err(WrapperError::InvalidState(format!(
                "{operation} on disposed {}",
                self.path()
            ))),
            Some(Ok(value)) => Ok(value),
            Some(Err(fault)) => {
                tracing::warn!(path = %self.path(), operation, error = %fault, "host call failed");
                Err(WrapperError::OperationFailed {
                    operation: operation.to_string(),
                    target: self.path().to_string(),
                    source: fault,
                })
            }
        }
    }

    /// Mutator contract: writes a property, propagating host faults.
    pub fn set(&self, property: &str, value: impl Into<HostValue>) -> WrapperResult<()> {
        let value = value.into();
        self.mutate(&format!("set {property}"), |host, id| {
            host.set_property(id, property, value)
        })
    }

    /// Mutator contract: calls a host method such as `Delete` or `Save`.
    pub fn call(&self, method: &str, args: &[HostValue]) -> WrapperResult<HostValue> {
        self.mutate(method, |host, id| host.invoke_method(id, method, args))
    }

    /// Materializes an object-valued property as a new child wrapper.
    pub fn child<T: HostObject>(&self, property: &str) -> WrapperResult<T> {
        self.create(property, &[], property)
    }

    /// Asks the host for a new object of `kind`; the result is not registered
    /// anywhere and belongs to the caller.
    pub fn create<T: HostObject>(
        &self,
        kind: &str,
        args: &[HostValue],
        segment: &str,
    ) -> WrapperResult<T> {
        let id = self.mutate(&format!("create {kind}"), |host, parent| {
            host.create_child(parent, kind, args)
        })?;
        let path = format!("{}/{segment}", self.path());
        Ok(T::from_core(self.adopt(id, T::KIND, path)))
    }

    /// Wraps element `index` (1-based) of this collection.
    pub fn element<T: HostObject>(&self, index: usize) -> WrapperResult<T> {
        if index == 0 {
            return Err(WrapperError::Argument(format!(
                "{}: collection indices start at 1",
                self.path()
            )));
        }
        let id = self.mutate(&format!("item {index}"), |host, collection| {
            host.item(collection, index)
        })?;
        let path = format!("{}[{index}]", self.path());
        Ok(T::from_core(self.adopt(id, T::KIND, path)))
    }

    /// Element count, failing on a disposed wrapper or a host fault.
    pub fn try_count(&self) -> WrapperResult<usize> {
        self.mutate("Count", |host, id| host.count(id))
    }

    /// Getter contract for the element count; `0` on failure.
    pub fn count(&self) -> usize {
        match self.live_invoke(|host, id| host.count(id)) {
            Some(Ok(count)) => count,
            Some(Err(fault)) => {
                tracing::warn!(path = %self.path(), error = %fault, "Count failed, using default");
                0
            }
            None => 0,
        }
    }
}

impl fmt::Debug for WrapperCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperCore")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}
