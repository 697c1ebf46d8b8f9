//! # host-wrappers
//!
//! Ownership layer over an apartment-bound automation object model.
//!
//! Every host reference is held by an [`ExternalHandle`] that is released
//! exactly once. Wrappers built on [`WrapperCore`] move through a
//! `Live → Disposed` lifecycle: explicit [`OwnedWrapper::dispose`] cascades
//! to cached children ([`LazyChildCache`]) and collection-registered
//! children ([`DisposableRegistry`]), while dropping a wrapper only
//! releases its own handle.
//!
//! ## Features
//! - `com-backend` (default): [`backend::ComHost`] over `IDispatch` (Windows only)
//! - `test-support`: exposes `MockHostModel` and the in-memory [`testing::FakeHost`]

pub mod apartment;
pub mod cache;
pub mod enumeration;
pub mod errors;
pub mod handle;
pub mod mapping;
pub mod model;
pub mod registry;
pub mod value;
pub mod wrapper;

#[cfg(all(windows, feature = "com-backend"))]
pub mod backend;
#[cfg(all(windows, feature = "com-backend"))]
mod com_guard;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;


// Stable public API
pub use apartment::{ApartmentConfig, ApartmentModel, ApartmentWorker};
pub use cache::LazyChildCache;
pub use enumeration::{EnumerationSession, Indexed, Ownership};
pub use errors::{
    HostFault, HostResult, WrapperError, WrapperResult, friendly_error_hint, friendly_fault_hint,
};
pub use handle::{ExternalHandle, HandleId, HostModel, ParentLink};
pub use mapping::EnumMapping;
pub use registry::DisposableRegistry;
pub use value::{FromHostValue, HostValue};
pub use wrapper::{
    ChildSlot, DefaultReason, HostObject, LifecycleState, OwnedWrapper, PropertyRead, WrapperCore,
};

#[cfg(all(windows, feature = "com-backend"))]
pub use com_guard::ComGuard;

// Test support re-export
#[cfg(any(test, feature = "test-support"))]
pub use handle::MockHostModel;
