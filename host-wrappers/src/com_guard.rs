//! RAII guard for COM initialization/teardown on an apartment thread.
//!
//! Ensures `CoUninitialize` is called exactly once per successful
//! `CoInitializeEx`, even on early returns or panics.

use std::marker::PhantomData;
use windows::Win32::System::Com::{
    COINIT, COINIT_APARTMENTTHREADED, COINIT_MULTITHREADED, CoInitializeEx, CoUninitialize,
};

use crate::apartment::ApartmentModel;

const fn coinit(model: ApartmentModel) -> COINIT {
    match model {
        ApartmentModel::SingleThreaded => COINIT_APARTMENTTHREADED,
        ApartmentModel::MultiThreaded => COINIT_MULTITHREADED,
    }
}

/// Drop guard for COM thread initialization.
///
/// `ComGuard` is `!Send` and `!Sync`: COM initialization is per-thread, so
/// the guard must be created and dropped on the same OS thread.
#[derive(Debug)]
pub struct ComGuard {
    model: ApartmentModel,
    _not_send: PhantomData<*mut ()>,
}

impl ComGuard {
    /// Joins the calling thread to an apartment of the given model.
    ///
    /// `S_FALSE` (already initialized in the same model) counts as success.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `CoInitializeEx` fails, including
    /// `RPC_E_CHANGED_MODE` when the thread already joined another model.
    pub fn new(model: ApartmentModel) -> anyhow::Result<Self> {
        // SAFETY: `CoInitializeEx` is a standard Win32 FFI call with no
        // reserved pointer. The result is checked below, and a successful
        // call is balanced by `CoUninitialize` in Drop.
        let hr = unsafe { CoInitializeEx(None, coinit(model)) };

        if let Err(e) = hr.ok() {
            tracing::error!(error = ?e, ?model, "COM apartment initialization failed");
            return Err(anyhow::anyhow!("CoInitializeEx failed: {e}"));
        }

        tracing::debug!(?model, "COM apartment initialized");

        Ok(Self {
            model,
            _not_send: PhantomData,
        })
    }

    pub const fn model(&self) -> ApartmentModel {
        self.model
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        tracing::debug!(model = ?self.model, "COM apartment teardown");
        // SAFETY: Paired with the successful `CoInitializeEx` in `new()`.
        // The guard is !Send, so this runs on the initializing thread.
        unsafe {
            CoUninitialize();
        }
    }
}
