//! Host model implementations backed by a real automation runtime.
//!
//! Each backend is gated behind a feature flag.

pub mod com;

pub use com::ComHost;
