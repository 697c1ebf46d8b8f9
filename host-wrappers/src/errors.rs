use thiserror::Error;

/// Result type alias for wrapper operations.
pub type WrapperResult<T> = Result<T, WrapperError>;

/// Result type alias for raw calls across the host boundary.
pub type HostResult<T> = Result<T, HostFault>;

/// A call rejected or failed by the host object model.
///
/// `code` is the HRESULT-style status reported by the host. Fakes and
/// non-COM hosts may use any negative value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host fault {}: {message}", format_fault_code(.code))]
pub struct HostFault {
    pub code: i32,
    pub message: String,
}

impl HostFault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// `RPC_E_DISCONNECTED`: the referent is gone on the host side.
    #[allow(clippy::cast_possible_wrap)]
    pub fn disconnected() -> Self {
        Self::new(0x8001_0108_u32 as i32, "object disconnected from its clients")
    }

    /// Returns `true` when the host reports that the object no longer exists.
    #[allow(clippy::cast_sign_loss)]
    pub fn is_disconnected(&self) -> bool {
        matches!(self.code as u32, 0x8001_0108 | 0x8001_0007 | 0x8007_06BA)
    }
}

/// Centralized error enum for the wrapper layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WrapperError {
    /// A mutating operation was attempted on a disposed wrapper.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The caller supplied an argument rejected before any host call.
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// A mutating host call failed. The original fault is kept as the source.
    #[error("{operation} failed on {target}: {source}")]
    OperationFailed {
        operation: String,
        target: String,
        #[source]
        source: HostFault,
    },

    /// A host value could not be converted to the requested Rust type.
    #[error("Data conversion failed: {0}")]
    Conversion(String),

    /// Catch-all for unexpected internal failures.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WrapperError {
    /// The underlying host fault, if this error carries one.
    pub const fn host_fault(&self) -> Option<&HostFault> {
        match self {
            Self::OperationFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for WrapperError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for WrapperError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Async task join failed: {err}"))
    }
}

impl From<std::num::TryFromIntError> for WrapperError {
    fn from(err: std::num::TryFromIntError) -> Self {
        Self::Conversion(format!("Integer conversion error: {err}"))
    }
}

/// Helper to format a fault code with its friendly hint.
#[allow(clippy::cast_sign_loss)]
pub fn format_fault_code(code: impl std::borrow::Borrow<i32>) -> String {
    let code = *code.borrow();
    let hex = format!("0x{:08X}", code as u32);
    match friendly_fault_hint(code) {
        Some(hint) => format!("{hex}: {hint}"),
        None => hex,
    }
}

/// Maps well-known automation error codes to actionable hints.
#[allow(clippy::cast_sign_loss)]
pub const fn friendly_fault_hint(code: i32) -> Option<&'static str> {
    match code as u32 {
        0x8001_0108 => Some("Object disconnected — the host released it or was closed"),
        0x8001_0007 => Some("Object invoked has disconnected from its clients"),
        0x8001_0001 => Some("Call rejected — the host is busy (modal dialog or edit mode)"),
        0x8001_010A => Some("Host is busy processing another call — retry later"),
        0x8007_06BA => Some("RPC server unavailable — the host application has exited"),
        0x8007_06BE => Some("Remote procedure call failed — the host may have crashed"),
        0x8002_0003 => Some("Member not found on this object (DISP_E_MEMBERNOTFOUND)"),
        0x8002_0006 => Some("Unknown name (DISP_E_UNKNOWNNAME)"),
        0x8002_0005 => Some("Type mismatch — host cannot convert the argument (DISP_E_TYPEMISMATCH)"),
        0x8002_000B => Some("Index out of range (DISP_E_BADINDEX)"),
        0x8002_0009 => Some("Host raised an exception while executing the call"),
        0x8007_0057 => Some("Invalid argument at the host level (E_INVALIDARG)"),
        0x8000_4003 => Some("Invalid pointer (E_POINTER)"),
        _ => None,
    }
}

/// Maps a [`WrapperError`] to a friendly hint if it carries a host fault.
pub fn friendly_error_hint(error: &WrapperError) -> Option<&'static str> {
    error.host_fault().and_then(|fault| friendly_fault_hint(fault.code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friendly_fault_hint_known_codes() {
        assert_eq!(
            friendly_fault_hint(0x8002_000B_u32 as i32),
            Some("Index out of range (DISP_E_BADINDEX)")
        );
        assert_eq!(
            friendly_fault_hint(0x8001_0001_u32 as i32),
            Some("Call rejected — the host is busy (modal dialog or edit mode)")
        );
    }

    #[test]
    fn test_friendly_fault_hint_unknown_code() {
        assert_eq!(friendly_fault_hint(-1), None);
        assert_eq!(format_fault_code(-1_i32), "0xFFFFFFFF");
    }

    #[test]
    fn test_host_fault_display_includes_hint() {
        let fault = HostFault::disconnected();
        let text = fault.to_string();
        assert!(text.contains("0x80010108"), "got: {text}");
        assert!(text.contains("Object disconnected"), "got: {text}");
        assert!(fault.is_disconnected());
    }

    #[test]
    fn test_operation_failed_keeps_source() {
        use std::error::Error as _;

        let err = WrapperError::OperationFailed {
            operation: "set Text".into(),
            target: "Application/Range".into(),
            source: HostFault::new(0x8007_0057_u32 as i32, "bad value"),
        };
        assert!(err.source().is_some());
        assert_eq!(
            friendly_error_hint(&err),
            Some("Invalid argument at the host level (E_INVALIDARG)")
        );
        assert_eq!(
            friendly_error_hint(&WrapperError::InvalidState("x".into())),
            None
        );
    }
}
