use std::fmt;

use crate::errors::{WrapperError, WrapperResult};
use crate::value::{FromHostValue, HostValue};

/// Bidirectional table between a domain enum and host enum codes.
///
/// Built once per enum pair. Unknown host codes translate to the
/// mandatory fallback; domain values missing from the table are rejected
/// before they reach the host.
pub struct EnumMapping<D: 'static> {
    name: &'static str,
    pairs: &'static [(D, i32)],
    fallback: D,
}

impl<D: Copy + PartialEq + fmt::Debug> EnumMapping<D> {
    pub const fn new(name: &'static str, pairs: &'static [(D, i32)], fallback: D) -> Self {
        Self {
            name,
            pairs,
            fallback,
        }
    }

    pub const fn fallback(&self) -> D {
        self.fallback
    }

    /// Exact lookup with no fallback.
    pub fn lookup(&self, code: i32) -> Option<D> {
        self.pairs
            .iter()
            .find(|(_, host)| *host == code)
            .map(|(domain, _)| *domain)
    }

    /// Host code to domain value, using the table's fallback when unknown.
    pub fn to_domain(&self, code: i32) -> D {
        self.to_domain_or(code, self.fallback)
    }

    /// Host code to domain value with a per-property fallback.
    pub fn to_domain_or(&self, code: i32, default: D) -> D {
        self.lookup(code).unwrap_or_else(|| {
            tracing::debug!(mapping = self.name, code, fallback = ?default, "unmapped host code");
            default
        })
    }

    /// Domain value to host code.
    pub fn to_host(&self, value: D) -> WrapperResult<i32> {
        self.pairs
            .iter()
            .find(|(domain, _)| *domain == value)
            .map(|(_, host)| *host)
            .ok_or_else(|| {
                WrapperError::Argument(format!("{value:?} has no {} host code", self.name))
            })
    }

    /// Converts a raw property value; non-integer values are conversion errors.
    pub fn from_host_value(&self, value: HostValue) -> WrapperResult<D> {
        i32::from_host_value(value).map(|code| self.to_domain(code))
    }
}

impl<D: fmt::Debug> fmt::Debug for EnumMapping<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumMapping")
            .field("name", &self.name)
            .field("entries", &self.pairs.len())
            .field("fallback", &self.fallback)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Weight {
        Thin,
        Thick,
        Unspecified,
    }

    static WEIGHT: EnumMapping<Weight> = EnumMapping::new(
        "Weight",
        &[(Weight::Thin, 1), (Weight::Thick, 4)],
        Weight::Thin,
    );

    #[test]
    fn round_trips_known_codes() {
        assert_eq!(WEIGHT.to_domain(4), Weight::Thick);
        assert_eq!(WEIGHT.to_host(Weight::Thick).unwrap(), 4);
    }

    #[test]
    fn unknown_code_uses_fallback() {
        assert_eq!(WEIGHT.to_domain(-4105), Weight::Thin);
        assert_eq!(WEIGHT.to_domain_or(-4105, Weight::Thick), Weight::Thick);
        assert_eq!(WEIGHT.lookup(-4105), None);
    }

    #[test]
    fn unmapped_domain_value_is_argument_error() {
        assert!(matches!(
            WEIGHT.to_host(Weight::Unspecified),
            Err(WrapperError::Argument(_))
        ));
    }

    #[test]
    fn from_host_value_rejects_text() {
        assert_eq!(WEIGHT.from_host_value(HostValue::Int(1)).unwrap(), Weight::Thin);
        assert!(WEIGHT.from_host_value(HostValue::Text("thin".into())).is_err());
    }
}
