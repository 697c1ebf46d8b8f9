//! Scalar values exchanged with the host.

use chrono::NaiveDateTime;

use crate::errors::{WrapperError, WrapperResult};

/// A scalar property value as seen on the host boundary.
///
/// Object-valued properties never travel as a `HostValue`; they are
/// materialized as child handles through `HostModel::create_child`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    /// No value (`VT_EMPTY` / `VT_NULL`).
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Host-local timestamp without zone information.
    Date(NaiveDateTime),
}

impl HostValue {
    /// Short type name used in conversion error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::Bool(_) => "Bool",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::Text(_) => "Text",
            Self::Date(_) => "Date",
        }
    }

    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NaiveDateTime> for HostValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::Date(value)
    }
}

/// Fallible conversion out of a [`HostValue`].
///
/// Hosts are loose about numeric types (a "size" may come back as an
/// integer or a float, a flag as `0`/`-1`), so the numeric conversions
/// accept the obvious neighbours.
pub trait FromHostValue: Sized {
    fn from_host_value(value: HostValue) -> WrapperResult<Self>;
}

fn mismatch<T>(expected: &str, value: &HostValue) -> WrapperResult<T> {
    Err(WrapperError::Conversion(format!(
        "expected {expected}, host returned {}",
        value.type_name()
    )))
}

impl FromHostValue for HostValue {
    fn from_host_value(value: HostValue) -> WrapperResult<Self> {
        Ok(value)
    }
}

impl FromHostValue for bool {
    fn from_host_value(value: HostValue) -> WrapperResult<Self> {
        match value {
            HostValue::Bool(b) => Ok(b),
            // Automation booleans are 0 / -1 when routed through integers.
            HostValue::Int(i) => Ok(i != 0),
            other => mismatch("Bool", &other),
        }
    }
}

/// `i64::MIN as f64` is exact; `i64::MAX as f64` rounds up to 2^63.
#[allow(clippy::cast_precision_loss)]
const I64_FLOAT_RANGE: std::ops::Range<f64> = i64::MIN as f64..i64::MAX as f64;

impl FromHostValue for i64 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_host_value(value: HostValue) -> WrapperResult<Self> {
        match value {
            HostValue::Int(i) => Ok(i),
            HostValue::Float(f) if f.fract() == 0.0 && I64_FLOAT_RANGE.contains(&f) => {
                Ok(f as i64)
            }
            HostValue::Bool(b) => Ok(if b { -1 } else { 0 }),
            other => mismatch("Int", &other),
        }
    }
}

impl FromHostValue for i32 {
    fn from_host_value(value: HostValue) -> WrapperResult<Self> {
        let wide = i64::from_host_value(value)?;
        Ok(Self::try_from(wide)?)
    }
}

impl FromHostValue for usize {
    fn from_host_value(value: HostValue) -> WrapperResult<Self> {
        let wide = i64::from_host_value(value)?;
        Ok(Self::try_from(wide)?)
    }
}

impl FromHostValue for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn from_host_value(value: HostValue) -> WrapperResult<Self> {
        match value {
            HostValue::Float(f) => Ok(f),
            HostValue::Int(i) => Ok(i as Self),
            other => mismatch("Float", &other),
        }
    }
}

impl FromHostValue for String {
    fn from_host_value(value: HostValue) -> WrapperResult<Self> {
        match value {
            HostValue::Text(s) => Ok(s),
            HostValue::Empty => Ok(Self::new()),
            other => mismatch("Text", &other),
        }
    }
}

impl FromHostValue for NaiveDateTime {
    fn from_host_value(value: HostValue) -> WrapperResult<Self> {
        match value {
            HostValue::Date(d) => Ok(d),
            other => mismatch("Date", &other),
        }
    }
}

impl<T: FromHostValue> FromHostValue for Option<T> {
    fn from_host_value(value: HostValue) -> WrapperResult<Self> {
        match value {
            HostValue::Empty => Ok(None),
            other => T::from_host_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_accepts_automation_integers() {
        assert!(bool::from_host_value(HostValue::Int(-1)).unwrap());
        assert!(!bool::from_host_value(HostValue::Int(0)).unwrap());
        assert!(bool::from_host_value(HostValue::Text("yes".into())).is_err());
    }

    #[test]
    fn test_numeric_neighbours() {
        assert_eq!(i32::from_host_value(HostValue::Float(12.0)).unwrap(), 12);
        assert!(i32::from_host_value(HostValue::Float(12.5)).is_err());
        assert!(i32::from_host_value(HostValue::Int(i64::MAX)).is_err());
        assert!((f64::from_host_value(HostValue::Int(3)).unwrap() - 3.0).abs() < f64::EPSILON);
        assert!(usize::from_host_value(HostValue::Int(-2)).is_err());
    }

    #[test]
    fn test_out_of_range_floats_are_rejected() {
        assert!(i64::from_host_value(HostValue::Float(1e300)).is_err());
        assert!(i64::from_host_value(HostValue::Float(-1e300)).is_err());
        assert!(i64::from_host_value(HostValue::Float(9_223_372_036_854_775_808.0)).is_err());
        assert!(i64::from_host_value(HostValue::Float(f64::INFINITY)).is_err());
        assert_eq!(
            i64::from_host_value(HostValue::Float(-9_223_372_036_854_775_808.0)).unwrap(),
            i64::MIN
        );
        assert_eq!(i64::from_host_value(HostValue::Float(-4.0e15)).unwrap(), -4_000_000_000_000_000);
    }

    #[test]
    fn test_text_and_empty() {
        assert_eq!(String::from_host_value(HostValue::Empty).unwrap(), "");
        assert_eq!(
            Option::<String>::from_host_value(HostValue::Empty).unwrap(),
            None
        );
        assert_eq!(
            Option::<i64>::from_host_value(HostValue::Int(4)).unwrap(),
            Some(4)
        );
    }

    #[test]
    fn test_conversion_error_names_both_types() {
        let err = NaiveDateTime::from_host_value(HostValue::Bool(true)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Date") && msg.contains("Bool"), "got: {msg}");
    }
}
