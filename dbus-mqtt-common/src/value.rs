use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar value read from the device bus.
///
/// Absent values are not represented here; readers use `Option<BusValue>`
/// so that "no value" can never reach a serialized payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BusValue {
    /// Integer value (any signed or unsigned bus integer that fits i64).
    Integer(i64),

    /// Floating-point value. Always finite.
    Float(f64),

    /// Text value.
    Text(String),

    /// Boolean value.
    Boolean(bool),
}

impl BusValue {
    /// Build a float value, returning `None` for NaN and infinities.
    pub fn float(v: f64) -> Option<Self> {
        v.is_finite().then_some(BusValue::Float(v))
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BusValue::Integer(v) => Some(*v as f64),
            BusValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for BusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusValue::Integer(v) => write!(f, "{}", v),
            BusValue::Float(v) => write!(f, "{}", v),
            BusValue::Text(v) => f.write_str(v),
            BusValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for BusValue {
    fn from(v: i64) -> Self {
        BusValue::Integer(v)
    }
}

impl From<i32> for BusValue {
    fn from(v: i32) -> Self {
        BusValue::Integer(i64::from(v))
    }
}

impl From<u32> for BusValue {
    fn from(v: u32) -> Self {
        BusValue::Integer(i64::from(v))
    }
}

impl From<u64> for BusValue {
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(BusValue::Integer)
            .unwrap_or(BusValue::Float(v as f64))
    }
}

impl TryFrom<f64> for BusValue {
    /// The rejected non-finite value.
    type Error = f64;

    fn try_from(v: f64) -> Result<Self, Self::Error> {
        BusValue::float(v).ok_or(v)
    }
}

impl From<String> for BusValue {
    fn from(v: String) -> Self {
        BusValue::Text(v)
    }
}

impl From<&str> for BusValue {
    fn from(v: &str) -> Self {
        BusValue::Text(v.to_string())
    }
}

impl From<bool> for BusValue {
    fn from(v: bool) -> Self {
        BusValue::Boolean(v)
    }
}
