//! Scalar cell values.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;

/// A single cell value read from a spreadsheet or delimited-text file.
///
/// Absent cells are represented as `None` at the row level, never as a
/// variant of this enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Free text (every delimited-text cell is text)
    Text(String),
    /// Integer number
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Boolean cell
    Bool(bool),
    /// Calendar date without a time component
    Date(NaiveDate),
    /// Date and time
    DateTime(NaiveDateTime),
}

impl Value {
    /// Creates a text value.
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    /// Returns the text payload if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true if the value's text rendering is empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Returns the hashable key part used by duplicate detection.
    ///
    /// Integral floats collapse onto integers so `1` and `1.0` are the same key.
    pub fn key_part(&self) -> KeyPart {
        match self {
            Value::Text(s) => KeyPart::Text(s.clone()),
            Value::Int(i) => KeyPart::Int(*i),
            Value::Float(f) => match integral(*f) {
                Some(i) => KeyPart::Int(i),
                None => KeyPart::Float(f.to_bits()),
            },
            Value::Bool(b) => KeyPart::Int(i64::from(*b)),
            Value::Date(d) => KeyPart::Date(*d),
            Value::DateTime(dt) => KeyPart::DateTime(*dt),
        }
    }
}

/// Returns the float as an integer when it has no fractional part and fits.
pub(crate) fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
        Some(f as i64)
    } else {
        None
    }
}

/// Hashable projection of a [`Value`] used in uniqueness keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Text(String),
    Int(i64),
    Float(u64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl fmt::Display for Value {
    /// Renders the value the way the upload's originating tools display it:
    /// integral floats keep one decimal, booleans are capitalized and
    /// date-times use a space separator.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => {
                if x.is_nan() {
                    f.write_str("nan")
                } else if x.is_infinite() {
                    f.write_str(if *x > 0.0 { "inf" } else { "-inf" })
                } else if x.fract() == 0.0 && x.abs() < 1e16 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Text(s) => serializer.serialize_str(s),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) if x.is_finite() => serializer.serialize_f64(*x),
            Value::Float(_) => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            Value::DateTime(dt) => serializer.collect_str(&dt.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}
