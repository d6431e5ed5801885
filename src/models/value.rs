//! Typed values produced by variable extraction

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single resolved value
///
/// Missing data is represented by `Option::None` wherever a `Value` is
/// expected, never by a sentinel variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean flag
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Calendar date
    Date(NaiveDate),
    /// String or category label
    Str(String),
}

/// The declared type of a variable's values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Binary flag
    Bool,
    /// Integer
    Int,
    /// Floating point
    Float,
    /// Calendar date
    Date,
    /// String or category label
    Str,
}

impl Value {
    /// The type of this value
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Date(_) => ValueType::Date,
            Self::Str(_) => ValueType::Str,
        }
    }

    /// Truthiness of a value used as a bare boolean in an expression
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Date(_) => true,
            Self::Str(s) => !s.is_empty(),
        }
    }

    /// Compare two values, returning `None` when the types are not comparable
    ///
    /// Integers and floats compare numerically with each other.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            #[allow(clippy::cast_precision_loss)]
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// The value as a date, if it is one
    #[must_use]
    pub const fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// The value as an integer, if it is one
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The value as the declared type, `None` when it does not fit
    ///
    /// Integers widen to floats. Dates declared as strings become their
    /// `YYYY-MM-DD` text, since patient files read any such string back as a
    /// date.
    #[must_use]
    pub fn coerce_to(self, value_type: ValueType) -> Option<Self> {
        match (self, value_type) {
            #[allow(clippy::cast_precision_loss)]
            (Self::Int(n), ValueType::Float) => Some(Self::Float(n as f64)),
            (Self::Date(d), ValueType::Str) => Some(Self::Str(d.format("%Y-%m-%d").to_string())),
            (value, declared) if value.value_type() == declared => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Binary flags are written as 0/1 in extracts and group keys
            Self::Bool(b) => write!(f, "{}", u8::from(*b)),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}
