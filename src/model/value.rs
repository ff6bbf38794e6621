//! Attribute value type stored in element documents.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single attribute value.
///
/// Covers what ingestion feeds put in an attribute bag:
/// - Scalars: Bool, Int, Float, String
/// - Containers: List, Map
/// - Temporal: DateTime (UTC)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    DateTime(DateTime<Utc>),
}

// ============================================================================
// Accessors
// ============================================================================

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::DateTime(_) => "datetime",
        }
    }

    /// Integral floats (`3.0`) convert too.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// True if this value equals `other`, or is a list containing it.
    ///
    /// Lets a filter on `tags: "x"` match an element whose tags contain `"x"`.
    pub fn contains_or_eq(&self, other: &Value) -> bool {
        match self {
            Value::List(items) => items.iter().any(|v| v == other) || self == other,
            _ => self == other,
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(v as i64) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<u64> for Value { fn from(v: u64) -> Self { Value::Int(v as i64) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::String(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::String(v.to_owned()) } }
impl From<DateTime<Utc>> for Value { fn from(v: DateTime<Utc>) -> Self { Value::DateTime(v) } }
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self { Value::List(v.into_iter().map(Into::into).collect()) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from("evil.com"), Value::String("evil.com".into()));
        assert_eq!(Value::from(42), Value::Int(42));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(
            Value::from(vec!["a", "b"]),
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
    }

    #[test]
    fn test_as_int_accepts_integral_floats() {
        assert_eq!(Value::Float(3.0).as_int(), Some(3));
        assert_eq!(Value::Float(3.5).as_int(), None);
        assert_eq!(Value::from("3").as_int(), None);
    }

    #[test]
    fn test_contains_or_eq() {
        let tags = Value::from(vec!["malware", "c2"]);
        assert!(tags.contains_or_eq(&Value::from("c2")));
        assert!(!tags.contains_or_eq(&Value::from("phishing")));
        assert!(Value::from("x").contains_or_eq(&Value::from("x")));
    }

    #[test]
    fn test_serde_roundtrip_keeps_datetime() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 4, 5, 6, 7).unwrap();
        let json = serde_json::to_string(&Value::from(dt)).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_datetime(), Some(dt));
    }
}
