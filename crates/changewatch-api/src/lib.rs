//! Plain data types shared by every changewatch crate.
//!
//! - `Value` / `Record`: the shape of stored documents
//! - `Filter`: count/find predicates, renderable as JSON for diagnostics
//! - `StoreError`: failures surfaced by an entity store

use std::collections::HashMap;

pub mod error;
pub mod filter;

pub use error::{Result, StoreError};
pub use filter::Filter;

/// Field holding a record's primary key.
pub const ID_FIELD: &str = "_id";

/// A stored document: field name to value.
pub type Record = HashMap<String, Value>;

/// Field value inside a `Record` or a `Filter`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
    Null,
}

impl Value {
    /// Convert into a serde_json::Value (used when rendering filters)
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(Value::to_json_value).collect())
            }
            Value::Object(obj) => serde_json::Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), v.to_json_value()))
                    .collect(),
            ),
            Value::Null => serde_json::Value::Null,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json_value())
    }
}

/// Build a `Record` from `(field, value)` pairs.
pub fn record<K, V, I>(fields: I) -> Record
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_renders_json() {
        let tags = Value::Array(vec!["x".into(), Value::Null]);
        assert_eq!(tags.to_string(), r#"["x",null]"#);
        assert_eq!(Value::from(3i64).to_string(), "3");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
        assert_eq!(Value::from(f64::NAN).to_string(), "null");
    }

    #[test]
    fn test_record_builder() {
        let rec = record([("name", "milk"), ("uuid", "abc")]);
        assert_eq!(rec.get("name").and_then(Value::as_string), Some("milk"));
        assert_eq!(rec.len(), 2);
    }
}
