//! Canonical JSON encoding.
//!
//! Object keys are emitted in sorted order at every nesting level and no
//! insignificant whitespace is written, so two semantically equal values
//! always produce the same bytes regardless of how their maps were built.

use serde::Serialize;
use serde_json::{Map, Value};

/// Errors from canonical encoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CanonicalError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convert any serializable value into a key-sorted JSON value.
pub fn canonical_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, CanonicalError> {
    let value =
        serde_json::to_value(value).map_err(|e| CanonicalError::Serialization(e.to_string()))?;
    Ok(sort_keys(value))
}

/// Encode a value as its canonical JSON string.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    let value = canonical_value(value)?;
    serde_json::to_string(&value).map_err(|e| CanonicalError::Serialization(e.to_string()))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let mut sorted = Map::new();
            for (key, val) in entries {
                sorted.insert(key, sort_keys(val));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
