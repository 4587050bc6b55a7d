//! Field-level diff between two JSON documents.
//!
//! Objects are compared key by key and arrays index by index, recursing into
//! nested containers so that a change deep inside `folders.roots` is reported
//! at its own path rather than as a replacement of the whole `folders` value.
//! Paths use `.` between object keys and `[i]` for array positions; the empty
//! path denotes the document root.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DiffResult;

/// The result of comparing two JSON documents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonDiff {
    pub changes: Vec<FieldChange>,
}

impl JsonDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn additions(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c, FieldChange::Added { .. }))
            .count()
    }

    pub fn removals(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c, FieldChange::Removed { .. }))
            .count()
    }

    pub fn modifications(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c, FieldChange::Modified { .. }))
            .count()
    }

    /// The change at exactly `path`, if any.
    pub fn get(&self, path: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.path() == path)
    }
}

/// A single field-level change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum FieldChange {
    Added { path: String, value: Value },
    Removed { path: String, value: Value },
    Modified { path: String, old: Value, new: Value },
}

impl FieldChange {
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. } | Self::Removed { path, .. } | Self::Modified { path, .. } => {
                path
            }
        }
    }
}

/// Compute the field-level diff from `old` to `new`.
pub fn diff_json(old: &Value, new: &Value) -> JsonDiff {
    let mut changes = Vec::new();
    diff_value(String::new(), old, new, &mut changes);
    JsonDiff { changes }
}

/// Parse two JSON byte strings and diff them.
pub fn diff_json_bytes(old: &[u8], new: &[u8]) -> DiffResult<JsonDiff> {
    let old: Value = serde_json::from_slice(old)?;
    let new: Value = serde_json::from_slice(new)?;
    Ok(diff_json(&old, &new))
}

fn diff_value(path: String, old: &Value, new: &Value, out: &mut Vec<FieldChange>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => diff_object(&path, a, b, out),
        (Value::Array(a), Value::Array(b)) => diff_array(&path, a, b, out),
        _ if old != new => out.push(FieldChange::Modified {
            path,
            old: old.clone(),
            new: new.clone(),
        }),
        _ => {}
    }
}

fn diff_object(path: &str, old: &Map<String, Value>, new: &Map<String, Value>, out: &mut Vec<FieldChange>) {
    for (key, old_val) in old {
        let child = key_path(path, key);
        match new.get(key) {
            Some(new_val) => diff_value(child, old_val, new_val, out),
            None => out.push(FieldChange::Removed {
                path: child,
                value: old_val.clone(),
            }),
        }
    }
    for (key, new_val) in new {
        if !old.contains_key(key) {
            out.push(FieldChange::Added {
                path: key_path(path, key),
                value: new_val.clone(),
            });
        }
    }
}

fn diff_array(path: &str, old: &[Value], new: &[Value], out: &mut Vec<FieldChange>) {
    for (i, old_val) in old.iter().enumerate() {
        let child = format!("{path}[{i}]");
        match new.get(i) {
            Some(new_val) => diff_value(child, old_val, new_val, out),
            None => out.push(FieldChange::Removed {
                path: child,
                value: old_val.clone(),
            }),
        }
    }
    for (i, new_val) in new.iter().enumerate().skip(old.len()) {
        out.push(FieldChange::Added {
            path: format!("{path}[{i}]"),
            value: new_val.clone(),
        });
    }
}

fn key_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}
