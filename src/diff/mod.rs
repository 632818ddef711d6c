//! Structural diff between two document snapshots.
//!
//! The comparison is pure and total over JSON values: it never touches the
//! store and never fails. Changes are reported at the finest granularity, so a
//! composite node only shows up as a single change when it exists on one side
//! only or changes type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

pub mod summary;

pub use summary::summarize;

// ---------------------------------------------------------------------------
// Change: one leaf-level difference
// ---------------------------------------------------------------------------

/// What happened at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// A single difference between two documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    /// Location inside the document, e.g. `sections[0].title`. Empty for the root.
    pub path: String,
    /// `(old, new)`; the missing side is `None` for additions and removals.
    pub values: (Option<Value>, Option<Value>),
}

impl Change {
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self {
            kind: ChangeKind::Added,
            path: path.into(),
            values: (None, Some(value)),
        }
    }

    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self {
            kind: ChangeKind::Removed,
            path: path.into(),
            values: (Some(value), None),
        }
    }

    pub fn modified(path: impl Into<String>, old: Value, new: Value) -> Self {
        Self {
            kind: ChangeKind::Modified,
            path: path.into(),
            values: (Some(old), Some(new)),
        }
    }

    pub fn old_value(&self) -> Option<&Value> {
        self.values.0.as_ref()
    }

    pub fn new_value(&self) -> Option<&Value> {
        self.values.1.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How arrays are matched up.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ArrayStrategy {
    /// Compare index by index. Reordering shows up as modifications.
    #[default]
    Positional,
    /// Match object elements by the value of `key` (e.g. a section `id`)
    /// before comparing. Arrays whose elements do not all carry a unique
    /// scalar `key` fall back to positional comparison.
    Keyed { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffOptions {
    pub arrays: ArrayStrategy,
}

impl DiffOptions {
    pub fn keyed(key: impl Into<String>) -> Self {
        Self {
            arrays: ArrayStrategy::Keyed { key: key.into() },
        }
    }
}

// ---------------------------------------------------------------------------
// Algorithm
// ---------------------------------------------------------------------------

/// Compute the changes turning `old` into `new`, comparing arrays positionally.
pub fn diff(old: &Value, new: &Value) -> Vec<Change> {
    diff_with(old, new, &DiffOptions::default())
}

/// Compute the changes turning `old` into `new` with explicit options.
pub fn diff_with(old: &Value, new: &Value, options: &DiffOptions) -> Vec<Change> {
    let mut changes = Vec::new();
    diff_value(old, new, "", options, &mut changes);
    changes
}

fn diff_value(old: &Value, new: &Value, path: &str, options: &DiffOptions, out: &mut Vec<Change>) {
    match (old, new) {
        (Value::Array(a), Value::Array(b)) => diff_arrays(a, b, path, options, out),
        (Value::Object(a), Value::Object(b)) => diff_objects(a, b, path, options, out),
        _ => {
            if old != new {
                out.push(Change::modified(path, old.clone(), new.clone()));
            }
        }
    }
}

fn diff_objects(
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    path: &str,
    options: &DiffOptions,
    out: &mut Vec<Change>,
) {
    for (key, old_value) in old {
        let child = key_path(path, key);
        match new.get(key) {
            Some(new_value) => diff_value(old_value, new_value, &child, options, out),
            None => out.push(Change::removed(child, old_value.clone())),
        }
    }
    for (key, new_value) in new {
        if !old.contains_key(key) {
            out.push(Change::added(key_path(path, key), new_value.clone()));
        }
    }
}

fn diff_arrays(old: &[Value], new: &[Value], path: &str, options: &DiffOptions, out: &mut Vec<Change>) {
    if let ArrayStrategy::Keyed { key } = &options.arrays {
        if let (Some(old_keys), Some(new_keys)) = (element_keys(old, key), element_keys(new, key)) {
            diff_keyed(old, new, &old_keys, &new_keys, path, key, options, out);
            return;
        }
    }

    for index in 0..old.len().max(new.len()) {
        let child = format!("{}[{}]", path, index);
        match (old.get(index), new.get(index)) {
            (Some(a), Some(b)) => diff_value(a, b, &child, options, out),
            (Some(a), None) => out.push(Change::removed(child, a.clone())),
            (None, Some(b)) => out.push(Change::added(child, b.clone())),
            (None, None) => {}
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn diff_keyed(
    old: &[Value],
    new: &[Value],
    old_keys: &[String],
    new_keys: &[String],
    path: &str,
    key: &str,
    options: &DiffOptions,
    out: &mut Vec<Change>,
) {
    let new_index: HashMap<&str, usize> = new_keys
        .iter()
        .enumerate()
        .map(|(i, k)| (k.as_str(), i))
        .collect();
    let old_set: HashSet<&str> = old_keys.iter().map(String::as_str).collect();

    for (old_value, old_key) in old.iter().zip(old_keys) {
        let child = format!("{}[{}={}]", path, key, old_key);
        match new_index.get(old_key.as_str()) {
            Some(&i) => diff_value(old_value, &new[i], &child, options, out),
            None => out.push(Change::removed(child, old_value.clone())),
        }
    }
    for (new_value, new_key) in new.iter().zip(new_keys) {
        if !old_set.contains(new_key.as_str()) {
            let child = format!("{}[{}={}]", path, key, new_key);
            out.push(Change::added(child, new_value.clone()));
        }
    }
}

/// The key of every element, or `None` if any element lacks a unique scalar key.
fn element_keys(items: &[Value], key: &str) -> Option<Vec<String>> {
    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(items.len());
    for item in items {
        let rendered = match item.as_object()?.get(key)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if !seen.insert(rendered.clone()) {
            return None;
        }
        keys.push(rendered);
    }
    Some(keys)
}

fn key_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}
