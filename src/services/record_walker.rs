//! Collect object keys referenced by a record's data tree.

use crate::models::record::object_key;
use serde_json::Value;
use std::collections::BTreeSet;

/// Every `id/name` key referenced at `path` inside `data`.
///
/// Intermediate segments are collections: a list of entries is walked entry
/// by entry, a single map counts as a one-entry list. Missing or malformed
/// branches contribute nothing; this never fails.
pub fn collect_keys(data: &Value, path: &str) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    walk(data, path, &mut keys);
    keys
}

fn walk(data: &Value, path: &str, keys: &mut BTreeSet<String>) {
    let (head, rest) = match path.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    if head.is_empty() {
        return;
    }
    let Some(value) = data.get(head).filter(|v| !v.is_null()) else {
        return;
    };

    match rest {
        None => {
            if let Some(key) = leaf_key(value) {
                keys.insert(key);
            }
        }
        Some(rest) => match value {
            Value::Array(entries) => entries.iter().for_each(|entry| walk(entry, rest, keys)),
            Value::Object(_) => walk(value, rest, keys),
            _ => {}
        },
    }
}

fn leaf_key(value: &Value) -> Option<String> {
    let id = value.get("id").and_then(Value::as_str).filter(|s| !s.is_empty())?;
    let name = value.get("name").and_then(Value::as_str).filter(|s| !s.is_empty())?;
    Some(object_key(id, name))
}
