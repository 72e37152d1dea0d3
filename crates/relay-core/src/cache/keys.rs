//! Request normalization and stable hashing for cache keys
//!
//! Logically identical requests must map to the same key regardless of field
//! order or per-request noise such as timestamps and request ids.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Object fields that never contribute to a cache key
pub const VOLATILE_FIELDS: &[&str] = &[
    "timestamp",
    "created_at",
    "createdAt",
    "request_id",
    "requestId",
];

/// Remove volatile fields at any depth
pub fn strip_volatile(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !VOLATILE_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), strip_volatile(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_volatile).collect()),
        other => other.clone(),
    }
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Serialize with object keys in sorted order
///
/// Keys are inserted pre-sorted, so the output stays sorted when some other
/// crate in the build turns on serde_json's `preserve_order`.
pub fn canonical_json(value: &Value) -> String {
    sort_keys(value).to_string()
}

/// Hex SHA-256 of the normalized form of `value`
///
/// Values that cannot be represented as JSON hash as `null`, so they still
/// produce a usable (if shared) key instead of an error.
pub fn stable_hash<T: Serialize + ?Sized>(value: &T) -> String {
    let normalized = serde_json::to_value(value)
        .map(|v| strip_volatile(&v))
        .unwrap_or(Value::Null);
    let digest = Sha256::digest(canonical_json(&normalized).as_bytes());
    hex::encode(digest)
}
