//! Common types used throughout tabular-cdk
//!
//! Shared type aliases and small helpers used across multiple modules.

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type (insertion ordered)
pub type JsonObject = serde_json::Map<String, JsonValue>;

/// Named parameters bound into query templates and permission filters
pub type Parameters = JsonObject;

// ============================================================================
// Helpers
// ============================================================================

/// Split the given keys out of a JSON object.
///
/// Returns `(known, rest)` where `known` holds every key listed in `keys`
/// that was present in `object`, and `rest` holds everything else in the
/// original order.
pub fn split_object(object: JsonObject, keys: &[&str]) -> (JsonObject, JsonObject) {
    let mut known = JsonObject::new();
    let mut rest = JsonObject::new();
    for (key, value) in object {
        if keys.contains(&key.as_str()) {
            known.insert(key, value);
        } else {
            rest.insert(key, value);
        }
    }
    (known, rest)
}

/// Short type name used in log lines and validation messages
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
