//! Deep merge of JSON payloads.

use serde_json::Value;

/// Merge `overlay` onto `base`.
///
/// - Two objects merge field by field, recursively; fields present on only
///   one side are kept.
/// - Two arrays concatenate, base first.
/// - Anything else: the overlay wins.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_fields), Value::Object(overlay_fields)) => {
            let mut merged = base_fields.clone();
            for (name, overlay_value) in overlay_fields {
                let value = match base_fields.get(name) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value.clone(),
                };
                merged.insert(name.clone(), value);
            }
            Value::Object(merged)
        }
        (Value::Array(base_items), Value::Array(overlay_items)) => {
            Value::Array(base_items.iter().chain(overlay_items).cloned().collect())
        }
        (_, overlay) => overlay.clone(),
    }
}
