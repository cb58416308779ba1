//! Layer merge
//!
//! - Objects: deep-merge by key
//! - Arrays: replace (last wins)
//! - Scalars: override (last wins)

use serde_json::Value;

/// Deep merge `overlay` onto `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_override_keeps_siblings() {
        let base = json!({"actor": {"unlock_interval_ms": 2000, "thread_name": "cache-access"}});
        let overlay = json!({"actor": {"unlock_interval_ms": 50}});

        let merged = deep_merge(base, overlay);

        assert_eq!(merged["actor"]["unlock_interval_ms"], 50);
        assert_eq!(merged["actor"]["thread_name"], "cache-access");
    }

    #[test]
    fn test_array_replaced() {
        let merged = deep_merge(json!({"caches": ["a", "b"]}), json!({"caches": ["c"]}));
        assert_eq!(merged["caches"], json!(["c"]));
    }

    #[test]
    fn test_layers_last_wins() {
        let merged = merge_layers(vec![
            json!({"actor": {"lock_timeout_ms": 1}}),
            json!({"actor": {"lock_timeout_ms": 2}}),
            json!({"actor": {"lock_timeout_ms": 3}}),
        ]);
        assert_eq!(merged["actor"]["lock_timeout_ms"], 3);
    }

    #[test]
    fn test_empty_layers_is_null() {
        assert_eq!(merge_layers(Vec::new()), Value::Null);
    }
}
