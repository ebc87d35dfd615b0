//! # Canonical JSON and Stable Hashing
//!
//! A single canonical stringification used by both the agent (to compute the
//! inventory `hash` it publishes) and the server (tests, tooling). The rules:
//!
//! - object keys sorted lexicographically (byte order)
//! - arrays keep their source order
//! - no insignificant whitespace
//! - primitives encoded exactly as `serde_json` encodes them
//!
//! Two semantically equal inventories therefore always hash identically,
//! regardless of which side serialized them or in which order the fields
//! were assembled.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Renders a JSON value in canonical form.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Lowercase hex SHA-256 of the canonical rendering.
///
/// This is the change-detection contract for system inventory: the agent
/// publishes `stable_hash(info)` and the server compares it against the
/// stored digest.
pub fn stable_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // serde_json handles JSON string escaping
                out.push_str(&serde_json::to_string(key).expect("string serialization"));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Null, booleans, numbers and strings have a single serde_json encoding
        primitive => {
            out.push_str(&serde_json::to_string(primitive).expect("primitive serialization"));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_are_sorted() {
        let value = json!({"b": 1, "a": 2, "c": 3});
        assert_eq!(canonical_json(&value), r#"{"a":2,"b":1,"c":3}"#);
    }

    #[test]
    fn test_nested_objects_are_sorted() {
        let value = json!({"z": {"y": 1, "x": 2}, "a": [{"b": 1, "a": 2}]});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":[{"a":2,"b":1}],"z":{"x":2,"y":1}}"#
        );
    }

    #[test]
    fn test_array_order_is_preserved() {
        let value = json!([3, 1, 2]);
        assert_eq!(canonical_json(&value), "[3,1,2]");
    }

    #[test]
    fn test_no_whitespace() {
        let value = json!({"a": [1, 2], "b": {"c": null}});
        assert!(!canonical_json(&value).contains(' '));
    }

    #[test]
    fn test_string_escaping() {
        let value = json!({"key\"quote": "line\nbreak"});
        assert_eq!(canonical_json(&value), r#"{"key\"quote":"line\nbreak"}"#);
    }

    #[test]
    fn test_hash_is_key_order_independent() {
        let a = json!({"hostname": "edge-1", "cpuCores": 8, "gpus": []});
        let b = json!({"gpus": [], "cpuCores": 8, "hostname": "edge-1"});
        assert_eq!(stable_hash(&a), stable_hash(&b));
    }

    #[test]
    fn test_hash_is_sensitive_to_values() {
        let a = json!({"hostname": "edge-1"});
        let b = json!({"hostname": "edge-2"});
        assert_ne!(stable_hash(&a), stable_hash(&b));
    }

    #[test]
    fn test_hash_is_sensitive_to_array_order() {
        let a = json!({"gpus": ["a", "b"]});
        let b = json!({"gpus": ["b", "a"]});
        assert_ne!(stable_hash(&a), stable_hash(&b));
    }

    #[test]
    fn test_hash_format() {
        let hash = stable_hash(&json!({}));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_known_vector() {
        // sha256 of "{}" - pins the canonical form of the empty object
        assert_eq!(
            stable_hash(&json!({})),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }
}
