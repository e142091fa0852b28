use crate::model::FieldMap;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Stable identity for an input set.
///
/// Object keys are sorted recursively before hashing so that two maps with
/// the same entries in different insertion order share an id.
pub fn inputs_id(inputs: &FieldMap) -> String {
    let canonical = canonicalize(&Value::Object(inputs.clone()));
    sha256_hex(&canonical.to_string())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = FieldMap::new();
            for k in keys {
                out.insert(k.clone(), canonicalize(&map[k.as_str()]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_the_id() {
        let a = json!({"question": "q", "context": {"b": 1, "a": [2, {"y": 1, "x": 0}]}});
        let b = json!({"context": {"a": [2, {"x": 0, "y": 1}], "b": 1}, "question": "q"});
        assert_eq!(
            inputs_id(a.as_object().unwrap()),
            inputs_id(b.as_object().unwrap())
        );
    }

    #[test]
    fn different_inputs_differ() {
        let a = json!({"question": "q1"});
        let b = json!({"question": "q2"});
        assert_ne!(
            inputs_id(a.as_object().unwrap()),
            inputs_id(b.as_object().unwrap())
        );
    }
}
