use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `(key, cached_result, created_at, expires_at)` (§3). `key` is unique;
/// lookups must filter `expires_at > now`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyKeyRecord {
    pub key: String,
    pub cached_result: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Default idempotency-key TTL (§4.1).
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Builds the canonical idempotency key format:
/// `{operation}:{aggregate_id}:{hex16(sha256(canonical_json(payload)))}`.
pub fn build_key(operation: &str, aggregate_id: &str, payload: &Value) -> String {
    use sha2::{Digest, Sha256};

    let canonical = canonical_json(payload);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let hex16 = hex::encode(&digest[..8]);
    format!("{operation}:{aggregate_id}:{hex16}")
}

/// Sorts object keys recursively so the same logical payload always hashes
/// the same way regardless of field insertion order.
fn canonical_json(v: &Value) -> String {
    fn sort_keys(v: &Value) -> Value {
        match v {
            Value::Object(map) => {
                let mut keys: Vec<_> = map.keys().cloned().collect();
                keys.sort();
                let mut new = serde_json::Map::new();
                for k in keys {
                    new.insert(k.clone(), sort_keys(&map[&k]));
                }
                Value::Object(new)
            }
            Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
            _ => v.clone(),
        }
    }

    serde_json::to_string(&sort_keys(v)).expect("json serialization must not fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_key_is_order_independent() {
        let a = json!({"amount": 10, "client": "Max"});
        let b = json!({"client": "Max", "amount": 10});
        assert_eq!(
            build_key("creditor_debt_update", "123", &a),
            build_key("creditor_debt_update", "123", &b)
        );
    }

    #[test]
    fn build_key_changes_with_payload() {
        let a = json!({"amount": 10});
        let b = json!({"amount": 11});
        assert_ne!(
            build_key("op", "1", &a),
            build_key("op", "1", &b)
        );
    }
}
