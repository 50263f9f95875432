//! Response envelope decoding for the REST backend
//!
//! Upstream responses come as `{"data": ...}`, `{"<entityKey>": ...}` or the
//! bare payload. Each body is classified once, in a fixed order, and every
//! call site consumes the unwrapped payload.

use super::StoreError;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// `{"data": payload}`
    Data(Value),
    /// `{"client": payload}`, `{"clients": [...]}` or OData `{"value": [...]}`
    Keyed(Value),
    /// The payload itself
    Bare(Value),
}

impl Envelope {
    /// Classify a single-entity body. `data` wins over the entity key, which
    /// wins over treating the body as bare. An object that carries its own
    /// `id` is never unwrapped.
    pub fn entity(body: Value, entity_key: &str) -> Self {
        match body {
            Value::Object(mut map) if !map.contains_key("id") => {
                if matches!(map.get("data"), Some(Value::Object(_))) {
                    Envelope::Data(map.remove("data").unwrap_or(Value::Null))
                } else if matches!(map.get(entity_key), Some(Value::Object(_))) {
                    Envelope::Keyed(map.remove(entity_key).unwrap_or(Value::Null))
                } else {
                    Envelope::Bare(Value::Object(map))
                }
            }
            other => Envelope::Bare(other),
        }
    }

    /// Classify a list body
    pub fn list(body: Value, plural_key: &str) -> Self {
        match body {
            Value::Object(mut map) => {
                if matches!(map.get("data"), Some(Value::Array(_))) {
                    Envelope::Data(map.remove("data").unwrap_or(Value::Null))
                } else if matches!(map.get(plural_key), Some(Value::Array(_))) {
                    Envelope::Keyed(map.remove(plural_key).unwrap_or(Value::Null))
                } else if matches!(map.get("value"), Some(Value::Array(_))) {
                    Envelope::Keyed(map.remove("value").unwrap_or(Value::Null))
                } else {
                    Envelope::Bare(Value::Object(map))
                }
            }
            other => Envelope::Bare(other),
        }
    }

    pub fn into_inner(self) -> Value {
        match self {
            Envelope::Data(value) | Envelope::Keyed(value) | Envelope::Bare(value) => value,
        }
    }

    /// Unwrap a list body into its items
    pub fn into_items(self) -> Result<Vec<Value>, StoreError> {
        match self.into_inner() {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(StoreError::Serialization(format!(
                "expected a list payload, got {}",
                kind(&other)
            ))),
        }
    }
}

/// Decode a count body: `{"count": n}`, `{"data": {"count": n}}`,
/// `{"data": n}` or a bare number
pub fn decode_count(body: &Value) -> Result<u64, StoreError> {
    let inner = body.get("data").unwrap_or(body);
    inner
        .as_u64()
        .or_else(|| inner.get("count").and_then(Value::as_u64))
        .or_else(|| inner.get("@odata.count").and_then(Value::as_u64))
        .ok_or_else(|| StoreError::Serialization(format!("expected a count, got {}", kind(body))))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_shapes() {
        let acme = json!({"id": "c1", "name": "Acme"});

        let wrapped = Envelope::entity(json!({"data": acme.clone()}), "client");
        assert_eq!(wrapped, Envelope::Data(acme.clone()));

        let keyed = Envelope::entity(json!({"client": acme.clone(), "meta": {}}), "client");
        assert_eq!(keyed, Envelope::Keyed(acme.clone()));

        let bare = Envelope::entity(acme.clone(), "client");
        assert_eq!(bare, Envelope::Bare(acme));
    }

    #[test]
    fn test_data_wins_over_entity_key() {
        let body = json!({"data": {"id": "a"}, "client": {"id": "b"}});
        assert_eq!(Envelope::entity(body, "client").into_inner(), json!({"id": "a"}));
    }

    #[test]
    fn test_entity_with_own_data_field_is_not_unwrapped() {
        let body = json!({"id": "r1", "data": {"q1": "yes"}});
        assert!(matches!(Envelope::entity(body, "response"), Envelope::Bare(_)));
    }

    #[test]
    fn test_list_shapes() {
        let items = json!([{"id": "c1"}, {"id": "c2"}]);

        for body in [
            json!({"data": items.clone()}),
            json!({"clients": items.clone()}),
            json!({"value": items.clone(), "@odata.count": 2}),
            items.clone(),
        ] {
            let decoded = Envelope::list(body, "clients").into_items().unwrap();
            assert_eq!(decoded.len(), 2);
        }

        assert!(Envelope::list(json!({"unexpected": 1}), "clients").into_items().is_err());
    }

    #[test]
    fn test_count_shapes() {
        assert_eq!(decode_count(&json!(4)).unwrap(), 4);
        assert_eq!(decode_count(&json!({"count": 4})).unwrap(), 4);
        assert_eq!(decode_count(&json!({"data": {"count": 4}})).unwrap(), 4);
        assert_eq!(decode_count(&json!({"data": 4})).unwrap(), 4);
        assert!(decode_count(&json!({"total": "many"})).is_err());
    }
}
