//! Timestamp normalization
//!
//! Stores and upstream APIs hand back time in several native shapes. All of
//! them are folded into `DateTime<Utc>`; entities serialize that as ISO-8601.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

/// Accepts RFC 3339 strings, `{seconds, nanoseconds}` objects (with or
/// without leading underscores) and integer epoch milliseconds.
pub fn normalize(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, nanos as u32).single()
        }
        _ => None,
    }
}

pub fn to_iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Rewrite the given top-level fields of an object to ISO-8601 strings in
/// place; fields that cannot be interpreted are left untouched
pub fn normalize_fields(value: &mut Value, fields: &[&str]) {
    if let Value::Object(map) = value {
        for field in fields {
            if let Some(raw) = map.get(*field) {
                if let Some(dt) = normalize(raw) {
                    map.insert(field.to_string(), Value::String(to_iso(&dt)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalizes_every_native_shape() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        assert_eq!(normalize(&json!("2024-05-01T12:00:00Z")), Some(expected));
        assert_eq!(normalize(&json!("2024-05-01T14:00:00+02:00")), Some(expected));
        assert_eq!(normalize(&json!({"seconds": 1714564800, "nanoseconds": 0})), Some(expected));
        assert_eq!(normalize(&json!({"_seconds": 1714564800, "_nanoseconds": 0})), Some(expected));
        assert_eq!(normalize(&json!(1714564800000i64)), Some(expected));
    }

    #[test]
    fn test_rejects_unknown_shapes() {
        assert_eq!(normalize(&json!("yesterday")), None);
        assert_eq!(normalize(&json!({"nanoseconds": 5})), None);
        assert_eq!(normalize(&json!(true)), None);
    }

    #[test]
    fn test_normalize_fields_in_place() {
        let mut value = json!({
            "createdAt": {"seconds": 1714564800, "nanoseconds": 0},
            "updatedAt": "not a date",
            "name": "Acme"
        });
        normalize_fields(&mut value, &["createdAt", "updatedAt"]);

        assert_eq!(value["createdAt"], json!("2024-05-01T12:00:00.000Z"));
        assert_eq!(value["updatedAt"], json!("not a date"));
    }
}
