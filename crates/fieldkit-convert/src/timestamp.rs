//! Wire timestamps
//!
//! Accepted forms are the document-store object `{"seconds", "nanoseconds"}`
//! and RFC 3339 strings. Encoding always produces the object form.

use chrono::{DateTime, Utc};
use serde_json::{Value as JsonValue, json};

use fieldkit_core::{FieldError, json_type_name};

const SECONDS: &str = "seconds";
const NANOSECONDS: &str = "nanoseconds";

/// Decode a wire timestamp
pub fn timestamp_from_wire(value: &JsonValue) -> Result<DateTime<Utc>, FieldError> {
    match value {
        JsonValue::Object(map) => {
            let seconds = map
                .get(SECONDS)
                .and_then(JsonValue::as_i64)
                .ok_or(FieldError::MissingField(SECONDS))?;
            let nanos = match map.get(NANOSECONDS) {
                None | Some(JsonValue::Null) => 0,
                Some(n) => n
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| FieldError::InvalidTimestamp(format!("bad nanoseconds {n}")))?,
            };
            DateTime::from_timestamp(seconds, nanos).ok_or_else(|| {
                FieldError::InvalidTimestamp(format!("{seconds}s {nanos}ns out of range"))
            })
        }
        JsonValue::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| FieldError::InvalidTimestamp(format!("{s}: {e}"))),
        other => Err(FieldError::WrongType {
            expected: "timestamp",
            found: json_type_name(other).to_string(),
        }),
    }
}

/// Encode a timestamp in the document-store object form
pub fn timestamp_to_wire(timestamp: DateTime<Utc>) -> JsonValue {
    json!({
        SECONDS: timestamp.timestamp(),
        NANOSECONDS: timestamp.timestamp_subsec_nanos(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_form() {
        let ts = timestamp_from_wire(&json!({"seconds": 1_700_000_000, "nanoseconds": 5})).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_nanos(), 5);
    }

    #[test]
    fn test_nanoseconds_optional() {
        let ts = timestamp_from_wire(&json!({"seconds": 60})).unwrap();
        assert_eq!(ts.timestamp(), 60);
    }

    #[test]
    fn test_rfc3339_form() {
        let ts = timestamp_from_wire(&json!("2024-03-01T12:30:00+02:00")).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T10:30:00+00:00");
    }

    #[test]
    fn test_rejects_other_shapes() {
        assert!(matches!(
            timestamp_from_wire(&json!(12)),
            Err(FieldError::WrongType { .. })
        ));
        assert!(matches!(
            timestamp_from_wire(&json!("yesterday")),
            Err(FieldError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            timestamp_from_wire(&json!({"nanoseconds": 1})),
            Err(FieldError::MissingField("seconds"))
        ));
    }

    #[test]
    fn test_encode_matches_decode() {
        let ts = DateTime::from_timestamp(1_234, 567).unwrap();
        assert_eq!(timestamp_from_wire(&timestamp_to_wire(ts)).unwrap(), ts);
    }
}
