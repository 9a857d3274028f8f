//! AuditInfo conversion and the missing-audit fallback rule
//!
//! Missing `created` becomes [`AuditInfo::fallback`]; missing `lastModified`
//! copies `created`.

use serde_json::{Value as JsonValue, json};
use tracing::warn;

use fieldkit_core::{AuditInfo, FieldError, RemoteDocument, User, json_type_name};

use crate::timestamp::{timestamp_from_wire, timestamp_to_wire};

pub const CREATED: &str = "created";
pub const LAST_MODIFIED: &str = "lastModified";

const USER: &str = "user";
const USER_ID: &str = "id";
const EMAIL: &str = "email";
const DISPLAY_NAME: &str = "displayName";
const CLIENT_TIMESTAMP: &str = "clientTimestamp";
const SERVER_TIMESTAMP: &str = "serverTimestamp";

/// Decode a nested audit object
pub fn audit_info_from_wire(value: &JsonValue) -> Result<AuditInfo, FieldError> {
    let map = value.as_object().ok_or_else(|| FieldError::WrongType {
        expected: "map",
        found: json_type_name(value).to_string(),
    })?;

    let user = match map.get(USER).filter(|u| !u.is_null()) {
        Some(user) => user_from_wire(user)?,
        None => User::unknown(),
    };
    let client_timestamp = timestamp_from_wire(
        map.get(CLIENT_TIMESTAMP)
            .ok_or(FieldError::MissingField(CLIENT_TIMESTAMP))?,
    )?;
    let server_timestamp = match map.get(SERVER_TIMESTAMP).filter(|t| !t.is_null()) {
        Some(ts) => Some(timestamp_from_wire(ts)?),
        None => None,
    };

    Ok(AuditInfo {
        user,
        client_timestamp,
        server_timestamp,
    })
}

fn user_from_wire(value: &JsonValue) -> Result<User, FieldError> {
    let map = value.as_object().ok_or_else(|| FieldError::WrongType {
        expected: "map",
        found: json_type_name(value).to_string(),
    })?;
    let field = |name: &str| {
        map.get(name)
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Ok(User {
        id: field(USER_ID),
        email: field(EMAIL),
        display_name: field(DISPLAY_NAME),
    })
}

pub fn audit_info_to_wire(audit: &AuditInfo) -> JsonValue {
    let mut value = json!({
        USER: {
            USER_ID: audit.user.id,
            EMAIL: audit.user.email,
            DISPLAY_NAME: audit.user.display_name,
        },
        CLIENT_TIMESTAMP: timestamp_to_wire(audit.client_timestamp),
    });
    if let (Some(ts), Some(map)) = (audit.server_timestamp, value.as_object_mut()) {
        map.insert(SERVER_TIMESTAMP.to_string(), timestamp_to_wire(ts));
    }
    value
}

/// Read `created` and `lastModified` from a document, degrading gracefully
///
/// A present but malformed audit object is logged and treated as absent.
pub fn audit_pair(doc: &RemoteDocument) -> (AuditInfo, AuditInfo) {
    let read = |field: &'static str| {
        doc.get(field).and_then(|value| match audit_info_from_wire(value) {
            Ok(audit) => Some(audit),
            Err(e) => {
                warn!(doc_id = %doc.id, field, error = %e, "Ignoring malformed audit info");
                None
            }
        })
    };
    let created = read(CREATED).unwrap_or_else(AuditInfo::fallback);
    let last_modified = read(LAST_MODIFIED).unwrap_or_else(|| created.clone());
    (created, last_modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn audit_json(seconds: i64) -> JsonValue {
        json!({
            "user": {"id": "u1", "email": "u1@example.com", "displayName": "Una"},
            "clientTimestamp": {"seconds": seconds, "nanoseconds": 0},
            "serverTimestamp": {"seconds": seconds + 1, "nanoseconds": 0},
        })
    }

    #[test]
    fn test_decode_audit() {
        let audit = audit_info_from_wire(&audit_json(100)).unwrap();
        assert_eq!(audit.user.display_name, "Una");
        assert_eq!(audit.client_timestamp.timestamp(), 100);
        assert_eq!(audit.server_timestamp.map(|t| t.timestamp()), Some(101));
    }

    #[test]
    fn test_encode_decode() {
        let audit = AuditInfo::new(
            User::new("u2", "u2@example.com", "Dos"),
            DateTime::from_timestamp(500, 0).unwrap(),
        );
        assert_eq!(audit_info_from_wire(&audit_info_to_wire(&audit)).unwrap(), audit);
    }

    #[test]
    fn test_missing_created_uses_fallback() {
        let doc = RemoteDocument::from_json("d1", json!({})).unwrap();
        let (created, last_modified) = audit_pair(&doc);
        assert!(created.is_fallback());
        assert_eq!(last_modified, created);
    }

    #[test]
    fn test_missing_last_modified_copies_created() {
        let doc = RemoteDocument::from_json("d1", json!({"created": audit_json(10)})).unwrap();
        let (created, last_modified) = audit_pair(&doc);
        assert_eq!(created.client_timestamp.timestamp(), 10);
        assert_eq!(last_modified, created);
    }

    #[test]
    fn test_malformed_created_degrades() {
        let doc = RemoteDocument::from_json("d1", json!({"created": "yesterday"})).unwrap();
        let (created, _) = audit_pair(&doc);
        assert!(created.is_fallback());
    }
}
