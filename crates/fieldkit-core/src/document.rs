//! Loosely-typed documents as read from the remote store

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::DocumentError;

/// A remote document: an id plus an open field map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: String,
    pub fields: Map<String, JsonValue>,
}

impl RemoteDocument {
    pub fn new(id: impl Into<String>, fields: Map<String, JsonValue>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Wrap a JSON value, which must be an object
    pub fn from_json(id: impl Into<String>, value: JsonValue) -> Result<Self, DocumentError> {
        let id = id.into();
        match value {
            JsonValue::Object(fields) => Ok(Self { id, fields }),
            other => Err(DocumentError::invalid(
                id,
                "root",
                format!("expected an object, found {}", json_type_name(&other)),
            )),
        }
    }

    /// Field value, treating explicit `null` as absent
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(JsonValue::as_str)
    }

    pub fn into_json(self) -> JsonValue {
        JsonValue::Object(self.fields)
    }
}

/// Human-readable name of a JSON value's shape, for error messages
pub fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "map",
    }
}
