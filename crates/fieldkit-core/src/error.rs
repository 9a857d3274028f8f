//! Error types for Fieldkit
//!
//! The taxonomy separates benign absence ([`RemoteError::NotFound`]), failures
//! that must reach the caller ([`RemoteError::Transport`], [`DocumentError`]),
//! and per-field noise ([`FieldError`]) that converters catch and skip.

use thiserror::Error;

/// Errors reported by a [`RemoteStore`](crate::RemoteStore)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The requested remote entity does not exist
    #[error("Remote entity not found: {0}")]
    NotFound(String),

    /// The remote could not be reached or refused the credentials
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The remote permanently refused a write
    #[error("Write rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether a later attempt of the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }
}

/// Errors converting between wire geometry and typed geometry
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeometryError {
    #[error("Invalid geometry: {0}")]
    InvalidShape(String),

    #[error("Geometry is missing field '{0}'")]
    MissingField(&'static str),

    #[error("Unknown geometry type: {0}")]
    UnknownType(String),

    /// A known geometry type that is deliberately not implemented
    #[error("Unsupported geometry type: {0}")]
    Unsupported(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Ring {ring} is not closed")]
    RingNotClosed { ring: usize },

    #[error("Ring {ring} has {len} coordinates, at least 4 required")]
    RingTooShort { ring: usize, len: usize },

    #[error("Polygon has no shell ring")]
    EmptyPolygon,
}

/// A single task response with the wrong shape
///
/// Converters log these and omit the field; they never abort a document.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FieldError {
    #[error("No task with id {0} in job")]
    UnknownTask(String),

    #[error("Expected {expected}, found {found}")]
    WrongType {
        expected: &'static str,
        found: String,
    },

    #[error("Expected {expected} geometry, found {found}")]
    UnexpectedGeometry {
        expected: &'static str,
        found: String,
    },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),
}

/// A structural problem that aborts decoding of one document
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DocumentError {
    #[error("Document {doc_id} is missing field '{field}'")]
    MissingField { doc_id: String, field: &'static str },

    #[error("Document {doc_id} has invalid field '{field}': {reason}")]
    InvalidField {
        doc_id: String,
        field: &'static str,
        reason: String,
    },

    #[error("Document {doc_id} references unknown job {job_id}")]
    UnknownJob { doc_id: String, job_id: String },

    #[error("Task {task_id} has unrecognized type '{type_name}'")]
    UnknownTaskType { task_id: String, type_name: String },

    #[error("Document {doc_id} belongs to {found}, expected {expected}")]
    OwnerMismatch {
        doc_id: String,
        expected: String,
        found: String,
    },

    #[error("Document {doc_id} has invalid geometry: {source}")]
    Geometry {
        doc_id: String,
        #[source]
        source: GeometryError,
    },
}

impl DocumentError {
    pub fn missing(doc_id: impl Into<String>, field: &'static str) -> Self {
        Self::MissingField {
            doc_id: doc_id.into(),
            field,
        }
    }

    pub fn invalid(doc_id: impl Into<String>, field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            doc_id: doc_id.into(),
            field,
            reason: reason.into(),
        }
    }

    /// Whether this failure was caused by a geometry type the model does not support
    pub fn is_unsupported_geometry(&self) -> bool {
        matches!(
            self,
            DocumentError::Geometry {
                source: GeometryError::Unsupported(_),
                ..
            }
        )
    }
}

/// Errors raised by a [`LocalStore`](crate::LocalStore)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    pub fn not_found(item: impl Into<String>) -> Self {
        Self::NotFound(item.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}

/// Illegal transitions of a mutation's sync state
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("Mutation {mutation_id} cannot move from {from} to {to}")]
    InvalidTransition {
        mutation_id: String,
        from: crate::mutation::SyncState,
        to: crate::mutation::SyncState,
    },

    #[error("Mutation not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::NotFound("survey-1".to_string());
        assert!(format!("{}", err).contains("not found"));
        assert!(format!("{}", err).contains("survey-1"));

        let err = RemoteError::Transport("unreachable".to_string());
        assert!(format!("{}", err).contains("Transport"));
    }

    #[test]
    fn test_remote_error_transience() {
        assert!(RemoteError::Transport("timeout".into()).is_transient());
        assert!(!RemoteError::NotFound("x".into()).is_transient());
        assert!(!RemoteError::Rejected("denied".into()).is_transient());
    }

    #[test]
    fn test_geometry_error_display() {
        let err = GeometryError::RingNotClosed { ring: 1 };
        assert!(format!("{}", err).contains("Ring 1"));

        let err = GeometryError::Unsupported("MultiPolygon".to_string());
        assert!(format!("{}", err).contains("MultiPolygon"));
    }

    #[test]
    fn test_document_error_unsupported_geometry() {
        let err = DocumentError::Geometry {
            doc_id: "loi-1".into(),
            source: GeometryError::Unsupported("MultiPolygon".into()),
        };
        assert!(err.is_unsupported_geometry());

        let err = DocumentError::Geometry {
            doc_id: "loi-1".into(),
            source: GeometryError::RingNotClosed { ring: 0 },
        };
        assert!(!err.is_unsupported_geometry());
    }

    #[test]
    fn test_error_conversions() {
        let err = DocumentError::missing("loi-1", "geometry");
        assert!(format!("{}", err).contains("geometry"));

        let err: FieldError = GeometryError::EmptyPolygon.into();
        assert!(matches!(err, FieldError::Geometry(_)));
    }
}
