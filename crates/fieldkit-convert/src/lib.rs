//! # Fieldkit Convert
//!
//! Pure functions between the remote wire representation
//! ([`RemoteDocument`](fieldkit_core::RemoteDocument) and `serde_json` values)
//! and the typed domain model.
//!
//! Decoding is tolerant: a malformed response field is logged and dropped
//! while the rest of its submission is kept. Structural problems surface as
//! [`DocumentError`](fieldkit_core::DocumentError) so callers can skip the
//! record.
//!
//! ## Example
//!
//! ```
//! use fieldkit_convert::{geometry_from_wire, geometry_to_wire};
//! use serde_json::json;
//!
//! let raw = json!({"type": "Point", "coordinates": [-89.63410225, 41.89729784]});
//! let geometry = geometry_from_wire(&raw).unwrap();
//! assert_eq!(geometry_to_wire(&geometry), raw);
//! ```

pub mod audit;
pub mod geometry;
pub mod loi;
pub mod submission;
pub mod survey;
pub mod timestamp;
pub mod value;

pub use audit::{audit_info_from_wire, audit_info_to_wire, audit_pair};
pub use geometry::{
    DEFAULT_COORDINATE_PRECISION, GeometryEncoder, geometry_from_map, geometry_from_wire,
    geometry_to_wire,
};
pub use loi::{loi_from_document, loi_to_wire};
pub use submission::{
    DecodedSubmission, SkippedField, decode_submission, submission_from_document,
    submission_to_wire,
};
pub use survey::{job_from_wire, job_to_wire, survey_from_document, survey_to_wire};
pub use timestamp::{timestamp_from_wire, timestamp_to_wire};
pub use value::{parse_capture_location, parse_value, value_to_wire};
