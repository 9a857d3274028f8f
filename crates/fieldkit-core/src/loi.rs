//! Locations of interest

use serde::{Deserialize, Serialize};

use crate::audit::AuditInfo;
use crate::geometry::Geometry;

/// A geo-referenced feature within a survey
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationOfInterest {
    pub id: String,
    pub survey_id: String,
    /// Always resolves to a job of `survey_id`
    pub job_id: String,
    pub geometry: Geometry,
    pub custom_id: Option<String>,
    pub caption: Option<String>,
    pub created: AuditInfo,
    pub last_modified: AuditInfo,
}
