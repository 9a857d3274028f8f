//! Location-of-interest document conversion

use serde_json::{Map, Value as JsonValue, json};

use fieldkit_core::{DocumentError, LocationOfInterest, RemoteDocument, Survey};

use crate::audit::{CREATED, LAST_MODIFIED, audit_info_to_wire, audit_pair};
use crate::geometry::{GeometryEncoder, geometry_from_wire};

pub const JOB_ID: &str = "jobId";
pub const GEOMETRY: &str = "geometry";
const CUSTOM_ID: &str = "customId";
const CAPTION: &str = "caption";

/// Decode an LOI document belonging to `survey`
///
/// Geometry is checked before the job reference, so an LOI with unsupported
/// geometry reports that even when its job is also unknown.
pub fn loi_from_document(
    survey: &Survey,
    doc: &RemoteDocument,
) -> Result<LocationOfInterest, DocumentError> {
    let raw_geometry = doc
        .get(GEOMETRY)
        .ok_or_else(|| DocumentError::missing(&doc.id, GEOMETRY))?;
    let geometry = geometry_from_wire(raw_geometry).map_err(|source| DocumentError::Geometry {
        doc_id: doc.id.clone(),
        source,
    })?;

    let job_id = doc
        .get_str(JOB_ID)
        .ok_or_else(|| DocumentError::missing(&doc.id, JOB_ID))?;
    if survey.job(job_id).is_none() {
        return Err(DocumentError::UnknownJob {
            doc_id: doc.id.clone(),
            job_id: job_id.to_string(),
        });
    }

    let (created, last_modified) = audit_pair(doc);
    Ok(LocationOfInterest {
        id: doc.id.clone(),
        survey_id: survey.id.clone(),
        job_id: job_id.to_string(),
        geometry,
        custom_id: doc.get_str(CUSTOM_ID).map(str::to_string),
        caption: doc.get_str(CAPTION).map(str::to_string),
        created,
        last_modified,
    })
}

pub fn loi_to_wire(loi: &LocationOfInterest, encoder: &GeometryEncoder) -> JsonValue {
    let mut map = Map::new();
    map.insert(JOB_ID.to_string(), json!(loi.job_id));
    map.insert(GEOMETRY.to_string(), encoder.encode(&loi.geometry));
    map.insert(CREATED.to_string(), audit_info_to_wire(&loi.created));
    map.insert(LAST_MODIFIED.to_string(), audit_info_to_wire(&loi.last_modified));
    if let Some(custom_id) = &loi.custom_id {
        map.insert(CUSTOM_ID.to_string(), json!(custom_id));
    }
    if let Some(caption) = &loi.caption {
        map.insert(CAPTION.to_string(), json!(caption));
    }
    JsonValue::Object(map)
}
