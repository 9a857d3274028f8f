//! Submission document conversion
//!
//! Each response field is decoded independently. A malformed field is logged
//! and left out of [`SubmissionData`]; the rest of the submission survives.
//! Only structural problems (owner mismatch, a response to a task of
//! unrecognized type) abort the document.

use serde_json::{Map, Value as JsonValue, json};
use tracing::{debug, warn};

use fieldkit_core::{
    DocumentError, FieldError, LocationOfInterest, RemoteDocument, Submission, SubmissionData,
    Survey, TaskType, Value,
};

use crate::audit::{CREATED, LAST_MODIFIED, audit_info_to_wire, audit_pair};
use crate::geometry::GeometryEncoder;
use crate::value::{parse_value, value_to_wire};

pub const LOI_ID: &str = "loiId";
pub const JOB_ID: &str = "jobId";
pub const DATA: &str = "data";
/// Older clients wrote responses under this key
const RESPONSES: &str = "responses";

/// A response field that was dropped during decode
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedField {
    pub task_id: String,
    pub error: FieldError,
}

/// A decoded submission plus the fields that could not be read
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSubmission {
    pub submission: Submission,
    pub skipped: Vec<SkippedField>,
}

enum FieldOutcome {
    Decoded(String, Value),
    Empty,
    Skipped(SkippedField),
}

fn check_owner(
    doc: &RemoteDocument,
    field: &'static str,
    expected: &str,
    required: bool,
) -> Result<(), DocumentError> {
    match doc.get_str(field) {
        Some(found) if found == expected => Ok(()),
        Some(found) => Err(DocumentError::OwnerMismatch {
            doc_id: doc.id.clone(),
            expected: expected.to_string(),
            found: found.to_string(),
        }),
        None if required => Err(DocumentError::missing(&doc.id, field)),
        None => Ok(()),
    }
}

/// Decode a submission document for `loi`, reporting skipped fields
pub fn decode_submission(
    survey: &Survey,
    loi: &LocationOfInterest,
    doc: &RemoteDocument,
) -> Result<DecodedSubmission, DocumentError> {
    check_owner(doc, LOI_ID, &loi.id, true)?;
    check_owner(doc, JOB_ID, &loi.job_id, false)?;

    let job = survey.job(&loi.job_id).ok_or_else(|| DocumentError::UnknownJob {
        doc_id: doc.id.clone(),
        job_id: loi.job_id.clone(),
    })?;

    let empty = Map::new();
    let responses = match doc.get(DATA).or_else(|| doc.get(RESPONSES)) {
        None => &empty,
        Some(JsonValue::Object(map)) => map,
        Some(_) => return Err(DocumentError::invalid(&doc.id, DATA, "expected a map")),
    };

    let outcomes = responses
        .iter()
        .map(|(task_id, raw)| {
            let Some(task) = job.task(task_id) else {
                return Ok(FieldOutcome::Skipped(SkippedField {
                    task_id: task_id.clone(),
                    error: FieldError::UnknownTask(task_id.clone()),
                }));
            };
            if let TaskType::Unknown(type_name) = &task.task_type {
                return Err(DocumentError::UnknownTaskType {
                    task_id: task_id.clone(),
                    type_name: type_name.clone(),
                });
            }
            if raw.is_null() {
                return Ok(FieldOutcome::Empty);
            }
            Ok(match parse_value(task, raw) {
                Ok(Some(value)) => FieldOutcome::Decoded(task_id.clone(), value),
                Ok(None) => FieldOutcome::Empty,
                Err(error) => FieldOutcome::Skipped(SkippedField {
                    task_id: task_id.clone(),
                    error,
                }),
            })
        })
        .collect::<Result<Vec<_>, DocumentError>>()?;

    let (data, skipped) = outcomes.into_iter().fold(
        (SubmissionData::new(), Vec::new()),
        |(mut data, mut skipped), outcome| {
            match outcome {
                FieldOutcome::Decoded(task_id, value) => {
                    data.insert(task_id, value);
                }
                FieldOutcome::Empty => {}
                FieldOutcome::Skipped(field) => skipped.push(field),
            }
            (data, skipped)
        },
    );

    for field in &skipped {
        warn!(
            submission_id = %doc.id,
            task_id = %field.task_id,
            error = %field.error,
            "Skipping malformed response field"
        );
    }

    let (created, last_modified) = audit_pair(doc);
    debug!(submission_id = %doc.id, fields = data.len(), skipped = skipped.len(), "Decoded submission");

    Ok(DecodedSubmission {
        submission: Submission {
            id: doc.id.clone(),
            survey_id: survey.id.clone(),
            loi_id: loi.id.clone(),
            job_id: loi.job_id.clone(),
            created,
            last_modified,
            data,
        },
        skipped,
    })
}

/// Decode a submission, discarding the skipped-field report
pub fn submission_from_document(
    survey: &Survey,
    loi: &LocationOfInterest,
    doc: &RemoteDocument,
) -> Result<Submission, DocumentError> {
    decode_submission(survey, loi, doc).map(|decoded| decoded.submission)
}

pub fn submission_to_wire(submission: &Submission, encoder: &GeometryEncoder) -> JsonValue {
    let data: Map<String, JsonValue> = submission
        .data
        .iter()
        .map(|(task_id, value)| (task_id.clone(), value_to_wire(value, encoder)))
        .collect();
    json!({
        LOI_ID: submission.loi_id,
        JOB_ID: submission.job_id,
        CREATED: audit_info_to_wire(&submission.created),
        LAST_MODIFIED: audit_info_to_wire(&submission.last_modified),
        DATA: data,
    })
}
