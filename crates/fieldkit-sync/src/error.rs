//! Error types for fieldkit-sync

use thiserror::Error;

use fieldkit_core::{
    DocumentError, MutationError, RemoteError, StorageError, TargetKind, TaskType,
};

/// Errors raised by sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Survey {0} is not available offline")]
    SurveyNotSynced(String),

    /// A queued mutation points at an entity missing from local storage
    #[error("Mutation {mutation_id} references missing {target_kind} {target_id}")]
    StaleReference {
        mutation_id: String,
        target_kind: TargetKind,
        target_id: String,
    },

    #[error("Sync of survey {0} was cancelled")]
    Cancelled(String),

    #[error("Job {job_id} not found in survey {survey_id}")]
    JobNotFound { survey_id: String, job_id: String },

    #[error("Job {0} does not allow data collectors to add LOIs")]
    AdHocLoiNotAllowed(String),

    #[error("Value for task {task_id} does not fit task type {task_type}")]
    ValueTypeMismatch { task_id: String, task_type: TaskType },

    #[error("Job {job_id} has no task {task_id}")]
    UnknownTask { job_id: String, task_id: String },

    #[error("LOI {loi_id} not found in survey {survey_id}")]
    LoiNotFound { survey_id: String, loi_id: String },

    #[error("Submission {submission_id} not found in survey {survey_id}")]
    SubmissionNotFound {
        survey_id: String,
        submission_id: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Mutation(#[from] MutationError),
}

impl SyncError {
    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Remote(e) if e.is_transient())
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
