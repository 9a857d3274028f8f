//! Capability traits consumed by the sync layer
//!
//! - [`RemoteStore`]: the remote document store
//! - [`LocalStore`]: the on-device store
//! - [`Clock`] and [`UserContext`]: stamping audit info on local edits

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::User;
use crate::document::RemoteDocument;
use crate::error::{RemoteError, StorageError};
use crate::loi::LocationOfInterest;
use crate::mutation::Mutation;
use crate::submission::Submission;
use crate::survey::Survey;

/// The remote document store
///
/// Implementations must report a missing entity as [`RemoteError::NotFound`]
/// and reserve [`RemoteError::Transport`] for "could not check".
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a survey document, including its embedded job map
    async fn fetch_survey(&self, survey_id: &str) -> Result<RemoteDocument, RemoteError>;

    /// Fetch a single job document of a survey
    async fn fetch_job(&self, survey_id: &str, job_id: &str) -> Result<RemoteDocument, RemoteError>;

    /// Fetch all LOI documents of a survey
    async fn fetch_lois(&self, survey_id: &str) -> Result<Vec<RemoteDocument>, RemoteError>;

    /// Fetch all submission documents of an LOI
    async fn fetch_submissions(
        &self,
        survey_id: &str,
        loi_id: &str,
    ) -> Result<Vec<RemoteDocument>, RemoteError>;

    /// Apply a mutation remotely
    async fn write_mutation(&self, mutation: &Mutation) -> Result<(), RemoteError>;
}

/// The on-device store, keyed per entity kind
///
/// Every method is a single atomic operation. `delete_survey` also removes the
/// survey's LOIs and submissions.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get_survey(&self, survey_id: &str) -> Result<Option<Survey>, StorageError>;

    async fn put_survey(&self, survey: Survey) -> Result<(), StorageError>;

    async fn delete_survey(&self, survey_id: &str) -> Result<(), StorageError>;

    async fn surveys(&self) -> Result<Vec<Survey>, StorageError>;

    /// Look up an LOI without consulting the remote
    async fn get_offline_loi(
        &self,
        survey_id: &str,
        loi_id: &str,
    ) -> Result<Option<LocationOfInterest>, StorageError>;

    async fn put_loi(&self, loi: LocationOfInterest) -> Result<(), StorageError>;

    async fn delete_loi(&self, survey_id: &str, loi_id: &str) -> Result<(), StorageError>;

    async fn lois(&self, survey_id: &str) -> Result<Vec<LocationOfInterest>, StorageError>;

    async fn get_submission(
        &self,
        survey_id: &str,
        submission_id: &str,
    ) -> Result<Option<Submission>, StorageError>;

    async fn put_submission(&self, submission: Submission) -> Result<(), StorageError>;

    async fn delete_submission(
        &self,
        survey_id: &str,
        submission_id: &str,
    ) -> Result<(), StorageError>;

    async fn submissions(
        &self,
        survey_id: &str,
        loi_id: &str,
    ) -> Result<Vec<Submission>, StorageError>;
}

/// Time abstraction for testability
pub trait Clock: Send + Sync {
    /// Get the current UTC datetime
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real clock implementation using system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Supplies the identity of the user making local edits
pub trait UserContext: Send + Sync {
    fn current_user(&self) -> User;
}
