//! Pending local edits and their upload state machine
//!
//! A mutation moves `Pending -> InFlight -> {Complete | Pending (retry + 1) | Failed}`.
//! The transitions live here; scheduling them is left to the uploader.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MutationError;

/// The kind of entity a mutation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum TargetKind {
    #[display("location_of_interest")]
    LocationOfInterest,
    #[display("submission")]
    Submission,
}

/// What the mutation does to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum MutationType {
    #[display("create")]
    Create,
    #[display("update")]
    Update,
    #[display("delete")]
    Delete,
}

/// Upload progress of a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum SyncState {
    #[display("pending")]
    Pending,
    #[display("in_flight")]
    InFlight,
    #[display("complete")]
    Complete,
    /// Terminal; never retried automatically
    #[display("failed")]
    Failed,
}

/// A recorded local create/update/delete awaiting remote confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub id: String,
    /// Enqueue order, assigned by the mutation queue
    pub sequence: u64,
    pub survey_id: String,
    pub target_kind: TargetKind,
    pub target_id: String,
    /// The LOI the target belongs to (the target itself for LOI mutations)
    pub loi_id: String,
    pub job_id: String,
    pub mutation_type: MutationType,
    /// Wire document to write
    pub payload: serde_json::Value,
    pub user_id: String,
    pub client_timestamp: DateTime<Utc>,
    pub sync_state: SyncState,
    /// Failed upload attempts so far
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl Mutation {
    /// Create a pending mutation with a fresh id
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        survey_id: impl Into<String>,
        target_kind: TargetKind,
        target_id: impl Into<String>,
        loi_id: impl Into<String>,
        job_id: impl Into<String>,
        mutation_type: MutationType,
        payload: serde_json::Value,
        user_id: impl Into<String>,
        client_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sequence: 0,
            survey_id: survey_id.into(),
            target_kind,
            target_id: target_id.into(),
            loi_id: loi_id.into(),
            job_id: job_id.into(),
            mutation_type,
            payload,
            user_id: user_id.into(),
            client_timestamp,
            sync_state: SyncState::Pending,
            retry_count: 0,
            last_error: None,
        }
    }

    fn transition(&mut self, from: SyncState, to: SyncState) -> Result<(), MutationError> {
        if self.sync_state != from {
            return Err(MutationError::InvalidTransition {
                mutation_id: self.id.clone(),
                from: self.sync_state,
                to,
            });
        }
        self.sync_state = to;
        Ok(())
    }

    /// Pending -> InFlight
    pub fn begin_upload(&mut self) -> Result<(), MutationError> {
        self.transition(SyncState::Pending, SyncState::InFlight)
    }

    /// InFlight -> Complete
    pub fn complete(&mut self) -> Result<(), MutationError> {
        self.transition(SyncState::InFlight, SyncState::Complete)?;
        self.last_error = None;
        Ok(())
    }

    /// InFlight -> Pending, or Failed once `max_attempts` failures accumulate
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        max_attempts: u32,
    ) -> Result<SyncState, MutationError> {
        let next = if self.retry_count + 1 >= max_attempts {
            SyncState::Failed
        } else {
            SyncState::Pending
        };
        self.transition(SyncState::InFlight, next)?;
        self.retry_count += 1;
        self.last_error = Some(error.into());
        Ok(next)
    }

    /// InFlight -> Failed regardless of the retry bound
    pub fn fail_permanently(&mut self, error: impl Into<String>) -> Result<(), MutationError> {
        self.transition(SyncState::InFlight, SyncState::Failed)?;
        self.retry_count += 1;
        self.last_error = Some(error.into());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.sync_state, SyncState::Complete | SyncState::Failed)
    }
}
