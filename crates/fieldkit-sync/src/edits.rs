//! Locally originated edits
//!
//! Each edit is validated against the survey definition, applied to the local
//! store, and recorded as a [`Mutation`] carrying the wire document to upload.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, instrument};
use uuid::Uuid;

use fieldkit_convert::{GeometryEncoder, loi_to_wire, submission_to_wire};
use fieldkit_core::{
    AuditInfo, Clock, Geometry, Job, LocalStore, LocationOfInterest, Mutation, MutationType,
    Submission, SubmissionData, Survey, TargetKind, UserContext,
};
use fieldkit_storage::MutationQueue;

use crate::error::{SyncError, SyncResult};

/// A new LOI drawn by the data collector
#[derive(Debug, Clone, PartialEq)]
pub struct LoiDraft {
    pub job_id: String,
    pub geometry: Geometry,
    pub custom_id: Option<String>,
    pub caption: Option<String>,
}

impl LoiDraft {
    pub fn new(job_id: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            job_id: job_id.into(),
            geometry,
            custom_id: None,
            caption: None,
        }
    }

    pub fn with_custom_id(mut self, custom_id: impl Into<String>) -> Self {
        self.custom_id = Some(custom_id.into());
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

/// Applies offline edits and queues them for upload
pub struct LocalEdits<L> {
    local: Arc<L>,
    queue: Arc<MutationQueue>,
    clock: Arc<dyn Clock>,
    user: Arc<dyn UserContext>,
    encoder: GeometryEncoder,
}

impl<L: LocalStore> LocalEdits<L> {
    pub fn new(
        local: Arc<L>,
        queue: Arc<MutationQueue>,
        clock: Arc<dyn Clock>,
        user: Arc<dyn UserContext>,
        encoder: GeometryEncoder,
    ) -> Self {
        Self {
            local,
            queue,
            clock,
            user,
            encoder,
        }
    }

    fn stamp(&self) -> AuditInfo {
        AuditInfo::new(self.user.current_user(), self.clock.now_utc())
    }

    async fn survey(&self, survey_id: &str) -> SyncResult<Survey> {
        self.local
            .get_survey(survey_id)
            .await?
            .ok_or_else(|| SyncError::SurveyNotSynced(survey_id.to_string()))
    }

    async fn loi(&self, survey_id: &str, loi_id: &str) -> SyncResult<LocationOfInterest> {
        self.local
            .get_offline_loi(survey_id, loi_id)
            .await?
            .ok_or_else(|| SyncError::LoiNotFound {
                survey_id: survey_id.to_string(),
                loi_id: loi_id.to_string(),
            })
    }

    async fn submission(&self, survey_id: &str, submission_id: &str) -> SyncResult<Submission> {
        self.local
            .get_submission(survey_id, submission_id)
            .await?
            .ok_or_else(|| SyncError::SubmissionNotFound {
                survey_id: survey_id.to_string(),
                submission_id: submission_id.to_string(),
            })
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        survey_id: &str,
        target_kind: TargetKind,
        target_id: &str,
        loi_id: &str,
        job_id: &str,
        mutation_type: MutationType,
        payload: JsonValue,
        audit: &AuditInfo,
    ) -> SyncResult<Mutation> {
        Ok(self.queue.enqueue(Mutation::new(
            survey_id,
            target_kind,
            target_id,
            loi_id,
            job_id,
            mutation_type,
            payload,
            audit.user.id.clone(),
            audit.client_timestamp,
        ))?)
    }

    /// Add an LOI to a job that permits data-collector-defined LOIs
    #[instrument(skip(self, draft), fields(job_id = %draft.job_id))]
    pub async fn create_loi(
        &self,
        survey_id: &str,
        draft: LoiDraft,
    ) -> SyncResult<LocationOfInterest> {
        let survey = self.survey(survey_id).await?;
        let job = require_job(&survey, &draft.job_id)?;
        if !job.allows_ad_hoc_lois() {
            return Err(SyncError::AdHocLoiNotAllowed(job.id.clone()));
        }

        let audit = self.stamp();
        let loi = LocationOfInterest {
            id: Uuid::new_v4().to_string(),
            survey_id: survey_id.to_string(),
            job_id: draft.job_id,
            geometry: draft.geometry,
            custom_id: draft.custom_id,
            caption: draft.caption,
            created: audit.clone(),
            last_modified: audit.clone(),
        };
        self.local.put_loi(loi.clone()).await?;
        let mutation = self.record(
            survey_id,
            TargetKind::LocationOfInterest,
            &loi.id,
            &loi.id,
            &loi.job_id,
            MutationType::Create,
            loi_to_wire(&loi, &self.encoder),
            &audit,
        )?;
        debug!(loi_id = %loi.id, mutation_id = %mutation.id, "Created LOI");
        Ok(loi)
    }

    /// Replace an LOI's geometry and labels; `created` is kept
    #[instrument(skip(self, loi), fields(loi_id = %loi.id))]
    pub async fn update_loi(&self, loi: LocationOfInterest) -> SyncResult<LocationOfInterest> {
        let survey = self.survey(&loi.survey_id).await?;
        let existing = self.loi(&loi.survey_id, &loi.id).await?;
        require_job(&survey, &existing.job_id)?;

        let audit = self.stamp();
        let updated = LocationOfInterest {
            job_id: existing.job_id,
            created: existing.created,
            last_modified: audit.clone(),
            ..loi
        };
        self.local.put_loi(updated.clone()).await?;
        self.record(
            &updated.survey_id,
            TargetKind::LocationOfInterest,
            &updated.id,
            &updated.id,
            &updated.job_id,
            MutationType::Update,
            loi_to_wire(&updated, &self.encoder),
            &audit,
        )?;
        Ok(updated)
    }

    /// Delete an LOI and its submissions locally
    ///
    /// Queued edits of those submissions are dropped with them; the remote
    /// delete of the LOI covers its submissions. The mutation payload is the
    /// LOI as it was, so pending deletes can still be shown next to their
    /// entity.
    #[instrument(skip(self))]
    pub async fn delete_loi(&self, survey_id: &str, loi_id: &str) -> SyncResult<Mutation> {
        let existing = self.loi(survey_id, loi_id).await?;
        let audit = self.stamp();
        self.local.delete_loi(survey_id, loi_id).await?;
        let dropped = self.queue.discard_loi_submissions(survey_id, loi_id)?;
        let mutation = self.record(
            survey_id,
            TargetKind::LocationOfInterest,
            loi_id,
            loi_id,
            &existing.job_id,
            MutationType::Delete,
            loi_to_wire(&existing, &self.encoder),
            &audit,
        )?;
        debug!(mutation_id = %mutation.id, dropped = dropped.len(), "Deleted LOI");
        Ok(mutation)
    }

    /// Record a new submission for an LOI
    #[instrument(skip(self, data))]
    pub async fn create_submission(
        &self,
        survey_id: &str,
        loi_id: &str,
        data: SubmissionData,
    ) -> SyncResult<Submission> {
        let survey = self.survey(survey_id).await?;
        let loi = self.loi(survey_id, loi_id).await?;
        validate_data(require_job(&survey, &loi.job_id)?, &data)?;

        let audit = self.stamp();
        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            survey_id: survey_id.to_string(),
            loi_id: loi.id.clone(),
            job_id: loi.job_id.clone(),
            created: audit.clone(),
            last_modified: audit.clone(),
            data,
        };
        self.local.put_submission(submission.clone()).await?;
        let mutation = self.record(
            survey_id,
            TargetKind::Submission,
            &submission.id,
            &loi.id,
            &loi.job_id,
            MutationType::Create,
            submission_to_wire(&submission, &self.encoder),
            &audit,
        )?;
        debug!(submission_id = %submission.id, mutation_id = %mutation.id, "Created submission");
        Ok(submission)
    }

    /// Replace a submission's responses
    #[instrument(skip(self, data))]
    pub async fn update_submission(
        &self,
        survey_id: &str,
        submission_id: &str,
        data: SubmissionData,
    ) -> SyncResult<Submission> {
        let survey = self.survey(survey_id).await?;
        let existing = self.submission(survey_id, submission_id).await?;
        validate_data(require_job(&survey, &existing.job_id)?, &data)?;

        let audit = self.stamp();
        let updated = Submission {
            data,
            last_modified: audit.clone(),
            ..existing
        };
        self.local.put_submission(updated.clone()).await?;
        self.record(
            survey_id,
            TargetKind::Submission,
            &updated.id,
            &updated.loi_id,
            &updated.job_id,
            MutationType::Update,
            submission_to_wire(&updated, &self.encoder),
            &audit,
        )?;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_submission(
        &self,
        survey_id: &str,
        submission_id: &str,
    ) -> SyncResult<Mutation> {
        let existing = self.submission(survey_id, submission_id).await?;
        let audit = self.stamp();
        self.local.delete_submission(survey_id, submission_id).await?;
        self.record(
            survey_id,
            TargetKind::Submission,
            submission_id,
            &existing.loi_id,
            &existing.job_id,
            MutationType::Delete,
            submission_to_wire(&existing, &self.encoder),
            &audit,
        )
    }
}

fn require_job<'a>(survey: &'a Survey, job_id: &str) -> SyncResult<&'a Job> {
    survey.job(job_id).ok_or_else(|| SyncError::JobNotFound {
        survey_id: survey.id.clone(),
        job_id: job_id.to_string(),
    })
}

/// Every value must belong to a task of the job and fit its type
fn validate_data(job: &Job, data: &SubmissionData) -> SyncResult<()> {
    for (task_id, value) in data.iter() {
        let task = job.task(task_id).ok_or_else(|| SyncError::UnknownTask {
            job_id: job.id.clone(),
            task_id: task_id.clone(),
        })?;
        if !value.is_compatible_with(&task.task_type) {
            return Err(SyncError::ValueTypeMismatch {
                task_id: task_id.clone(),
                task_type: task.task_type.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use fieldkit_core::fake::{FixedClock, StaticUser};
    use fieldkit_core::{DataCollectionStrategy, Point, SyncState, Task, TaskType, User, Value};
    use fieldkit_storage::InMemoryLocalStore;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    async fn setup(strategy: DataCollectionStrategy) -> (Arc<InMemoryLocalStore>, Arc<MutationQueue>, LocalEdits<InMemoryLocalStore>) {
        let local = Arc::new(InMemoryLocalStore::new());
        local
            .put_survey(
                Survey::new("s1", "Survey").with_job(
                    Job::new("j1", "Job")
                        .with_strategy(strategy)
                        .with_task(Task::new("name", TaskType::Text))
                        .with_task(Task::new("pin", TaskType::DropPin)),
                ),
            )
            .await
            .unwrap();
        let queue = Arc::new(MutationQueue::new());
        let edits = LocalEdits::new(
            Arc::clone(&local),
            Arc::clone(&queue),
            Arc::new(FixedClock(now())),
            Arc::new(StaticUser(User::new("u1", "u1@example.com", "Una"))),
            GeometryEncoder::default(),
        );
        (local, queue, edits)
    }

    fn pin() -> Geometry {
        Geometry::Point(Point::new(-89.6, 41.9))
    }

    #[tokio::test]
    async fn test_create_loi_stamps_and_enqueues() {
        let (local, queue, edits) = setup(DataCollectionStrategy::AdHoc).await;
        let loi = edits
            .create_loi("s1", LoiDraft::new("j1", pin()).with_caption("Gate"))
            .await
            .unwrap();

        assert_eq!(loi.created.user.id, "u1");
        assert_eq!(loi.created.client_timestamp, now());
        assert!(local.get_offline_loi("s1", &loi.id).await.unwrap().is_some());

        let mutations = queue.survey_mutations("s1");
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].mutation_type, MutationType::Create);
        assert_eq!(mutations[0].sync_state, SyncState::Pending);
        assert_eq!(mutations[0].payload["caption"], "Gate");
        assert_eq!(mutations[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_predefined_job_rejects_new_lois() {
        let (_local, queue, edits) = setup(DataCollectionStrategy::Predefined).await;
        let err = edits.create_loi("s1", LoiDraft::new("j1", pin())).await.unwrap_err();
        assert!(matches!(err, SyncError::AdHocLoiNotAllowed(_)));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_submission_value_validation() {
        let (_local, queue, edits) = setup(DataCollectionStrategy::Mixed).await;
        let loi = edits.create_loi("s1", LoiDraft::new("j1", pin())).await.unwrap();

        let bad: SubmissionData = [("pin".to_string(), Value::Text("here".into()))]
            .into_iter()
            .collect();
        assert!(matches!(
            edits.create_submission("s1", &loi.id, bad).await,
            Err(SyncError::ValueTypeMismatch { .. })
        ));

        let unknown: SubmissionData = [("ghost".to_string(), Value::Number(1.0))]
            .into_iter()
            .collect();
        assert!(matches!(
            edits.create_submission("s1", &loi.id, unknown).await,
            Err(SyncError::UnknownTask { .. })
        ));

        let good: SubmissionData = [
            ("name".to_string(), Value::Text("Oak".into())),
            ("pin".to_string(), Value::Geometry(pin())),
        ]
        .into_iter()
        .collect();
        let submission = edits.create_submission("s1", &loi.id, good).await.unwrap();
        assert_eq!(submission.job_id, "j1");
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_update_keeps_created() {
        let (_local, _queue, edits) = setup(DataCollectionStrategy::AdHoc).await;
        let loi = edits.create_loi("s1", LoiDraft::new("j1", pin())).await.unwrap();

        let moved = LocationOfInterest {
            geometry: Geometry::Point(Point::new(0.0, 0.0)),
            ..loi.clone()
        };
        let updated = edits.update_loi(moved).await.unwrap();
        assert_eq!(updated.created, loi.created);
        assert_eq!(updated.geometry, Geometry::Point(Point::new(0.0, 0.0)));
    }

    #[tokio::test]
    async fn test_delete_loi_payload_is_snapshot() {
        let (local, _queue, edits) = setup(DataCollectionStrategy::AdHoc).await;
        let loi = edits.create_loi("s1", LoiDraft::new("j1", pin())).await.unwrap();

        let mutation = edits.delete_loi("s1", &loi.id).await.unwrap();
        assert_eq!(mutation.mutation_type, MutationType::Delete);
        assert_eq!(mutation.payload["jobId"], "j1");
        assert!(local.get_offline_loi("s1", &loi.id).await.unwrap().is_none());

        assert!(matches!(
            edits.delete_loi("s1", &loi.id).await,
            Err(SyncError::LoiNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_loi_drops_queued_submission_edits() {
        let (local, queue, edits) = setup(DataCollectionStrategy::AdHoc).await;
        let loi = edits.create_loi("s1", LoiDraft::new("j1", pin())).await.unwrap();
        let other = edits.create_loi("s1", LoiDraft::new("j1", pin())).await.unwrap();
        let data: SubmissionData = [("name".to_string(), Value::Text("Elm".into()))]
            .into_iter()
            .collect();
        let submission = edits.create_submission("s1", &loi.id, data.clone()).await.unwrap();
        edits
            .update_submission("s1", &submission.id, data.clone())
            .await
            .unwrap();
        let kept = edits.create_submission("s1", &other.id, data).await.unwrap();

        edits.delete_loi("s1", &loi.id).await.unwrap();

        assert!(local.get_submission("s1", &submission.id).await.unwrap().is_none());
        let left: Vec<_> = queue
            .survey_mutations("s1")
            .into_iter()
            .map(|m| (m.target_id, m.mutation_type))
            .collect();
        assert_eq!(
            left,
            vec![
                (loi.id.clone(), MutationType::Create),
                (other.id.clone(), MutationType::Create),
                (kept.id.clone(), MutationType::Create),
                (loi.id.clone(), MutationType::Delete),
            ]
        );
    }
}
