//! Survey lifecycle: sync, activation and removal
//!
//! Per survey id the manager tracks `NotLoaded -> Syncing -> Synced -> Active
//! -> Removed`. The active survey lives in a single `watch` slot; every write
//! to it goes through `send_if_modified`, so replacing one active survey with
//! another is one step and observers never see an intermediate "none".
//!
//! A sync fetches and decodes everything first and only then writes locally.
//! The write phase runs on its own task, so abandoning a sync (cancel signal
//! or dropping the future) either happens before any local write or not at
//! all.

use std::sync::Arc;

use dashmap::DashMap;
use derive_more::Display;
use futures::Stream;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use fieldkit_convert::{decode_submission, job_from_wire, loi_from_document, survey_from_document};
use fieldkit_core::{
    DocumentError, Job, LocalStore, LocationOfInterest, RemoteError, RemoteStore, Survey,
    TargetKind,
};
use fieldkit_storage::MutationQueue;

use crate::cancel::unless_cancelled;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// The shared active-survey value; `None` when no survey is active
pub type ActiveSurvey = Option<Arc<Survey>>;

/// Where a survey is in its offline lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SurveyState {
    #[display("not_loaded")]
    NotLoaded,
    #[display("syncing")]
    Syncing,
    #[display("synced")]
    Synced,
    #[display("active")]
    Active,
    #[display("removed")]
    Removed,
}

/// A document that could not be decoded during a sync
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedDocument {
    pub doc_id: String,
    pub error: DocumentError,
}

/// Outcome of pulling a batch of LOI or submission documents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSyncReport {
    /// Documents written locally
    pub stored: usize,
    /// Ids left untouched because they have unsent local edits
    pub preserved: Vec<String>,
    pub rejected: Vec<RejectedDocument>,
    /// Response fields dropped while decoding submissions
    pub skipped_fields: usize,
}

/// Result of a successful `load_and_sync`
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedSurvey {
    pub survey: Survey,
    /// Empty when LOI sync on load is disabled
    pub lois: DocumentSyncReport,
}

/// An offline survey as listed to the user
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSurvey {
    pub survey: Survey,
    pub is_active: bool,
}

type StateMap = Arc<DashMap<String, SurveyState>>;

/// Restores a survey's previous state unless disarmed
struct SyncingGuard {
    states: StateMap,
    survey_id: String,
    previous: Option<SurveyState>,
    armed: bool,
}

impl SyncingGuard {
    fn disarm(mut self) -> Option<SurveyState> {
        self.armed = false;
        self.previous
    }
}

impl Drop for SyncingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.previous {
            Some(state) => {
                self.states.insert(self.survey_id.clone(), state);
            }
            None => {
                self.states.remove(&self.survey_id);
            }
        }
    }
}

struct FetchedSurvey {
    survey: Survey,
    lois: Option<FetchedLois>,
}

struct FetchedLois {
    decoded: Vec<LocationOfInterest>,
    rejected: Vec<RejectedDocument>,
}

/// Owns the survey lifecycle and the single active-survey slot
pub struct SurveyLifecycleManager<R, L> {
    remote: Arc<R>,
    local: Arc<L>,
    queue: Arc<MutationQueue>,
    config: SyncConfig,
    active: Arc<watch::Sender<ActiveSurvey>>,
    /// Active is derived from the slot and never stored here
    states: StateMap,
}

impl<R, L> SurveyLifecycleManager<R, L>
where
    R: RemoteStore,
    L: LocalStore + 'static,
{
    pub fn new(
        remote: Arc<R>,
        local: Arc<L>,
        queue: Arc<MutationQueue>,
        config: SyncConfig,
    ) -> Self {
        let (active, _) = watch::channel(None);
        Self {
            remote,
            local,
            queue,
            config,
            active: Arc::new(active),
            states: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn active_id(&self) -> Option<String> {
        self.active.borrow().as_ref().map(|survey| survey.id.clone())
    }

    /// Current lifecycle state of a survey
    pub fn state(&self, survey_id: &str) -> SurveyState {
        if self.active_id().as_deref() == Some(survey_id) {
            return SurveyState::Active;
        }
        self.states
            .get(survey_id)
            .map(|state| *state)
            .unwrap_or(SurveyState::NotLoaded)
    }

    /// The currently active survey
    pub fn active_survey(&self) -> ActiveSurvey {
        self.active.borrow().clone()
    }

    /// A receiver holding the current active survey and notified on change
    pub fn subscribe(&self) -> watch::Receiver<ActiveSurvey> {
        self.active.subscribe()
    }

    /// Stream of the active survey: the current value first, then each change
    pub fn active_survey_updates(&self) -> impl Stream<Item = ActiveSurvey> + Send + 'static {
        let mut rx = self.subscribe();
        async_stream::stream! {
            let current = rx.borrow_and_update().clone();
            yield current;
            while rx.changed().await.is_ok() {
                let next = rx.borrow_and_update().clone();
                yield next;
            }
        }
    }

    /// Fetch a survey and store it locally without activating it
    ///
    /// Returns `Ok(None)` when the remote has no such survey; nothing is
    /// written in that case. Transport failures propagate.
    pub async fn load_and_sync(&self, survey_id: &str) -> SyncResult<Option<SyncedSurvey>> {
        // The sender is dropped at once, so this never fires
        let (_, mut never) = watch::channel(false);
        self.sync(survey_id, &mut never).await
    }

    /// Like [`load_and_sync`](Self::load_and_sync), abandoned when `cancel`
    /// becomes `true` before the local write starts
    pub async fn load_and_sync_cancellable(
        &self,
        survey_id: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> SyncResult<Option<SyncedSurvey>> {
        self.sync(survey_id, &mut cancel).await
    }

    #[instrument(skip(self, cancel), fields(survey_id = %survey_id))]
    async fn sync(
        &self,
        survey_id: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> SyncResult<Option<SyncedSurvey>> {
        let guard = SyncingGuard {
            states: Arc::clone(&self.states),
            survey_id: survey_id.to_string(),
            previous: self.states.insert(survey_id.to_string(), SurveyState::Syncing),
            armed: true,
        };

        let fetched = match unless_cancelled(cancel, self.fetch(survey_id)).await {
            None => {
                info!("Sync cancelled before fetch completed");
                return Err(SyncError::Cancelled(survey_id.to_string()));
            }
            Some(result) => result?,
        };
        let Some(fetched) = fetched else {
            return Ok(None);
        };
        if *cancel.borrow() {
            info!("Sync cancelled before local write");
            return Err(SyncError::Cancelled(survey_id.to_string()));
        }

        let previous = guard.disarm();
        let commit = tokio::spawn(commit_sync(
            Arc::clone(&self.local),
            Arc::clone(&self.queue),
            Arc::clone(&self.active),
            Arc::clone(&self.states),
            previous,
            fetched,
        ));
        let synced = commit.await.map_err(|e| SyncError::Task(e.to_string()))??;

        info!(
            jobs = synced.survey.jobs.len(),
            lois_stored = synced.lois.stored,
            lois_preserved = synced.lois.preserved.len(),
            lois_rejected = synced.lois.rejected.len(),
            "Survey synced"
        );
        Ok(Some(synced))
    }

    async fn fetch(&self, survey_id: &str) -> SyncResult<Option<FetchedSurvey>> {
        let doc = match self.remote.fetch_survey(survey_id).await {
            Ok(doc) => doc,
            Err(RemoteError::NotFound(_)) => {
                info!("Survey not found remotely");
                return Ok(None);
            }
            Err(e) => {
                warn!(error = %e, "Survey fetch failed");
                return Err(e.into());
            }
        };
        let survey = survey_from_document(&doc)?;

        let lois = if self.config.sync_lois_on_load {
            Some(self.fetch_lois(&survey).await?)
        } else {
            None
        };
        Ok(Some(FetchedSurvey { survey, lois }))
    }

    async fn fetch_lois(&self, survey: &Survey) -> SyncResult<FetchedLois> {
        let docs = self.remote.fetch_lois(&survey.id).await?;
        let fetched = docs.iter().fold(
            FetchedLois {
                decoded: Vec::with_capacity(docs.len()),
                rejected: Vec::new(),
            },
            |mut acc, doc| {
                match loi_from_document(survey, doc) {
                    Ok(loi) => acc.decoded.push(loi),
                    Err(error) => {
                        warn!(loi_id = %doc.id, error = %error, "Skipping LOI");
                        acc.rejected.push(RejectedDocument {
                            doc_id: doc.id.clone(),
                            error,
                        });
                    }
                }
                acc
            },
        );
        Ok(fetched)
    }

    /// Make a locally available survey the active one
    ///
    /// Returns `false` when it already was active.
    #[instrument(skip(self))]
    pub async fn activate(&self, survey_id: &str) -> SyncResult<bool> {
        let survey = self
            .local
            .get_survey(survey_id)
            .await?
            .ok_or_else(|| SyncError::SurveyNotSynced(survey_id.to_string()))?;
        let survey = Arc::new(survey);

        let mut previous = None;
        let mut removed = false;
        let changed = self.active.send_if_modified(|current| {
            if current.as_ref().is_some_and(|a| a.id == survey.id) {
                return false;
            }
            // A removal that raced past the local read wins
            if self
                .states
                .get(survey_id)
                .is_some_and(|state| *state == SurveyState::Removed)
            {
                removed = true;
                return false;
            }
            previous = current.replace(survey).map(|p| p.id.clone());
            true
        });

        if removed {
            return Err(SyncError::SurveyNotSynced(survey_id.to_string()));
        }
        if changed {
            if let Some(previous) = &previous {
                self.states.insert(previous.clone(), SurveyState::Synced);
            }
            self.states.insert(survey_id.to_string(), SurveyState::Synced);
            info!(previous = ?previous, "Activated survey");
        } else {
            debug!("Survey already active");
        }
        Ok(changed)
    }

    /// Deactivate whichever survey is active; returns whether one was
    pub fn clear_active_survey(&self) -> bool {
        let mut previous = None;
        let changed = self.active.send_if_modified(|current| {
            previous = current.take().map(|p| p.id.clone());
            previous.is_some()
        });
        if let Some(previous) = previous {
            info!(survey_id = %previous, "Cleared active survey");
        }
        changed
    }

    /// Delete a survey's offline copy with its LOIs, submissions and queued
    /// mutations
    ///
    /// If it is the active survey the slot is cleared first, in one step.
    #[instrument(skip(self))]
    pub async fn remove_offline_survey(&self, survey_id: &str) -> SyncResult<()> {
        self.states
            .insert(survey_id.to_string(), SurveyState::Removed);
        let cleared = self.active.send_if_modified(|current| {
            if current.as_ref().is_some_and(|a| a.id == survey_id) {
                *current = None;
                true
            } else {
                false
            }
        });

        self.local.delete_survey(survey_id).await?;
        let purged = self.queue.remove_survey(survey_id)?;
        info!(cleared_active = cleared, purged_mutations = purged, "Removed offline survey");
        Ok(())
    }

    /// All offline surveys, flagged with whether each is active
    pub async fn local_surveys(&self) -> SyncResult<Vec<LocalSurvey>> {
        let surveys = self.local.surveys().await?;
        let active_id = self.active_id();
        Ok(surveys
            .into_iter()
            .map(|survey| LocalSurvey {
                is_active: active_id.as_deref() == Some(survey.id.as_str()),
                survey,
            })
            .collect())
    }

    /// Re-fetch a single job and replace it in the local survey
    #[instrument(skip(self))]
    pub async fn refresh_job(&self, survey_id: &str, job_id: &str) -> SyncResult<Job> {
        let mut survey = self
            .local
            .get_survey(survey_id)
            .await?
            .ok_or_else(|| SyncError::SurveyNotSynced(survey_id.to_string()))?;

        let doc = match self.remote.fetch_job(survey_id, job_id).await {
            Ok(doc) => doc,
            Err(RemoteError::NotFound(_)) => {
                return Err(SyncError::JobNotFound {
                    survey_id: survey_id.to_string(),
                    job_id: job_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let job = job_from_wire(job_id, &doc.into_json())?;

        // Removed while the fetch was in flight; writing would bring it back
        if self.state(survey_id) == SurveyState::Removed {
            info!("Survey removed during job refresh, dropping result");
            return Err(SyncError::SurveyNotSynced(survey_id.to_string()));
        }
        survey.jobs.insert(job_id.to_string(), job.clone());
        self.local.put_survey(survey.clone()).await?;
        publish_if_active(&self.active, survey);
        debug!(tasks = job.tasks.len(), "Refreshed job");
        Ok(job)
    }

    /// Pull the remote submissions of one LOI
    ///
    /// Submissions with unsent local edits are left as they are.
    #[instrument(skip(self))]
    pub async fn sync_submissions(
        &self,
        survey_id: &str,
        loi_id: &str,
    ) -> SyncResult<DocumentSyncReport> {
        let survey = self
            .local
            .get_survey(survey_id)
            .await?
            .ok_or_else(|| SyncError::SurveyNotSynced(survey_id.to_string()))?;
        let loi = self
            .local
            .get_offline_loi(survey_id, loi_id)
            .await?
            .ok_or_else(|| SyncError::LoiNotFound {
                survey_id: survey_id.to_string(),
                loi_id: loi_id.to_string(),
            })?;

        let docs = self.remote.fetch_submissions(survey_id, loi_id).await?;
        let mut report = DocumentSyncReport::default();
        for doc in &docs {
            let decoded = match decode_submission(&survey, &loi, doc) {
                Ok(decoded) => decoded,
                Err(error) => {
                    warn!(submission_id = %doc.id, error = %error, "Skipping submission");
                    report.rejected.push(RejectedDocument {
                        doc_id: doc.id.clone(),
                        error,
                    });
                    continue;
                }
            };
            report.skipped_fields += decoded.skipped.len();
            if self
                .queue
                .has_pending_for_target(survey_id, TargetKind::Submission, &doc.id)
            {
                debug!(submission_id = %doc.id, "Keeping locally edited submission");
                report.preserved.push(doc.id.clone());
                continue;
            }
            self.local.put_submission(decoded.submission).await?;
            report.stored += 1;
        }

        info!(
            stored = report.stored,
            preserved = report.preserved.len(),
            rejected = report.rejected.len(),
            "Submissions synced"
        );
        Ok(report)
    }
}

/// Replace the active survey's contents if `survey` is the active one
fn publish_if_active(active: &watch::Sender<ActiveSurvey>, survey: Survey) -> bool {
    active.send_if_modified(|current| {
        let is_active = current.as_ref().is_some_and(|a| a.id == survey.id);
        if is_active {
            *current = Some(Arc::new(survey));
        }
        is_active
    })
}

/// Write phase of a sync; runs to completion once started
///
/// On a first sync a failed write deletes the LOIs already written, so no
/// LOIs are left behind without their survey. On a resync they stay; the
/// survey record still owns them.
async fn commit_sync<L: LocalStore>(
    local: Arc<L>,
    queue: Arc<MutationQueue>,
    active: Arc<watch::Sender<ActiveSurvey>>,
    states: StateMap,
    previous: Option<SurveyState>,
    fetched: FetchedSurvey,
) -> SyncResult<SyncedSurvey> {
    let FetchedSurvey { survey, lois } = fetched;
    let survey_id = survey.id.clone();

    let mut first_sync = false;
    let mut written = Vec::new();

    let result = async {
        first_sync = local.get_survey(&survey.id).await?.is_none();
        let mut report = DocumentSyncReport::default();
        if let Some(FetchedLois { decoded, rejected }) = lois {
            report.rejected = rejected;
            for loi in decoded {
                if queue.has_pending_for_target(&survey.id, TargetKind::LocationOfInterest, &loi.id)
                {
                    debug!(loi_id = %loi.id, "Keeping locally edited LOI");
                    report.preserved.push(loi.id);
                    continue;
                }
                let loi_id = loi.id.clone();
                local.put_loi(loi).await?;
                written.push(loi_id);
                report.stored += 1;
            }
        }
        // Survey last, so a failed LOI write never leaves a survey that
        // looks fully synced
        local.put_survey(survey.clone()).await?;
        Ok::<_, SyncError>(report)
    }
    .await;

    match result {
        Ok(report) => {
            states.insert(survey_id, SurveyState::Synced);
            publish_if_active(&active, survey.clone());
            Ok(SyncedSurvey {
                survey,
                lois: report,
            })
        }
        Err(e) => {
            warn!(survey_id = %survey_id, error = %e, "Local write failed during sync");
            if first_sync {
                for loi_id in &written {
                    if let Err(cleanup) = local.delete_loi(&survey_id, loi_id).await {
                        warn!(loi_id = %loi_id, error = %cleanup, "Failed to roll back LOI");
                    }
                }
            }
            match previous {
                Some(state) => states.insert(survey_id, state),
                None => states.remove(&survey_id).map(|(_, state)| state),
            };
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use fieldkit_core::fake::FakeRemoteStore;
    use fieldkit_core::{RemoteDocument, StorageError, Submission};
    use fieldkit_storage::InMemoryLocalStore;
    use serde_json::json;

    /// Fails every LOI write after the first `ok_writes`
    struct FlakyLocal {
        inner: InMemoryLocalStore,
        ok_writes: usize,
        loi_writes: AtomicUsize,
    }

    #[async_trait]
    impl LocalStore for FlakyLocal {
        async fn get_survey(&self, survey_id: &str) -> Result<Option<Survey>, StorageError> {
            self.inner.get_survey(survey_id).await
        }

        async fn put_survey(&self, survey: Survey) -> Result<(), StorageError> {
            self.inner.put_survey(survey).await
        }

        async fn delete_survey(&self, survey_id: &str) -> Result<(), StorageError> {
            self.inner.delete_survey(survey_id).await
        }

        async fn surveys(&self) -> Result<Vec<Survey>, StorageError> {
            self.inner.surveys().await
        }

        async fn get_offline_loi(
            &self,
            survey_id: &str,
            loi_id: &str,
        ) -> Result<Option<LocationOfInterest>, StorageError> {
            self.inner.get_offline_loi(survey_id, loi_id).await
        }

        async fn put_loi(&self, loi: LocationOfInterest) -> Result<(), StorageError> {
            if self.loi_writes.fetch_add(1, Ordering::SeqCst) >= self.ok_writes {
                return Err(StorageError::io("disk full"));
            }
            self.inner.put_loi(loi).await
        }

        async fn delete_loi(&self, survey_id: &str, loi_id: &str) -> Result<(), StorageError> {
            self.inner.delete_loi(survey_id, loi_id).await
        }

        async fn lois(&self, survey_id: &str) -> Result<Vec<LocationOfInterest>, StorageError> {
            self.inner.lois(survey_id).await
        }

        async fn get_submission(
            &self,
            survey_id: &str,
            submission_id: &str,
        ) -> Result<Option<Submission>, StorageError> {
            self.inner.get_submission(survey_id, submission_id).await
        }

        async fn put_submission(&self, submission: Submission) -> Result<(), StorageError> {
            self.inner.put_submission(submission).await
        }

        async fn delete_submission(
            &self,
            survey_id: &str,
            submission_id: &str,
        ) -> Result<(), StorageError> {
            self.inner.delete_submission(survey_id, submission_id).await
        }

        async fn submissions(
            &self,
            survey_id: &str,
            loi_id: &str,
        ) -> Result<Vec<Submission>, StorageError> {
            self.inner.submissions(survey_id, loi_id).await
        }
    }

    fn loi_doc(id: &str) -> RemoteDocument {
        RemoteDocument::from_json(
            id,
            json!({"jobId": "j1", "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}}),
        )
        .unwrap()
    }

    type Manager = SurveyLifecycleManager<FakeRemoteStore, InMemoryLocalStore>;

    fn survey_doc(id: &str) -> RemoteDocument {
        RemoteDocument::from_json(
            id,
            json!({
                "title": format!("Survey {id}"),
                "jobs": {"j1": {"name": "Job", "tasks": [{"id": "t1", "type": "text"}]}}
            }),
        )
        .unwrap()
    }

    fn setup() -> (Arc<FakeRemoteStore>, Arc<InMemoryLocalStore>, Manager) {
        let remote = Arc::new(FakeRemoteStore::new());
        let local = Arc::new(InMemoryLocalStore::new());
        let manager = SurveyLifecycleManager::new(
            Arc::clone(&remote),
            Arc::clone(&local),
            Arc::new(MutationQueue::new()),
            SyncConfig::default(),
        );
        (remote, local, manager)
    }

    #[tokio::test]
    async fn test_sync_does_not_activate() {
        let (remote, local, manager) = setup();
        remote.insert_survey(survey_doc("s1"));

        let synced = manager.load_and_sync("s1").await.unwrap().unwrap();
        assert_eq!(synced.survey.title, "Survey s1");
        assert_eq!(manager.state("s1"), SurveyState::Synced);
        assert!(manager.active_survey().is_none());
        assert!(local.get_survey("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_state_restored_after_failed_sync() {
        let (remote, _local, manager) = setup();
        remote.fail_fetches_with(Some(RemoteError::Transport("offline".into())));
        assert!(manager.load_and_sync("s1").await.is_err());
        assert_eq!(manager.state("s1"), SurveyState::NotLoaded);
    }

    #[tokio::test]
    async fn test_activate_requires_local_copy() {
        let (_remote, _local, manager) = setup();
        assert!(matches!(
            manager.activate("s1").await,
            Err(SyncError::SurveyNotSynced(_))
        ));
    }

    #[tokio::test]
    async fn test_activate_replaces_and_clear() {
        let (remote, _local, manager) = setup();
        remote.insert_survey(survey_doc("s1"));
        remote.insert_survey(survey_doc("s2"));
        manager.load_and_sync("s1").await.unwrap();
        manager.load_and_sync("s2").await.unwrap();

        assert!(manager.activate("s1").await.unwrap());
        assert!(manager.activate("s2").await.unwrap());
        assert_eq!(manager.state("s2"), SurveyState::Active);
        assert_eq!(manager.state("s1"), SurveyState::Synced);

        assert!(manager.clear_active_survey());
        assert!(!manager.clear_active_survey());
        assert_eq!(manager.state("s2"), SurveyState::Synced);
    }

    #[tokio::test]
    async fn test_resync_refreshes_active_value() {
        let (remote, _local, manager) = setup();
        remote.insert_survey(survey_doc("s1"));
        manager.load_and_sync("s1").await.unwrap();
        manager.activate("s1").await.unwrap();

        remote.insert_survey(
            RemoteDocument::from_json("s1", json!({"title": "Renamed", "jobs": {}})).unwrap(),
        );
        manager.load_and_sync("s1").await.unwrap();
        assert_eq!(manager.active_survey().unwrap().title, "Renamed");
        assert_eq!(manager.state("s1"), SurveyState::Active);
    }

    #[tokio::test]
    async fn test_local_surveys_flags_active() {
        let (remote, _local, manager) = setup();
        remote.insert_survey(survey_doc("s1"));
        remote.insert_survey(survey_doc("s2"));
        manager.load_and_sync("s1").await.unwrap();
        manager.load_and_sync("s2").await.unwrap();
        manager.activate("s2").await.unwrap();

        let flags: Vec<_> = manager
            .local_surveys()
            .await
            .unwrap()
            .into_iter()
            .map(|l| (l.survey.id, l.is_active))
            .collect();
        assert_eq!(flags, vec![("s1".to_string(), false), ("s2".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_refresh_job() {
        let (remote, local, manager) = setup();
        remote.insert_survey(survey_doc("s1"));
        manager.load_and_sync("s1").await.unwrap();

        remote.insert_job(
            "s1",
            RemoteDocument::from_json(
                "j1",
                json!({"name": "Job v2", "tasks": [{"id": "t1", "type": "text"}, {"id": "t2", "type": "photo"}]}),
            )
            .unwrap(),
        );
        let job = manager.refresh_job("s1", "j1").await.unwrap();
        assert_eq!(job.tasks.len(), 2);

        let stored = local.get_survey("s1").await.unwrap().unwrap();
        assert_eq!(stored.job("j1").unwrap().name, "Job v2");

        assert!(matches!(
            manager.refresh_job("s1", "missing").await,
            Err(SyncError::JobNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_first_sync_rolls_back_lois() {
        let remote = Arc::new(FakeRemoteStore::new());
        remote.insert_survey(survey_doc("s1"));
        for id in ["l1", "l2", "l3"] {
            remote.insert_loi("s1", loi_doc(id));
        }
        let local = Arc::new(FlakyLocal {
            inner: InMemoryLocalStore::new(),
            ok_writes: 2,
            loi_writes: AtomicUsize::new(0),
        });
        let manager = SurveyLifecycleManager::new(
            Arc::clone(&remote),
            Arc::clone(&local),
            Arc::new(MutationQueue::new()),
            SyncConfig::default(),
        );

        let err = manager.load_and_sync("s1").await.unwrap_err();
        assert!(matches!(err, SyncError::Storage(StorageError::Io(_))));
        assert!(local.get_survey("s1").await.unwrap().is_none());
        assert!(local.lois("s1").await.unwrap().is_empty());
        assert_eq!(manager.state("s1"), SurveyState::NotLoaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_job_does_not_restore_removed_survey() {
        let (remote, local, manager) = setup();
        remote.insert_survey(survey_doc("s1"));
        manager.load_and_sync("s1").await.unwrap();
        remote.insert_job(
            "s1",
            RemoteDocument::from_json("j1", json!({"name": "Job v2", "tasks": []})).unwrap(),
        );
        remote.delay_fetches(Some(Duration::from_secs(5)));

        let (refreshed, removed) = tokio::join!(manager.refresh_job("s1", "j1"), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            manager.remove_offline_survey("s1").await
        });

        removed.unwrap();
        assert!(matches!(refreshed, Err(SyncError::SurveyNotSynced(_))));
        assert!(local.get_survey("s1").await.unwrap().is_none());
        assert_eq!(manager.state("s1"), SurveyState::Removed);
    }
}
