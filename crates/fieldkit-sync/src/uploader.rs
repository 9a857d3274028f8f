//! Mutation upload passes
//!
//! One pass walks every target of a survey concurrently. Within a target,
//! mutations go strictly in enqueue order and the pass stops at the first
//! one that does not complete, so a retry never overtakes an older edit.

use std::sync::Arc;

use dashmap::DashSet;
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use fieldkit_core::{Mutation, RemoteStore, StorageError, SyncState};
use fieldkit_storage::MutationQueue;

use crate::cancel::unless_cancelled;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Counts from one or more upload passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub completed: usize,
    /// Failed this attempt, still under the retry bound
    pub retried: usize,
    /// Reached the terminal Failed state during this pass
    pub failed: usize,
    /// Left waiting behind a failed mutation of the same target
    pub blocked: usize,
    /// Left the queue while being uploaded
    pub removed: usize,
}

impl UploadReport {
    fn merge(mut self, other: UploadReport) -> Self {
        self.completed += other.completed;
        self.retried += other.retried;
        self.failed += other.failed;
        self.blocked += other.blocked;
        self.removed += other.removed;
        self
    }

    /// Whether another pass could make progress
    pub fn has_retries(&self) -> bool {
        self.retried > 0
    }
}

/// Removes the survey from the running set when the pass ends
struct PassGuard<'a> {
    running: &'a DashSet<String>,
    survey_id: String,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.running.remove(&self.survey_id);
    }
}

/// Drives queued mutations through `Pending -> InFlight -> {Complete | Pending | Failed}`
pub struct MutationUploader<R> {
    remote: Arc<R>,
    queue: Arc<MutationQueue>,
    max_attempts: u32,
    config: SyncConfig,
    running: DashSet<String>,
}

impl<R: RemoteStore> MutationUploader<R> {
    pub fn new(remote: Arc<R>, queue: Arc<MutationQueue>, config: SyncConfig) -> Self {
        Self {
            remote,
            queue,
            max_attempts: config.max_upload_attempts.max(1),
            config,
            running: DashSet::new(),
        }
    }

    /// Run one upload pass over a survey's queued mutations
    ///
    /// A pass already running for the same survey makes this a no-op.
    #[instrument(skip(self))]
    pub async fn upload_pending(&self, survey_id: &str) -> SyncResult<UploadReport> {
        if !self.running.insert(survey_id.to_string()) {
            debug!("Upload pass already running");
            return Ok(UploadReport::default());
        }
        let _guard = PassGuard {
            running: &self.running,
            survey_id: survey_id.to_string(),
        };

        let targets = self.queue.target_queues(survey_id);
        let results = join_all(targets.into_iter().map(|target| self.upload_target(target))).await;
        let report = results
            .into_iter()
            .try_fold(UploadReport::default(), |acc, r| r.map(|r| acc.merge(r)))?;

        if report != UploadReport::default() {
            info!(
                completed = report.completed,
                retried = report.retried,
                failed = report.failed,
                blocked = report.blocked,
                "Upload pass finished"
            );
        }
        Ok(report)
    }

    /// Repeat passes, pausing between them, until nothing is left to retry
    ///
    /// Stops early when `cancel` becomes `true`.
    pub async fn upload_until_settled(
        &self,
        survey_id: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> SyncResult<UploadReport> {
        let mut total = UploadReport::default();
        loop {
            let pass = self.upload_pending(survey_id).await?;
            total = total.merge(pass);
            if !pass.has_retries() {
                return Ok(total);
            }
            let pause = tokio::time::sleep(self.config.retry_delay());
            if unless_cancelled(&mut cancel, pause).await.is_none() {
                info!(survey_id, "Upload retries cancelled");
                return Err(SyncError::Cancelled(survey_id.to_string()));
            }
        }
    }

    /// Persist a mutation's new state
    ///
    /// `false` when the mutation already left the queue, as it does when its
    /// survey is removed or the edit is discarded mid-pass.
    fn store(&self, mutation: &Mutation) -> SyncResult<bool> {
        match self.queue.update(mutation) {
            Ok(()) => Ok(true),
            Err(StorageError::NotFound(_)) => {
                debug!(
                    mutation_id = %mutation.id,
                    target_id = %mutation.target_id,
                    "Mutation left the queue during upload"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn upload_target(&self, mutations: Vec<Mutation>) -> SyncResult<UploadReport> {
        let mut report = UploadReport::default();
        let total = mutations.len();

        for (position, mut mutation) in mutations.into_iter().enumerate() {
            let behind = total - position - 1;
            match mutation.sync_state {
                SyncState::Pending => {}
                SyncState::Failed => {
                    debug!(
                        mutation_id = %mutation.id,
                        target_id = %mutation.target_id,
                        "Target blocked by failed mutation"
                    );
                    report.blocked += behind;
                    return Ok(report);
                }
                // Passes never overlap, so this one was interrupted mid-write
                SyncState::InFlight => {
                    let state = mutation.record_failure("upload interrupted", self.max_attempts)?;
                    if !self.store(&mutation)? {
                        report.removed += 1;
                        return Ok(report);
                    }
                    if state == SyncState::Failed {
                        report.failed += 1;
                        report.blocked += behind;
                        return Ok(report);
                    }
                }
                SyncState::Complete => continue,
            }

            mutation.begin_upload()?;
            if !self.store(&mutation)? {
                report.removed += 1;
                return Ok(report);
            }

            match self.remote.write_mutation(&mutation).await {
                Ok(()) => {
                    mutation.complete()?;
                    report.completed += 1;
                    debug!(mutation_id = %mutation.id, "Mutation uploaded");
                    if !self.store(&mutation)? {
                        return Ok(report);
                    }
                }
                Err(e) if e.is_transient() => {
                    let state = mutation.record_failure(e.to_string(), self.max_attempts)?;
                    if !self.store(&mutation)? {
                        report.removed += 1;
                        return Ok(report);
                    }
                    if state == SyncState::Failed {
                        warn!(
                            mutation_id = %mutation.id,
                            attempts = mutation.retry_count,
                            error = %e,
                            "Mutation failed after retries"
                        );
                        report.failed += 1;
                        report.blocked += behind;
                    } else {
                        debug!(
                            mutation_id = %mutation.id,
                            attempts = mutation.retry_count,
                            error = %e,
                            "Mutation upload will be retried"
                        );
                        report.retried += 1;
                    }
                    return Ok(report);
                }
                Err(e) => {
                    mutation.fail_permanently(e.to_string())?;
                    if !self.store(&mutation)? {
                        report.removed += 1;
                        return Ok(report);
                    }
                    warn!(mutation_id = %mutation.id, error = %e, "Mutation rejected");
                    report.failed += 1;
                    report.blocked += behind;
                    return Ok(report);
                }
            }
        }
        Ok(report)
    }
}
