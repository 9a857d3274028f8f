//! Sync status: queued mutations joined with the LOIs they touch

use std::collections::HashMap;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::watch;
use tracing::{debug, warn};

use fieldkit_convert::loi_from_document;
use fieldkit_core::{
    LocalStore, LocationOfInterest, Mutation, MutationType, RemoteDocument, Survey, TargetKind,
};
use fieldkit_storage::MutationQueue;

use crate::error::{SyncError, SyncResult};
use crate::lifecycle::ActiveSurvey;

/// One queued mutation with the LOI it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatusEntry {
    pub loi: LocationOfInterest,
    pub mutation: Mutation,
}

/// Builds the sync status view from the queue and the local store
pub struct SyncStatusAggregator<L> {
    local: Arc<L>,
    queue: Arc<MutationQueue>,
    active: watch::Receiver<ActiveSurvey>,
}

impl<L> Clone for SyncStatusAggregator<L> {
    fn clone(&self) -> Self {
        Self {
            local: Arc::clone(&self.local),
            queue: Arc::clone(&self.queue),
            active: self.active.clone(),
        }
    }
}

fn stale(mutation: &Mutation) -> SyncError {
    SyncError::StaleReference {
        mutation_id: mutation.id.clone(),
        target_kind: mutation.target_kind,
        target_id: mutation.target_id.clone(),
    }
}

/// LOIs recorded in pending deletes, which are gone from local storage
fn tombstones(survey: Option<&Survey>, mutations: &[Mutation]) -> HashMap<String, LocationOfInterest> {
    let Some(survey) = survey else {
        return HashMap::new();
    };
    mutations
        .iter()
        .filter(|m| {
            m.target_kind == TargetKind::LocationOfInterest && m.mutation_type == MutationType::Delete
        })
        .filter_map(|m| {
            let doc = RemoteDocument::from_json(m.target_id.clone(), m.payload.clone()).ok()?;
            match loi_from_document(survey, &doc) {
                Ok(loi) => Some((loi.id.clone(), loi)),
                Err(e) => {
                    warn!(mutation_id = %m.id, error = %e, "Unreadable LOI snapshot in delete");
                    None
                }
            }
        })
        .collect()
}

impl<L: LocalStore + 'static> SyncStatusAggregator<L> {
    /// `active` is the lifecycle manager's active-survey receiver
    pub fn new(
        local: Arc<L>,
        queue: Arc<MutationQueue>,
        active: watch::Receiver<ActiveSurvey>,
    ) -> Self {
        Self {
            local,
            queue,
            active,
        }
    }

    /// Queued mutations of a survey in enqueue order, each with its LOI
    ///
    /// A mutation whose LOI (or, for submission edits, submission) is missing
    /// locally fails the whole aggregation with [`SyncError::StaleReference`].
    pub async fn aggregate(&self, survey_id: &str) -> SyncResult<Vec<SyncStatusEntry>> {
        let mutations = self.queue.survey_mutations(survey_id);
        if mutations.is_empty() {
            return Ok(Vec::new());
        }
        let survey = self.local.get_survey(survey_id).await?;
        let deleted = tombstones(survey.as_ref(), &mutations);

        let mut entries = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            let loi = match self.local.get_offline_loi(survey_id, &mutation.loi_id).await? {
                Some(loi) => loi,
                None => deleted
                    .get(&mutation.loi_id)
                    .cloned()
                    .ok_or_else(|| stale(&mutation))?,
            };

            let expects_submission = mutation.target_kind == TargetKind::Submission
                && mutation.mutation_type != MutationType::Delete;
            if expects_submission
                && self
                    .local
                    .get_submission(survey_id, &mutation.target_id)
                    .await?
                    .is_none()
            {
                return Err(stale(&mutation));
            }

            entries.push(SyncStatusEntry { loi, mutation });
        }
        debug!(survey_id, entries = entries.len(), "Aggregated sync status");
        Ok(entries)
    }

    /// Status of whichever survey is active; empty when none is
    pub async fn active_status(&self) -> SyncResult<Vec<SyncStatusEntry>> {
        let active_id = self.active.borrow().as_ref().map(|s| s.id.clone());
        match active_id {
            Some(survey_id) => self.aggregate(&survey_id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Re-aggregates the active survey whenever it or the queue changes
    pub fn status_updates(
        &self,
    ) -> impl Stream<Item = SyncResult<Vec<SyncStatusEntry>>> + Send + 'static {
        let this = self.clone();
        let mut active = self.active.clone();
        let mut changes = self.queue.subscribe();
        async_stream::stream! {
            loop {
                yield this.active_status().await;
                tokio::select! {
                    changed = active.changed() => if changed.is_err() { break },
                    changed = changes.changed() => if changed.is_err() { break },
                }
            }
        }
    }
}
