//! In-process fakes for exercising the sync layer without a real backend
//!
//! [`FakeRemoteStore`] serves scripted documents, can be told to fail fetches
//! or the next N writes, and records every write it accepts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::audit::User;
use crate::document::RemoteDocument;
use crate::error::RemoteError;
use crate::mutation::Mutation;
use crate::traits::{Clock, RemoteStore, UserContext};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scriptable [`RemoteStore`]
#[derive(Debug, Default)]
pub struct FakeRemoteStore {
    surveys: DashMap<String, RemoteDocument>,
    jobs: DashMap<(String, String), RemoteDocument>,
    lois: DashMap<String, Vec<RemoteDocument>>,
    submissions: DashMap<(String, String), Vec<RemoteDocument>>,
    fetch_failure: Mutex<Option<RemoteError>>,
    fetch_delay: Mutex<Option<Duration>>,
    write_delay: Mutex<Option<Duration>>,
    write_failures: Mutex<VecDeque<RemoteError>>,
    writes: Mutex<Vec<Mutation>>,
    fetch_count: AtomicUsize,
}

impl FakeRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_survey(&self, doc: RemoteDocument) {
        self.surveys.insert(doc.id.clone(), doc);
    }

    pub fn insert_job(&self, survey_id: &str, doc: RemoteDocument) {
        self.jobs.insert((survey_id.to_string(), doc.id.clone()), doc);
    }

    pub fn insert_loi(&self, survey_id: &str, doc: RemoteDocument) {
        self.lois.entry(survey_id.to_string()).or_default().push(doc);
    }

    pub fn insert_submission(&self, survey_id: &str, loi_id: &str, doc: RemoteDocument) {
        self.submissions
            .entry((survey_id.to_string(), loi_id.to_string()))
            .or_default()
            .push(doc);
    }

    /// Make every fetch fail with `error` until cleared
    pub fn fail_fetches_with(&self, error: Option<RemoteError>) {
        *lock(&self.fetch_failure) = error;
    }

    /// Delay every fetch, to leave room for cancellation
    pub fn delay_fetches(&self, delay: Option<Duration>) {
        *lock(&self.fetch_delay) = delay;
    }

    /// Delay every write before it is accepted
    pub fn delay_writes(&self, delay: Option<Duration>) {
        *lock(&self.write_delay) = delay;
    }

    /// Queue errors returned by the next writes, in order
    pub fn fail_next_writes(&self, errors: impl IntoIterator<Item = RemoteError>) {
        lock(&self.write_failures).extend(errors);
    }

    /// Mutations accepted so far, in write order
    pub fn writes(&self) -> Vec<Mutation> {
        lock(&self.writes).clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    async fn before_fetch(&self) -> Result<(), RemoteError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.fetch_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match lock(&self.fetch_failure).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for FakeRemoteStore {
    async fn fetch_survey(&self, survey_id: &str) -> Result<RemoteDocument, RemoteError> {
        self.before_fetch().await?;
        self.surveys
            .get(survey_id)
            .map(|d| d.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("survey {survey_id}")))
    }

    async fn fetch_job(&self, survey_id: &str, job_id: &str) -> Result<RemoteDocument, RemoteError> {
        self.before_fetch().await?;
        self.jobs
            .get(&(survey_id.to_string(), job_id.to_string()))
            .map(|d| d.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("job {survey_id}/{job_id}")))
    }

    async fn fetch_lois(&self, survey_id: &str) -> Result<Vec<RemoteDocument>, RemoteError> {
        self.before_fetch().await?;
        Ok(self
            .lois
            .get(survey_id)
            .map(|d| d.clone())
            .unwrap_or_default())
    }

    async fn fetch_submissions(
        &self,
        survey_id: &str,
        loi_id: &str,
    ) -> Result<Vec<RemoteDocument>, RemoteError> {
        self.before_fetch().await?;
        Ok(self
            .submissions
            .get(&(survey_id.to_string(), loi_id.to_string()))
            .map(|d| d.clone())
            .unwrap_or_default())
    }

    async fn write_mutation(&self, mutation: &Mutation) -> Result<(), RemoteError> {
        let delay = *lock(&self.write_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = lock(&self.write_failures).pop_front() {
            return Err(err);
        }
        lock(&self.writes).push(mutation.clone());
        Ok(())
    }
}

/// A clock frozen at a fixed instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A [`UserContext`] that always returns the same user
#[derive(Debug, Clone)]
pub struct StaticUser(pub User);

impl UserContext for StaticUser {
    fn current_user(&self) -> User {
        self.0.clone()
    }
}
