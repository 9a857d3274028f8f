//! Pending mutation queue
//!
//! Mutations are grouped per target entity and kept in enqueue order inside
//! each group. Completed mutations leave the queue; failed ones stay at the
//! head of their group until discarded, blocking later edits of the same
//! target.
//!
//! A queue opened with [`MutationQueue::open`] journals every change to a
//! JSON-lines file and replays it on the next open, so edits made offline
//! are still queued after a restart.

use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use fieldkit_core::{Mutation, StorageError, SyncState, TargetKind};

const JOURNAL_FILE: &str = "mutations.jsonl";
const TEMP_FILE: &str = "mutations.jsonl.tmp";

/// `(survey_id, target_kind, target_id)`
type TargetKey = (String, TargetKind, String);

fn target_key(mutation: &Mutation) -> TargetKey {
    (
        mutation.survey_id.clone(),
        mutation.target_kind,
        mutation.target_id.clone(),
    )
}

fn io_error(e: std::io::Error) -> StorageError {
    StorageError::io(e.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry {
    /// Insert or replace a mutation
    Put { mutation: Mutation },
    Remove {
        survey_id: String,
        target_kind: TargetKind,
        target_id: String,
        mutation_id: String,
    },
    /// Drop every mutation of one target
    RemoveTarget {
        survey_id: String,
        target_kind: TargetKind,
        target_id: String,
    },
}

impl JournalEntry {
    fn remove(mutation: &Mutation) -> Self {
        Self::Remove {
            survey_id: mutation.survey_id.clone(),
            target_kind: mutation.target_kind,
            target_id: mutation.target_id.clone(),
            mutation_id: mutation.id.clone(),
        }
    }

    fn remove_target((survey_id, target_kind, target_id): &TargetKey) -> Self {
        Self::RemoveTarget {
            survey_id: survey_id.clone(),
            target_kind: *target_kind,
            target_id: target_id.clone(),
        }
    }

    fn encode(&self) -> Result<String, StorageError> {
        let mut line =
            serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(Debug)]
struct Journal {
    writer: std::io::BufWriter<std::fs::File>,
    sync_writes: bool,
}

impl Journal {
    fn append(&mut self, entry: &JournalEntry) -> Result<(), StorageError> {
        self.writer
            .write_all(entry.encode()?.as_bytes())
            .map_err(io_error)?;
        self.writer.flush().map_err(io_error)?;
        if self.sync_writes {
            self.writer.get_ref().sync_data().map_err(io_error)?;
        }
        Ok(())
    }
}

/// Ordered store of local edits awaiting upload
#[derive(Debug)]
pub struct MutationQueue {
    targets: DashMap<TargetKey, VecDeque<Mutation>>,
    next_sequence: AtomicU64,
    /// Bumped on every change
    changes: watch::Sender<u64>,
    /// Present when the queue is file-backed
    journal: Option<Mutex<Journal>>,
}

impl Default for MutationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationQueue {
    /// A queue that lives only in memory
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            targets: DashMap::new(),
            next_sequence: AtomicU64::new(1),
            changes,
            journal: None,
        }
    }

    /// Open (or create) a journaled queue in `storage_path`
    pub async fn open(storage_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::with_options(storage_path, true).await
    }

    /// Replays the journal, then rewrites it to hold only the queued mutations
    ///
    /// Mutations that were in flight when the process stopped come back as
    /// `Pending`; their outcome on the remote is unknown.
    pub async fn with_options(
        storage_path: impl AsRef<Path>,
        sync_writes: bool,
    ) -> Result<Self, StorageError> {
        let storage_path = storage_path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&storage_path)
            .await
            .map_err(io_error)?;
        let journal_path = storage_path.join(JOURNAL_FILE);

        let mut queue = Self::new();
        queue.replay(&journal_path).await?;

        let mut max_sequence = 0;
        let mut resumed = 0usize;
        for mut entry in queue.targets.iter_mut() {
            let mutations = entry.value_mut();
            mutations.make_contiguous().sort_by_key(|m| m.sequence);
            for mutation in mutations.iter_mut() {
                max_sequence = max_sequence.max(mutation.sequence);
                if mutation.sync_state == SyncState::InFlight {
                    mutation.sync_state = SyncState::Pending;
                    resumed += 1;
                }
            }
        }
        queue.next_sequence = AtomicU64::new(max_sequence + 1);

        queue.rewrite(&storage_path, &journal_path).await?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .map_err(io_error)?;
        queue.journal = Some(Mutex::new(Journal {
            writer: std::io::BufWriter::new(file),
            sync_writes,
        }));

        info!(
            path = ?journal_path,
            queued = queue.len(),
            resumed,
            "Opened mutation queue"
        );
        Ok(queue)
    }

    async fn replay(&self, journal_path: &Path) -> Result<(), StorageError> {
        if !tokio::fs::try_exists(journal_path).await.map_err(io_error)? {
            debug!(path = ?journal_path, "No mutation journal, starting empty");
            return Ok(());
        }

        let file = File::open(journal_path).await.map_err(io_error)?;
        let mut lines = BufReader::new(file).lines();
        while let Some(line) = lines.next_line().await.map_err(io_error)? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(&line) {
                Ok(entry) => self.apply(entry),
                Err(e) => warn!(error = %e, "Failed to parse journal entry, skipping"),
            }
        }
        self.targets.retain(|_, queue| !queue.is_empty());
        Ok(())
    }

    fn apply(&self, entry: JournalEntry) {
        match entry {
            JournalEntry::Put { mutation } => {
                let mut queue = self.targets.entry(target_key(&mutation)).or_default();
                match queue.iter().position(|m| m.id == mutation.id) {
                    Some(position) => queue[position] = mutation,
                    None => queue.push_back(mutation),
                }
            }
            JournalEntry::Remove {
                survey_id,
                target_kind,
                target_id,
                mutation_id,
            } => {
                if let Some(mut queue) = self.targets.get_mut(&(survey_id, target_kind, target_id)) {
                    queue.retain(|m| m.id != mutation_id);
                }
            }
            JournalEntry::RemoveTarget {
                survey_id,
                target_kind,
                target_id,
            } => {
                self.targets.remove(&(survey_id, target_kind, target_id));
            }
        }
    }

    async fn rewrite(&self, storage_path: &Path, journal_path: &Path) -> Result<(), StorageError> {
        let temp_path = storage_path.join(TEMP_FILE);
        let mut mutations: Vec<Mutation> = self
            .targets
            .iter()
            .flat_map(|entry| entry.value().iter().cloned().collect::<Vec<_>>())
            .collect();
        mutations.sort_by_key(|m| m.sequence);

        let file = File::create(&temp_path).await.map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        for mutation in mutations {
            let line = JournalEntry::Put { mutation }.encode()?;
            writer.write_all(line.as_bytes()).await.map_err(io_error)?;
        }
        writer.flush().await.map_err(io_error)?;
        writer.get_ref().sync_all().await.map_err(io_error)?;
        drop(writer);

        tokio::fs::rename(&temp_path, journal_path)
            .await
            .map_err(io_error)
    }

    /// Append to the journal, if any
    ///
    /// Callers hold the target's map guard, so journal order matches the
    /// order changes become visible.
    fn journal(&self, entry: impl FnOnce() -> JournalEntry) -> Result<(), StorageError> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let mut journal = journal
            .lock()
            .map_err(|_| StorageError::io("Mutation journal lock poisoned"))?;
        journal.append(&entry())
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    /// Append a mutation, assigning its sequence number
    ///
    /// The mutation is reset to `Pending`.
    pub fn enqueue(&self, mut mutation: Mutation) -> Result<Mutation, StorageError> {
        mutation.sync_state = SyncState::Pending;
        {
            let mut queue = self.targets.entry(target_key(&mutation)).or_default();
            mutation.sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
            self.journal(|| JournalEntry::Put {
                mutation: mutation.clone(),
            })?;
            queue.push_back(mutation.clone());
        }
        debug!(
            mutation_id = %mutation.id,
            sequence = mutation.sequence,
            survey_id = %mutation.survey_id,
            target_id = %mutation.target_id,
            mutation_type = %mutation.mutation_type,
            "Enqueued mutation"
        );
        self.notify();
        Ok(mutation)
    }

    /// Every queued mutation of a survey, in enqueue order
    pub fn survey_mutations(&self, survey_id: &str) -> Vec<Mutation> {
        let mut mutations: Vec<Mutation> = self
            .targets
            .iter()
            .filter(|entry| entry.key().0 == survey_id)
            .flat_map(|entry| entry.value().iter().cloned().collect::<Vec<_>>())
            .collect();
        mutations.sort_by_key(|m| m.sequence);
        mutations
    }

    /// The queued mutations of each target of a survey, one list per target
    pub fn target_queues(&self, survey_id: &str) -> Vec<Vec<Mutation>> {
        let mut queues: Vec<Vec<Mutation>> = self
            .targets
            .iter()
            .filter(|entry| entry.key().0 == survey_id && !entry.value().is_empty())
            .map(|entry| entry.value().iter().cloned().collect())
            .collect();
        queues.sort_by_key(|q| q.first().map(|m| m.sequence));
        queues
    }

    /// Oldest queued mutation for a target
    pub fn head(&self, survey_id: &str, kind: TargetKind, target_id: &str) -> Option<Mutation> {
        self.targets
            .get(&(survey_id.to_string(), kind, target_id.to_string()))
            .and_then(|queue| queue.front().cloned())
    }

    /// Whether any local edit of the target has not reached the remote yet
    pub fn has_pending_for_target(&self, survey_id: &str, kind: TargetKind, target_id: &str) -> bool {
        self.targets
            .get(&(survey_id.to_string(), kind, target_id.to_string()))
            .is_some_and(|queue| !queue.is_empty())
    }

    /// Store a mutation's new state; complete mutations are dropped
    ///
    /// Fails with [`StorageError::NotFound`] once the mutation has left the
    /// queue, for example after its survey was removed.
    pub fn update(&self, mutation: &Mutation) -> Result<(), StorageError> {
        let key = target_key(mutation);
        {
            let mut queue = self
                .targets
                .get_mut(&key)
                .ok_or_else(|| StorageError::not_found(format!("mutation {}", mutation.id)))?;
            let position = queue
                .iter()
                .position(|m| m.id == mutation.id)
                .ok_or_else(|| StorageError::not_found(format!("mutation {}", mutation.id)))?;

            if mutation.sync_state == SyncState::Complete {
                self.journal(|| JournalEntry::remove(mutation))?;
                queue.remove(position);
            } else if let Some(slot) = queue.get_mut(position) {
                self.journal(|| JournalEntry::Put {
                    mutation: mutation.clone(),
                })?;
                *slot = mutation.clone();
            }
        }
        self.targets.remove_if(&key, |_, queue| queue.is_empty());
        trace!(mutation_id = %mutation.id, state = %mutation.sync_state, "Updated mutation");
        self.notify();
        Ok(())
    }

    /// Drop a mutation regardless of state
    pub fn discard(&self, mutation_id: &str) -> Result<Option<Mutation>, StorageError> {
        let mut removed = None;
        for mut entry in self.targets.iter_mut() {
            if let Some(position) = entry.value().iter().position(|m| m.id == mutation_id) {
                if let Some(mutation) = entry.value().get(position) {
                    self.journal(|| JournalEntry::remove(mutation))?;
                }
                removed = entry.value_mut().remove(position);
                break;
            }
        }
        if removed.is_some() {
            self.targets.retain(|_, queue| !queue.is_empty());
            self.notify();
        }
        Ok(removed)
    }

    /// Drop every queued submission mutation belonging to an LOI
    pub fn discard_loi_submissions(
        &self,
        survey_id: &str,
        loi_id: &str,
    ) -> Result<Vec<Mutation>, StorageError> {
        let removed = self.remove_targets(|(sid, kind, _), queue| {
            sid == survey_id
                && *kind == TargetKind::Submission
                && queue.front().is_some_and(|m| m.loi_id == loi_id)
        })?;
        if !removed.is_empty() {
            debug!(survey_id, loi_id, removed = removed.len(), "Dropped submission mutations of LOI");
        }
        Ok(removed)
    }

    /// Drop all mutations of a survey, returning how many were removed
    pub fn remove_survey(&self, survey_id: &str) -> Result<usize, StorageError> {
        let removed = self.remove_targets(|(sid, _, _), _| sid == survey_id)?.len();
        if removed > 0 {
            debug!(survey_id, removed, "Purged queued mutations");
        }
        Ok(removed)
    }

    /// Remove whole target queues matching `matches`
    ///
    /// Stops at the first journal failure; targets removed before it stay
    /// removed.
    fn remove_targets(
        &self,
        matches: impl Fn(&TargetKey, &VecDeque<Mutation>) -> bool,
    ) -> Result<Vec<Mutation>, StorageError> {
        let mut removed = Vec::new();
        let mut failure = None;
        self.targets.retain(|key, queue| {
            if failure.is_some() || !matches(key, queue) {
                return true;
            }
            match self.journal(|| JournalEntry::remove_target(key)) {
                Ok(()) => {
                    removed.extend(queue.drain(..));
                    false
                }
                Err(e) => {
                    failure = Some(e);
                    true
                }
            }
        });
        if !removed.is_empty() {
            self.notify();
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    pub fn len(&self) -> usize {
        self.targets.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receives a new version number whenever the queue changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}
