//! File-backed local store
//!
//! Every write is appended to a JSON-lines log before it is applied to the
//! in-memory cache. The log is replayed on open, so offline data survives a
//! restart. [`PersistentLocalStore::compact`] rewrites the log from the
//! current state.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use fieldkit_core::{LocalStore, LocationOfInterest, StorageError, Submission, Survey};

use crate::memory::InMemoryLocalStore;

const LOG_FILE: &str = "local_store.jsonl";
const TEMP_FILE: &str = "local_store.jsonl.tmp";

fn io_error(e: std::io::Error) -> StorageError {
    StorageError::io(e.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    PutSurvey { survey: Survey },
    DeleteSurvey { survey_id: String },
    PutLoi { loi: LocationOfInterest },
    DeleteLoi { survey_id: String, loi_id: String },
    PutSubmission { submission: Submission },
    DeleteSubmission { survey_id: String, submission_id: String },
}

impl LogEntry {
    fn encode(&self) -> Result<String, StorageError> {
        let mut line =
            serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))?;
        line.push('\n');
        Ok(line)
    }
}

/// Persistent implementation of [`LocalStore`]
#[derive(Debug)]
pub struct PersistentLocalStore {
    storage_path: PathBuf,
    cache: InMemoryLocalStore,
    writer: Mutex<Option<BufWriter<File>>>,
    /// Whether each write is flushed and synced before returning
    sync_writes: bool,
}

impl PersistentLocalStore {
    /// Open (or create) a store in `storage_path`
    pub async fn open(storage_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::with_options(storage_path, true).await
    }

    pub async fn with_options(
        storage_path: impl AsRef<Path>,
        sync_writes: bool,
    ) -> Result<Self, StorageError> {
        let storage_path = storage_path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&storage_path)
            .await
            .map_err(io_error)?;

        let store = Self {
            storage_path,
            cache: InMemoryLocalStore::new(),
            writer: Mutex::new(None),
            sync_writes,
        };
        store.load().await?;
        *store.writer.lock().await = Some(store.open_writer().await?);
        Ok(store)
    }

    fn log_path(&self) -> PathBuf {
        self.storage_path.join(LOG_FILE)
    }

    async fn load(&self) -> Result<(), StorageError> {
        let log_path = self.log_path();
        if !tokio::fs::try_exists(&log_path).await.map_err(io_error)? {
            debug!(path = ?log_path, "No existing log file, starting fresh");
            return Ok(());
        }

        let file = File::open(&log_path).await.map_err(io_error)?;
        let mut lines = BufReader::new(file).lines();
        let mut loaded = 0usize;
        let mut errors = 0usize;

        while let Some(line) = lines.next_line().await.map_err(io_error)? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(&line) {
                Ok(entry) => {
                    self.apply(entry);
                    loaded += 1;
                }
                Err(e) => {
                    // A torn final line after a crash is expected
                    errors += 1;
                    warn!(error = %e, "Failed to parse log entry, skipping");
                }
            }
        }

        info!(
            loaded,
            errors,
            surveys = self.cache.survey_count(),
            lois = self.cache.loi_count(),
            submissions = self.cache.submission_count(),
            "Loaded local store"
        );
        Ok(())
    }

    fn apply(&self, entry: LogEntry) {
        match entry {
            LogEntry::PutSurvey { survey } => self.cache.put_survey_sync(survey),
            LogEntry::DeleteSurvey { survey_id } => self.cache.delete_survey_sync(&survey_id),
            LogEntry::PutLoi { loi } => self.cache.put_loi_sync(loi),
            LogEntry::DeleteLoi { survey_id, loi_id } => {
                self.cache.delete_loi_sync(&survey_id, &loi_id)
            }
            LogEntry::PutSubmission { submission } => self.cache.put_submission_sync(submission),
            LogEntry::DeleteSubmission {
                survey_id,
                submission_id,
            } => self.cache.delete_submission_sync(&survey_id, &submission_id),
        }
    }

    async fn open_writer(&self) -> Result<BufWriter<File>, StorageError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .await
            .map_err(io_error)?;
        Ok(BufWriter::new(file))
    }

    /// Append `entry`, then apply it to the cache
    ///
    /// The writer lock is held across both steps so the log order matches
    /// the order writes become visible.
    async fn commit(&self, entry: LogEntry) -> Result<(), StorageError> {
        let line = entry.encode()?;
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| StorageError::io("Log file not open"))?;

        writer.write_all(line.as_bytes()).await.map_err(io_error)?;
        if self.sync_writes {
            writer.flush().await.map_err(io_error)?;
            writer.get_ref().sync_data().await.map_err(io_error)?;
        }
        self.apply(entry);
        Ok(())
    }

    pub async fn flush(&self) -> Result<(), StorageError> {
        if let Some(writer) = self.writer.lock().await.as_mut() {
            writer.flush().await.map_err(io_error)?;
        }
        Ok(())
    }

    /// Rewrite the log so it holds only the current state
    pub async fn compact(&self) -> Result<(), StorageError> {
        let mut guard = self.writer.lock().await;
        let temp_path = self.storage_path.join(TEMP_FILE);

        let mut entries = Vec::new();
        for survey in self.cache.surveys().await? {
            for loi in self.cache.lois(&survey.id).await? {
                for submission in self.cache.submissions(&survey.id, &loi.id).await? {
                    entries.push(LogEntry::PutSubmission { submission });
                }
                entries.push(LogEntry::PutLoi { loi });
            }
            entries.push(LogEntry::PutSurvey { survey });
        }
        // Parents first on replay
        entries.reverse();

        {
            let file = File::create(&temp_path).await.map_err(io_error)?;
            let mut writer = BufWriter::new(file);
            for entry in &entries {
                writer
                    .write_all(entry.encode()?.as_bytes())
                    .await
                    .map_err(io_error)?;
            }
            writer.flush().await.map_err(io_error)?;
            writer.get_ref().sync_all().await.map_err(io_error)?;
        }

        if let Some(mut writer) = guard.take() {
            writer.flush().await.map_err(io_error)?;
        }
        tokio::fs::rename(&temp_path, self.log_path())
            .await
            .map_err(io_error)?;
        *guard = Some(self.open_writer().await?);

        info!(entries = entries.len(), "Local store log compaction complete");
        Ok(())
    }
}

#[async_trait]
impl LocalStore for PersistentLocalStore {
    async fn get_survey(&self, survey_id: &str) -> Result<Option<Survey>, StorageError> {
        self.cache.get_survey(survey_id).await
    }

    async fn put_survey(&self, survey: Survey) -> Result<(), StorageError> {
        self.commit(LogEntry::PutSurvey { survey }).await
    }

    async fn delete_survey(&self, survey_id: &str) -> Result<(), StorageError> {
        self.commit(LogEntry::DeleteSurvey {
            survey_id: survey_id.to_string(),
        })
        .await
    }

    async fn surveys(&self) -> Result<Vec<Survey>, StorageError> {
        self.cache.surveys().await
    }

    async fn get_offline_loi(
        &self,
        survey_id: &str,
        loi_id: &str,
    ) -> Result<Option<LocationOfInterest>, StorageError> {
        self.cache.get_offline_loi(survey_id, loi_id).await
    }

    async fn put_loi(&self, loi: LocationOfInterest) -> Result<(), StorageError> {
        self.commit(LogEntry::PutLoi { loi }).await
    }

    async fn delete_loi(&self, survey_id: &str, loi_id: &str) -> Result<(), StorageError> {
        self.commit(LogEntry::DeleteLoi {
            survey_id: survey_id.to_string(),
            loi_id: loi_id.to_string(),
        })
        .await
    }

    async fn lois(&self, survey_id: &str) -> Result<Vec<LocationOfInterest>, StorageError> {
        self.cache.lois(survey_id).await
    }

    async fn get_submission(
        &self,
        survey_id: &str,
        submission_id: &str,
    ) -> Result<Option<Submission>, StorageError> {
        self.cache.get_submission(survey_id, submission_id).await
    }

    async fn put_submission(&self, submission: Submission) -> Result<(), StorageError> {
        self.commit(LogEntry::PutSubmission { submission }).await
    }

    async fn delete_submission(
        &self,
        survey_id: &str,
        submission_id: &str,
    ) -> Result<(), StorageError> {
        self.commit(LogEntry::DeleteSubmission {
            survey_id: survey_id.to_string(),
            submission_id: submission_id.to_string(),
        })
        .await
    }

    async fn submissions(
        &self,
        survey_id: &str,
        loi_id: &str,
    ) -> Result<Vec<Submission>, StorageError> {
        self.cache.submissions(survey_id, loi_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::{make_loi, make_submission};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reopen_replays_log() {
        let dir = TempDir::new().unwrap();
        {
            let store = PersistentLocalStore::open(dir.path()).await.unwrap();
            store.put_survey(Survey::new("s1", "One")).await.unwrap();
            store.put_survey(Survey::new("s2", "Two")).await.unwrap();
            store.put_loi(make_loi("s1", "l1")).await.unwrap();
            store
                .put_submission(make_submission("s1", "l1", "sub1"))
                .await
                .unwrap();
            store.delete_survey("s2").await.unwrap();
        }

        let store = PersistentLocalStore::open(dir.path()).await.unwrap();
        assert_eq!(store.surveys().await.unwrap().len(), 1);
        assert!(store.get_offline_loi("s1", "l1").await.unwrap().is_some());
        assert_eq!(store.submissions("s1", "l1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_compact_preserves_state() {
        let dir = TempDir::new().unwrap();
        let store = PersistentLocalStore::open(dir.path()).await.unwrap();
        for i in 0..10 {
            store
                .put_survey(Survey::new("s1", format!("Rev {i}")))
                .await
                .unwrap();
        }
        store.put_loi(make_loi("s1", "l1")).await.unwrap();
        store
            .put_submission(make_submission("s1", "l1", "sub1"))
            .await
            .unwrap();
        store.compact().await.unwrap();
        store.put_loi(make_loi("s1", "l2")).await.unwrap();
        drop(store);

        let log = tokio::fs::read_to_string(dir.path().join(LOG_FILE))
            .await
            .unwrap();
        assert_eq!(log.lines().count(), 4);

        let store = PersistentLocalStore::open(dir.path()).await.unwrap();
        let survey = store.get_survey("s1").await.unwrap().unwrap();
        assert_eq!(survey.title, "Rev 9");
        assert_eq!(store.lois("s1").await.unwrap().len(), 2);
        assert_eq!(store.submissions("s1", "l1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_line_skipped() {
        let dir = TempDir::new().unwrap();
        {
            let store = PersistentLocalStore::open(dir.path()).await.unwrap();
            store.put_survey(Survey::new("s1", "One")).await.unwrap();
        }
        let path = dir.path().join(LOG_FILE);
        let mut contents = tokio::fs::read_to_string(&path).await.unwrap();
        contents.push_str("{\"op\":\"put_surv");
        tokio::fs::write(&path, contents).await.unwrap();

        let store = PersistentLocalStore::open(dir.path()).await.unwrap();
        assert!(store.get_survey("s1").await.unwrap().is_some());
    }
}
