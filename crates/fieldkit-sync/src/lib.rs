//! # Fieldkit Sync
//!
//! Offline survey lifecycle, local edits and mutation upload.
//!
//! ## Components
//!
//! - [`SurveyLifecycleManager`]: Syncs surveys down, owns the active-survey slot
//! - [`LocalEdits`]: Applies LOI and submission edits locally and queues mutations
//! - [`MutationUploader`]: Pushes queued mutations to the remote in order
//! - [`SyncStatusAggregator`]: Joins queued mutations with their LOIs for display
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fieldkit_storage::{InMemoryLocalStore, MutationQueue};
//! use fieldkit_sync::{SurveyLifecycleManager, SyncConfig};
//!
//! let queue = Arc::new(MutationQueue::new());
//! let manager = SurveyLifecycleManager::new(remote, local, queue, SyncConfig::from_env()?);
//!
//! if manager.load_and_sync("survey-1").await?.is_some() {
//!     manager.activate("survey-1").await?;
//! }
//! ```

mod cancel;
pub mod config;
pub mod edits;
pub mod error;
pub mod lifecycle;
pub mod status;
pub mod uploader;

pub use config::SyncConfig;
pub use edits::{LocalEdits, LoiDraft};
pub use error::{SyncError, SyncResult};
pub use lifecycle::{
    ActiveSurvey, DocumentSyncReport, LocalSurvey, RejectedDocument, SurveyLifecycleManager,
    SurveyState, SyncedSurvey,
};
pub use status::{SyncStatusAggregator, SyncStatusEntry};
pub use uploader::{MutationUploader, UploadReport};
