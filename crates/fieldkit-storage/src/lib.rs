//! # Fieldkit Storage
//!
//! On-device persistence for Fieldkit.
//!
//! ## Features
//!
//! - **InMemoryLocalStore**: `DashMap`-backed [`LocalStore`] for tests and caching
//! - **PersistentLocalStore**: Append-only JSON-lines log replayed on open
//! - **MutationQueue**: Per-target FIFO of local edits awaiting upload, optionally
//!   journaled to disk so queued edits survive a restart
//!
//! ## Example
//!
//! ```rust,ignore
//! use fieldkit_core::{LocalStore, Survey};
//! use fieldkit_storage::InMemoryLocalStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = InMemoryLocalStore::new();
//!     store.put_survey(Survey::new("s1", "Tree census")).await.unwrap();
//!     assert!(store.get_survey("s1").await.unwrap().is_some());
//! }
//! ```

pub mod memory;
pub mod persistent;
pub mod queue;

pub use memory::InMemoryLocalStore;
pub use persistent::PersistentLocalStore;
pub use queue::MutationQueue;

// Re-export the trait for convenience
pub use fieldkit_core::LocalStore;
