//! # Fieldkit Core
//!
//! Domain model, capability traits, and errors for the Fieldkit offline-first
//! survey sync stack.
//!
//! ## Key Traits
//!
//! - [`RemoteStore`]: The remote document store (fetch surveys/LOIs, write mutations)
//! - [`LocalStore`]: The on-device store, including the offline-only LOI lookup
//! - [`Clock`] / [`UserContext`]: Timestamp and actor for locally originated edits
//!
//! ## Key Types
//!
//! - [`Survey`], [`Job`], [`Task`]: Survey definitions
//! - [`LocationOfInterest`], [`Submission`]: Collected data
//! - [`Value`]: Closed union of task response kinds
//! - [`Geometry`]: Points and polygons
//! - [`Mutation`]: A pending local edit and its upload state machine
//! - [`RemoteDocument`]: A loosely-typed document as read from the remote

pub mod audit;
pub mod document;
pub mod error;
pub mod fake;
pub mod geometry;
pub mod loi;
pub mod mutation;
pub mod submission;
pub mod survey;
pub mod traits;

// Re-export main types
pub use audit::*;
pub use document::*;
pub use error::*;
pub use geometry::*;
pub use loi::*;
pub use mutation::*;
pub use submission::*;
pub use survey::*;
pub use traits::*;
