//! Persisted run state.
//!
//! - [`IncrementalTracker`]: path -> content digest map carried across runs,
//!   used to classify documents as new, changed or unchanged and to detect deletions
//! - [`ProgressStore`]: set of paths completed in the current run, the checkpoint
//!   that lets an interrupted run resume
//!
//! Both write through [`atomic::write_json`] (temp file + rename), and both treat
//! a missing or unreadable file as "no prior state" rather than an error.

pub mod atomic;
mod error;
mod progress;
mod tracker;

pub use atomic::LoadOutcome;
pub use error::StateError;
pub use progress::{ProgressState, ProgressStore};
pub use tracker::{Classification, FileRecord, IncrementalTracker};
