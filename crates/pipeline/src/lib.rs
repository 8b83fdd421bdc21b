//! Runs a document set through the model gateway.
//!
//! The [`Runner`] decides per document whether work is needed (via the
//! [`IncrementalTracker`](state::IncrementalTracker)), dispatches the rest to a
//! bounded worker pool, and records each completion so an interrupted run can
//! be resumed. What a document turns into is up to the [`DocumentHandler`].

mod error;
mod handler;
mod report;
mod runner;

#[cfg(test)]
mod __tests__;

pub use error::PipelineError;
pub use handler::DocumentHandler;
pub use report::{FailureKind, ItemFailure, RunReport};
pub use runner::{RunMode, RunOptions, Runner};
