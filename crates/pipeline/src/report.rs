use std::fmt;
use std::time::Duration;

use llm::{CallOutcome, Failure, GatewayStats};
use serde::Serialize;

/// Why a document did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  /// Transient errors on every attempt.
  RetriesExhausted,
  /// Rejected by the service or the response validator.
  Fatal,
  /// The model answered but the handler could not apply the result.
  Handler,
}

impl fmt::Display for FailureKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      FailureKind::RetriesExhausted => "retries exhausted",
      FailureKind::Fatal => "fatal",
      FailureKind::Handler => "handler",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
  pub path: String,
  pub kind: FailureKind,
  pub message: String,
  pub attempts: u32,
}

impl ItemFailure {
  pub(crate) fn from_outcome(path: &str, outcome: &CallOutcome) -> Option<Self> {
    let (kind, Failure { error, attempts }) = match outcome {
      CallOutcome::Success(_) => return None,
      CallOutcome::RetryableFailure(failure) => (FailureKind::RetriesExhausted, failure),
      CallOutcome::FatalFailure(failure) => (FailureKind::Fatal, failure),
    };
    Some(Self {
      path: path.to_string(),
      kind,
      message: error.to_string(),
      attempts: *attempts,
    })
  }
}

/// Summary of one [`Runner::run`](crate::Runner::run).
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
  /// Distinct documents supplied.
  pub total: usize,
  pub new: usize,
  pub changed: usize,
  pub unchanged: usize,
  /// Completed by this run.
  pub processed: usize,
  pub skipped_unchanged: usize,
  /// Already completed by the interrupted run being resumed.
  pub skipped_completed: usize,
  /// Dispatched but never started because the run was cancelled.
  pub not_started: usize,
  pub failures: Vec<ItemFailure>,
  /// Known paths missing from this run's documents.
  pub deleted: Vec<String>,
  pub cancelled: bool,
  pub gateway: GatewayStats,
  #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
  pub elapsed: Duration,
}

fn as_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

impl RunReport {
  /// Every dispatched document completed and the run was not cancelled.
  pub fn is_complete(&self) -> bool {
    self.failures.is_empty() && !self.cancelled
  }
}

impl fmt::Display for RunReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(
      f,
      "{} documents: {} new, {} changed, {} unchanged",
      self.total, self.new, self.changed, self.unchanged
    )?;
    writeln!(
      f,
      "processed {}, skipped {} unchanged and {} already completed, {} failed",
      self.processed,
      self.skipped_unchanged,
      self.skipped_completed,
      self.failures.len()
    )?;
    writeln!(
      f,
      "model calls: {} cache hits, {} attempts",
      self.gateway.cache_hits, self.gateway.attempts
    )?;
    for failure in &self.failures {
      writeln!(f, "  failed {} ({}): {}", failure.path, failure.kind, failure.message)?;
    }
    for path in &self.deleted {
      writeln!(f, "  deleted {path}")?;
    }
    if self.cancelled {
      writeln!(f, "cancelled with {} documents not started", self.not_started)?;
    }
    write!(f, "took {:.1}s", self.elapsed.as_secs_f64())
  }
}
