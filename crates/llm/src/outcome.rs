use std::fmt;

use serde::Serialize;

use crate::{ModelError, ModelResponse};

/// Kind of an attempt's (or a call's) result, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
  Success,
  RetryableFailure,
  FatalFailure,
}

impl OutcomeKind {
  pub fn as_str(self) -> &'static str {
    match self {
      OutcomeKind::Success => "success",
      OutcomeKind::RetryableFailure => "retryable_failure",
      OutcomeKind::FatalFailure => "fatal_failure",
    }
  }
}

impl fmt::Display for OutcomeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The error that ended a call, with how many network attempts were made.
///
/// `attempts` is 0 only when the call never reached the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
  pub error: ModelError,
  pub attempts: u32,
}

impl fmt::Display for Failure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} (after {} attempt(s))", self.error, self.attempts)
  }
}

/// Result of [`CallGateway::call`](crate::CallGateway::call).
///
/// A terminal `RetryableFailure` means retries were exhausted; it is still a
/// failure and must be handled by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
  Success(ModelResponse),
  RetryableFailure(Failure),
  FatalFailure(Failure),
}

impl CallOutcome {
  pub fn kind(&self) -> OutcomeKind {
    match self {
      CallOutcome::Success(_) => OutcomeKind::Success,
      CallOutcome::RetryableFailure(_) => OutcomeKind::RetryableFailure,
      CallOutcome::FatalFailure(_) => OutcomeKind::FatalFailure,
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, CallOutcome::Success(_))
  }

  pub fn failure(&self) -> Option<&Failure> {
    match self {
      CallOutcome::Success(_) => None,
      CallOutcome::RetryableFailure(failure) | CallOutcome::FatalFailure(failure) => Some(failure),
    }
  }
}
