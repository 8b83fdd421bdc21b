use std::time::Duration;

/// Failure of a single model-service invocation.
///
/// Every variant is classified as either transient (retried by the gateway) or
/// fatal (surfaced immediately). Variants carry strings rather than source
/// errors so an outcome can be cloned and shared across waiters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
  #[error("request timed out after {0:?}")]
  Timeout(Duration),
  #[error("connection error: {0}")]
  Connection(String),
  #[error("service overloaded (HTTP {status}): {message}")]
  Overloaded { status: u16, message: String },
  #[error("invalid request (HTTP {status}): {message}")]
  InvalidRequest { status: u16, message: String },
  #[error("authentication rejected (HTTP {status})")]
  Unauthorized { status: u16 },
  #[error("server error (HTTP {status}): {message}")]
  Server { status: u16, message: String },
  #[error("invalid response: {0}")]
  InvalidResponse(String),
}

impl ModelError {
  /// Map a non-success HTTP status to an error.
  pub fn from_status(status: u16, message: impl Into<String>) -> Self {
    let message = message.into();
    match status {
      401 | 403 => ModelError::Unauthorized { status },
      408 | 429 | 502 | 503 | 504 => ModelError::Overloaded { status, message },
      400..=499 => ModelError::InvalidRequest { status, message },
      _ => ModelError::Server { status, message },
    }
  }

  /// Whether another attempt might succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      ModelError::Timeout(_) | ModelError::Connection(_) | ModelError::Overloaded { .. }
    )
  }
}
