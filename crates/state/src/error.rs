use std::path::PathBuf;

/// Errors raised while writing persisted state.
///
/// Loading never produces these: a missing or corrupt file is reported as a
/// [`LoadOutcome`](crate::LoadOutcome) and treated as empty state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
  #[error("state I/O error at {path}: {source}")]
  Io { path: PathBuf, source: std::io::Error },

  #[error("failed to serialize state: {0}")]
  Serialize(#[from] serde_json::Error),
}

impl StateError {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    StateError::Io {
      path: path.into(),
      source,
    }
  }
}
