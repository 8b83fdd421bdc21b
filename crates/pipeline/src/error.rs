use state::StateError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
  #[error("state error: {0}")]
  State(#[from] StateError),
  #[error("handler failed for {path}: {message}")]
  Handler { path: String, message: String },
  #[error("worker task failed: {0}")]
  Worker(#[from] tokio::task::JoinError),
}

impl PipelineError {
  pub fn handler(path: impl Into<String>, message: impl ToString) -> Self {
    PipelineError::Handler {
      path: path.into(),
      message: message.to_string(),
    }
  }
}
