use async_trait::async_trait;
use crosslink_core::Document;
use llm::{ModelRequest, ModelResponse};

use crate::PipelineError;

/// What the pipeline does with each document.
///
/// `apply` must be durable when it returns `Ok`: right after it, the document
/// is marked as seen and completed, and a crash from then on will not
/// process it again.
#[async_trait]
pub trait DocumentHandler: Send + Sync {
  fn build_request(&self, document: &Document) -> ModelRequest;

  async fn apply(&self, document: &Document, response: &ModelResponse) -> Result<(), PipelineError>;
}
