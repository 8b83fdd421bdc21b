use std::time::Duration;

use async_trait::async_trait;

use crate::{ModelError, ModelRequest};

/// A remote model that turns a request into response text.
///
/// Implementations make exactly one attempt per call; retries, caching and
/// validation belong to [`CallGateway`](crate::CallGateway). `timeout` is the
/// per-attempt timeout, which implementations should also pass to their
/// transport so a hung connection is torn down.
#[async_trait]
pub trait ModelService: Send + Sync {
  /// Name for logging.
  fn name(&self) -> &str;

  async fn invoke(&self, request: &ModelRequest, timeout: Duration) -> Result<String, ModelError>;
}
