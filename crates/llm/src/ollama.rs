use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ModelError, ModelRequest, ModelService};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// [`ModelService`] backed by Ollama's non-streaming `/api/generate`.
#[derive(Debug, Clone)]
pub struct OllamaService {
  client: reqwest::Client,
  base_url: String,
}

impl Default for OllamaService {
  fn default() -> Self {
    Self::new()
  }
}

impl OllamaService {
  pub fn new() -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: DEFAULT_OLLAMA_URL.to_string(),
    }
  }

  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.base_url = url.into().trim_end_matches('/').to_string();
    self
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  fn generate_url(&self) -> String {
    format!("{}/api/generate", self.base_url)
  }

  fn tags_url(&self) -> String {
    format!("{}/api/tags", self.base_url)
  }

  /// Check that Ollama is reachable and whether `model` is pulled.
  pub async fn check_health(&self, model: &str) -> OllamaHealthStatus {
    let models = match self.client.get(self.tags_url()).timeout(HEALTH_TIMEOUT).send().await {
      Ok(response) if response.status().is_success() => response.json::<TagsResponse>().await.ok(),
      _ => None,
    };

    let Some(tags) = models else {
      return OllamaHealthStatus {
        available: false,
        models: vec![],
        configured_model: model.to_string(),
        configured_model_available: false,
      };
    };

    let models: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
    // "llama3.1" matches "llama3.1:latest"
    let configured_model_available = models
      .iter()
      .any(|m| m == model || m.split(':').next() == Some(model));

    OllamaHealthStatus {
      available: true,
      models,
      configured_model: model.to_string(),
      configured_model_available,
    }
  }
}

/// Health status for Ollama
#[derive(Debug, Clone, Serialize)]
pub struct OllamaHealthStatus {
  pub available: bool,
  pub models: Vec<String>,
  pub configured_model: String,
  pub configured_model_available: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
  #[serde(default)]
  models: Vec<TagInfo>,
}

#[derive(Debug, Deserialize)]
struct TagInfo {
  name: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
  model: &'a str,
  prompt: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  system: Option<&'a str>,
  stream: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  format: Option<&'a serde_json::Value>,
  options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
  response: String,
}

impl<'a> From<&'a ModelRequest> for GenerateRequest<'a> {
  fn from(request: &'a ModelRequest) -> Self {
    Self {
      model: &request.model,
      prompt: &request.prompt,
      system: request.system_prompt.as_deref(),
      stream: false,
      format: request.options.format.as_ref(),
      options: GenerateOptions {
        temperature: request.options.temperature,
        num_predict: request.options.max_tokens,
      },
    }
  }
}

fn classify_transport_error(error: reqwest::Error, timeout: Duration) -> ModelError {
  if error.is_timeout() {
    ModelError::Timeout(timeout)
  } else if error.is_decode() {
    ModelError::InvalidResponse(error.to_string())
  } else if error.is_builder() {
    ModelError::InvalidRequest {
      status: 0,
      message: error.to_string(),
    }
  } else {
    ModelError::Connection(error.to_string())
  }
}

#[async_trait]
impl ModelService for OllamaService {
  fn name(&self) -> &str {
    "ollama"
  }

  async fn invoke(&self, request: &ModelRequest, timeout: Duration) -> Result<String, ModelError> {
    debug!(model = %request.model, prompt_len = request.prompt.len(), "Calling Ollama generate");

    let response = self
      .client
      .post(self.generate_url())
      .timeout(timeout)
      .json(&GenerateRequest::from(request))
      .send()
      .await
      .map_err(|e| classify_transport_error(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(status = status.as_u16(), body = %body, "Ollama generate failed");
      return Err(ModelError::from_status(status.as_u16(), body));
    }

    let result: GenerateResponse = response
      .json()
      .await
      .map_err(|e| classify_transport_error(e, timeout))?;
    Ok(result.response)
  }
}
