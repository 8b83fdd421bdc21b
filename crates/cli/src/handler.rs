//! Categorization handler: asks the model for a category and related topics
//! per document and appends the answer to a JSON Lines results file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crosslink_core::{Document, ModelConfig};
use llm::{ModelRequest, ModelResponse, TypedJsonValidator};
use pipeline::{DocumentHandler, PipelineError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Fields the model must return.
pub const REQUIRED_FIELDS: [&str; 2] = ["category", "related"];

/// Upper bound on document text sent in a prompt.
const MAX_PROMPT_CHARS: usize = 12_000;

/// The model's answer for one document.
#[derive(Debug, Deserialize)]
pub struct Categorization {
  category: String,
  #[serde(default)]
  related: Vec<String>,
}

/// One line of `results.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultLine {
  pub path: String,
  pub digest: String,
  pub category: String,
  pub related: Vec<String>,
  pub processed_at: DateTime<Utc>,
}

pub struct CategorizeHandler {
  model: String,
  system_prompt: String,
  temperature: f32,
  results_path: PathBuf,
  // serializes appends so lines never interleave
  writer: Mutex<()>,
}

impl CategorizeHandler {
  pub fn new(config: &ModelConfig, results_path: impl Into<PathBuf>) -> Self {
    Self {
      model: config.model.clone(),
      system_prompt: config.system_prompt.clone(),
      temperature: config.temperature,
      results_path: results_path.into(),
      writer: Mutex::new(()),
    }
  }

  /// Rejects any response that `apply` could not parse, so it is never cached.
  pub fn validator() -> TypedJsonValidator<Categorization> {
    TypedJsonValidator::new()
  }

  pub fn results_path(&self) -> &Path {
    &self.results_path
  }

  fn response_schema() -> serde_json::Value {
    json!({
      "type": "object",
      "properties": {
        "category": { "type": "string" },
        "related": { "type": "array", "items": { "type": "string" } }
      },
      "required": REQUIRED_FIELDS
    })
  }

  async fn append(&self, line: &ResultLine) -> std::io::Result<()> {
    let mut encoded = serde_json::to_vec(line)?;
    encoded.push(b'\n');

    let _guard = self.writer.lock().await;
    if let Some(parent) = self.results_path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.results_path)
      .await?;
    file.write_all(&encoded).await?;
    file.sync_data().await
  }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
  match text.char_indices().nth(max_chars) {
    Some((index, _)) => &text[..index],
    None => text,
  }
}

#[async_trait]
impl DocumentHandler for CategorizeHandler {
  fn build_request(&self, document: &Document) -> ModelRequest {
    let prompt = format!(
      "Document: {}\n\n{}",
      document.path,
      truncate_chars(&document.content, MAX_PROMPT_CHARS)
    );
    ModelRequest::new(&self.model, prompt)
      .with_system_prompt(&self.system_prompt)
      .with_temperature(self.temperature)
      .with_format(Self::response_schema())
  }

  async fn apply(&self, document: &Document, response: &ModelResponse) -> Result<(), PipelineError> {
    let parsed: Categorization =
      serde_json::from_str(response.text.trim()).map_err(|e| PipelineError::handler(&document.path, e))?;
    let line = ResultLine {
      path: document.path.clone(),
      digest: document.digest().to_hex(),
      category: parsed.category,
      related: parsed.related,
      processed_at: Utc::now(),
    };
    self
      .append(&line)
      .await
      .map_err(|e| PipelineError::handler(&document.path, e))
  }
}

/// Read back every result line, skipping lines that fail to parse.
pub fn read_results(path: &Path) -> std::io::Result<Vec<ResultLine>> {
  let content = match std::fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(e),
  };
  Ok(
    content
      .lines()
      .filter_map(|line| serde_json::from_str(line).ok())
      .collect(),
  )
}
