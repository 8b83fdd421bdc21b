//! Request and response types for model calls, and the request cache key.

use std::fmt;
use std::mem::size_of;

use cache::SizeEstimate;
use crosslink_core::ContentDigest;
use serde::{Deserialize, Serialize};

/// Bumped whenever the key derivation changes, so stale persisted caches miss.
const KEY_VERSION: &[u8] = b"crosslink-request-v1";

/// Generation parameters that affect the model's output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
  pub temperature: Option<f32>,
  /// Upper bound on generated tokens.
  pub max_tokens: Option<u32>,
  /// JSON schema (or `"json"`) the service should constrain output to.
  pub format: Option<serde_json::Value>,
}

/// A single call to the model service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
  pub model: String,
  pub prompt: String,
  pub system_prompt: Option<String>,
  #[serde(default)]
  pub options: ModelOptions,
}

impl ModelRequest {
  pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
    Self {
      model: model.into(),
      prompt: prompt.into(),
      system_prompt: None,
      options: ModelOptions::default(),
    }
  }

  pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
    self.system_prompt = Some(system_prompt.into());
    self
  }

  pub fn with_temperature(mut self, temperature: f32) -> Self {
    self.options.temperature = Some(temperature);
    self
  }

  pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
    self.options.max_tokens = Some(max_tokens);
    self
  }

  pub fn with_format(mut self, format: serde_json::Value) -> Self {
    self.options.format = Some(format);
    self
  }

  /// Digest over every field that can change the response.
  ///
  /// Optional fields are tagged so that "absent" and "empty" hash differently.
  pub fn cache_key(&self) -> CacheKey {
    fn optional(value: Option<Vec<u8>>) -> Vec<u8> {
      match value {
        Some(mut bytes) => {
          bytes.insert(0, 1);
          bytes
        }
        None => vec![0],
      }
    }

    let parts: [Vec<u8>; 7] = [
      KEY_VERSION.to_vec(),
      self.model.as_bytes().to_vec(),
      optional(self.system_prompt.as_ref().map(|s| s.as_bytes().to_vec())),
      self.prompt.as_bytes().to_vec(),
      optional(self.options.temperature.map(|t| t.to_bits().to_le_bytes().to_vec())),
      optional(self.options.max_tokens.map(|n| n.to_le_bytes().to_vec())),
      // serde_json maps are ordered, so the rendering is canonical
      optional(self.options.format.as_ref().map(|f| f.to_string().into_bytes())),
    ];
    CacheKey(ContentDigest::of_parts(parts))
  }
}

/// Key of the response cache: the digest of a full request payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(pub ContentDigest);

impl fmt::Debug for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "CacheKey({})", self.0.short())
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0.short())
  }
}

impl SizeEstimate for CacheKey {
  fn estimated_size(&self) -> usize {
    self.0.as_bytes().estimated_size()
  }
}

/// A well-formed response from the model service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResponse {
  pub text: String,
  /// Model that produced the response, as reported by the request.
  pub model: String,
}

impl ModelResponse {
  pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      model: model.into(),
    }
  }
}

impl SizeEstimate for ModelResponse {
  fn estimated_size(&self) -> usize {
    size_of::<Self>() + self.text.len() + self.model.len()
  }
}
