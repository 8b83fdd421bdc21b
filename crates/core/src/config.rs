//! Configuration for crosslink with per-project overrides.
//!
//! Config priority: project-relative (.crosslink/config.toml) > user (~/.config/crosslink/config.toml) > defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory (relative to the project root) holding project config and state.
pub const PROJECT_DIR: &str = ".crosslink";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    source: toml::de::Error,
  },
}

// ============================================================================
// Cache Configuration
// ============================================================================

/// Response cache bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Maximum number of cached responses (default: 1024)
  pub max_entries: usize,

  /// Maximum estimated size of all cached responses in bytes (default: 64 MiB)
  pub max_size_bytes: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      max_entries: 1024,
      max_size_bytes: 64 * 1024 * 1024,
    }
  }
}

// ============================================================================
// Retry Configuration
// ============================================================================

/// Retry policy for model calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  /// Total attempts per call, including the first (default: 3)
  pub max_attempts: u32,

  /// Delay before the second attempt in milliseconds (default: 1000)
  pub base_delay_ms: u64,

  /// Upper bound on any single delay in milliseconds (default: 30000)
  pub max_delay_ms: u64,

  /// Exponential factor between delays (default: 2.0)
  pub backoff_multiplier: f64,

  /// Extra random delay as a fraction of the computed delay, 0.0-1.0 (default: 0.25)
  pub jitter_fraction: f64,

  /// Timeout for a single attempt in seconds (default: 120)
  pub attempt_timeout_secs: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay_ms: 1000,
      max_delay_ms: 30_000,
      backoff_multiplier: 2.0,
      jitter_fraction: 0.25,
      attempt_timeout_secs: 120,
    }
  }
}

// ============================================================================
// Model Configuration
// ============================================================================

/// Local model service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
  /// Ollama server URL
  pub url: String,

  /// Model name (e.g., "llama3.1", "qwen2.5:7b")
  pub model: String,

  /// Sampling temperature (default: 0.0)
  pub temperature: f32,

  /// System prompt sent with every categorization request
  pub system_prompt: String,
}

impl Default for ModelConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:11434".to_string(),
      model: "llama3.1".to_string(),
      temperature: 0.0,
      system_prompt: "You categorize markdown notes. Reply with a JSON object containing \
                      \"category\" (string) and \"related\" (array of topic strings)."
        .to_string(),
    }
  }
}

// ============================================================================
// Pipeline Configuration
// ============================================================================

/// Worker pool and discovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Number of parallel workers, i.e. concurrent model calls (default: 2)
  pub workers: usize,

  /// Persist tracker/progress state after this many completed items (default: 1)
  pub checkpoint_every: usize,

  /// File extensions treated as documents
  pub extensions: Vec<String>,

  /// Skip documents larger than this many bytes (default: 1 MiB)
  pub max_file_size: u64,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      workers: 2,
      checkpoint_every: 1,
      extensions: vec!["md".to_string(), "markdown".to_string(), "txt".to_string()],
      max_file_size: 1024 * 1024,
    }
  }
}

impl PipelineConfig {
  pub const MAX_WORKERS: usize = 32;

  /// Worker count clamped to `1..=MAX_WORKERS`.
  pub fn effective_workers(&self) -> usize {
    self.workers.clamp(1, Self::MAX_WORKERS)
  }
}

// ============================================================================
// State Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
  /// Where persisted state lives; relative paths resolve against the project root
  pub directory: PathBuf,
}

impl Default for StateConfig {
  fn default() -> Self {
    Self {
      directory: PathBuf::from(PROJECT_DIR).join("state"),
    }
  }
}

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Log level: error, warn, info, debug, trace (default: info)
  pub level: String,

  /// Rotation for file logs: daily, hourly, never (default: daily)
  pub rotation: String,

  /// Also write logs to a file in the state directory (default: false)
  pub file: bool,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      rotation: "daily".to_string(),
      file: false,
    }
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

/// crosslink configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub cache: CacheConfig,
  pub retry: RetryConfig,
  pub model: ModelConfig,
  pub pipeline: PipelineConfig,
  pub state: StateConfig,
  pub logging: LoggingConfig,
}

impl Config {
  /// Load config for a project, with fallback to user config.
  ///
  /// Unreadable or malformed files are skipped. They are returned alongside
  /// the config so the caller can report them once logging is running.
  pub fn load_for_project(project_path: &Path) -> (Self, Vec<ConfigError>) {
    let mut skipped = Vec::new();

    let project_config = Self::project_config_path(project_path);
    if project_config.exists() {
      match Self::load_from_file(&project_config) {
        Ok(config) => return (config, skipped),
        Err(e) => skipped.push(e),
      }
    }

    if let Some(user_config) = Self::user_config_path()
      && user_config.exists()
    {
      match Self::load_from_file(&user_config) {
        Ok(config) => return (config, skipped),
        Err(e) => skipped.push(e),
      }
    }

    (Self::default(), skipped)
  }

  pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CROSSLINK_CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("crosslink").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("crosslink").join("config.toml"))
  }

  /// Get the project-relative config path
  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(PROJECT_DIR).join("config.toml")
  }

  /// Resolve the state directory for a project.
  pub fn state_dir(&self, project_path: &Path) -> PathBuf {
    if self.state.directory.is_absolute() {
      self.state.directory.clone()
    } else {
      project_path.join(&self.state.directory)
    }
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    let d = Self::default();
    format!(
      r#"# crosslink configuration
# Place in .crosslink/config.toml (project) or ~/.config/crosslink/config.toml (user)

[cache]
# Response cache bounds; least-recently-used responses are evicted first
max_entries = {max_entries}
max_size_bytes = {max_size_bytes}

[retry]
# Total attempts per model call (first attempt included)
max_attempts = {max_attempts}
# Attempt 1 is immediate; attempt n waits min(max_delay, base_delay * multiplier^(n-2)) + jitter
base_delay_ms = {base_delay_ms}
max_delay_ms = {max_delay_ms}
backoff_multiplier = {multiplier:?}
jitter_fraction = {jitter:?}
attempt_timeout_secs = {timeout}

[model]
url = "{url}"
model = "{model}"
temperature = {temperature:?}

[pipeline]
# Concurrent model calls
workers = {workers}
# Persist progress after this many completed documents
checkpoint_every = {checkpoint_every}
extensions = ["md", "markdown", "txt"]
max_file_size = {max_file_size}

[state]
directory = ".crosslink/state"

[logging]
# error, warn, info, debug, trace (RUST_LOG overrides)
level = "{level}"
# daily, hourly, never
rotation = "{rotation}"
file = false
"#,
      max_entries = d.cache.max_entries,
      max_size_bytes = d.cache.max_size_bytes,
      max_attempts = d.retry.max_attempts,
      base_delay_ms = d.retry.base_delay_ms,
      max_delay_ms = d.retry.max_delay_ms,
      multiplier = d.retry.backoff_multiplier,
      jitter = d.retry.jitter_fraction,
      timeout = d.retry.attempt_timeout_secs,
      url = d.model.url,
      model = d.model.model,
      temperature = d.model.temperature,
      workers = d.pipeline.workers,
      checkpoint_every = d.pipeline.checkpoint_every,
      max_file_size = d.pipeline.max_file_size,
      level = d.logging.level,
      rotation = d.logging.rotation,
    )
  }
}
