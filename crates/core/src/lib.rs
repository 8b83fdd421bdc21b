//! Shared building blocks for crosslink: content digests, the document type
//! handed in by the document source, and configuration.

pub mod config;
mod digest;
mod document;

pub use config::{
  CacheConfig, Config, ConfigError, LoggingConfig, ModelConfig, PROJECT_DIR, PipelineConfig, RetryConfig, StateConfig,
};
pub use digest::{ContentDigest, DIGEST_LEN, DigestParseError};
pub use document::Document;
