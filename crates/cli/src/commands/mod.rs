//! CLI command implementations

mod config;
mod health;
mod reset;
mod run;
mod status;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use crosslink_core::{Config, ConfigError};
use tracing::warn;

pub use config::{cmd_config_init, cmd_config_show};
pub use health::cmd_health;
pub use reset::cmd_reset;
pub use run::{RunArgs, cmd_run};
pub use status::cmd_status;

/// A project directory with its effective config and state file locations.
pub struct Project {
  pub root: PathBuf,
  pub config: Config,
  pub state_dir: PathBuf,
  /// Config files that were found but could not be used.
  pub skipped_configs: Vec<ConfigError>,
}

impl Project {
  /// Open the project at `dir`, or the current directory.
  pub fn open(dir: Option<&Path>) -> Result<Self> {
    let root = match dir {
      Some(dir) => dir.to_path_buf(),
      None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let root = root
      .canonicalize()
      .with_context(|| format!("project directory {} not found", root.display()))?;
    let (config, skipped_configs) = Config::load_for_project(&root);
    let state_dir = config.state_dir(&root);
    Ok(Self {
      root,
      config,
      state_dir,
      skipped_configs,
    })
  }

  /// Log every config file that was skipped. Call after logging is initialized.
  pub fn warn_skipped_configs(&self) {
    for error in &self.skipped_configs {
      warn!(error = %error, "Ignoring config file, using defaults");
    }
  }

  pub fn tracker_path(&self) -> PathBuf {
    self.state_dir.join("tracker.json")
  }

  pub fn progress_path(&self) -> PathBuf {
    self.state_dir.join("progress.json")
  }

  pub fn responses_path(&self) -> PathBuf {
    self.state_dir.join("responses.json")
  }

  pub fn results_path(&self) -> PathBuf {
    self.state_dir.join("results.jsonl")
  }

  pub fn log_dir(&self) -> PathBuf {
    self.state_dir.join("logs")
  }
}
