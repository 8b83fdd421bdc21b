//! Run progress checkpoints.
//!
//! Records which paths finished in the current run so a killed run can be
//! restarted with [`ProgressStore::resume`] and skip them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::StateError;
use crate::atomic::{self, LoadOutcome, Loaded};

const FORMAT_VERSION: u32 = 1;

/// Completed paths of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
  pub run_started_at: DateTime<Utc>,
  #[serde(rename = "completed")]
  pub completed_paths: BTreeSet<String>,
}

impl ProgressState {
  fn fresh() -> Self {
    Self {
      run_started_at: Utc::now(),
      completed_paths: BTreeSet::new(),
    }
  }
}

#[derive(Serialize, Deserialize)]
struct ProgressFile {
  version: u32,
  #[serde(flatten)]
  state: ProgressState,
}

pub struct ProgressStore {
  path: PathBuf,
  state: Mutex<ProgressState>,
  persist_lock: Mutex<()>,
}

impl ProgressStore {
  /// Create a store with an empty in-memory state. Nothing is read or written.
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      state: Mutex::new(ProgressState::fresh()),
      persist_lock: Mutex::new(()),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn state(&self) -> MutexGuard<'_, ProgressState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Begin a non-resumed run: clear completed paths and overwrite the checkpoint.
  ///
  /// Persisting immediately means a crash before the first checkpoint cannot
  /// resume against a stale set from an older run.
  pub fn start_fresh(&self) -> Result<(), StateError> {
    *self.state() = ProgressState::fresh();
    info!(path = %self.path.display(), "Starting fresh run");
    self.persist()
  }

  /// Continue the run recorded on disk.
  ///
  /// A missing or corrupt checkpoint starts an empty run instead of failing.
  pub fn resume(&self) -> LoadOutcome {
    let (state, outcome) = match atomic::read_json::<ProgressFile>(&self.path) {
      Loaded::Found(file) if file.version == FORMAT_VERSION => {
        let count = file.state.completed_paths.len();
        (file.state, LoadOutcome::Loaded { records: count })
      }
      Loaded::Found(file) => {
        let reason = format!("unsupported format version {}", file.version);
        (ProgressState::fresh(), LoadOutcome::Corrupt { reason })
      }
      Loaded::Missing => (ProgressState::fresh(), LoadOutcome::Missing),
      Loaded::Corrupt(reason) => (ProgressState::fresh(), LoadOutcome::Corrupt { reason }),
    };

    match &outcome {
      LoadOutcome::Loaded { records } => info!(
        completed = records,
        run_started_at = %state.run_started_at,
        "Resuming run"
      ),
      LoadOutcome::Missing => info!("No checkpoint found, starting from scratch"),
      LoadOutcome::Corrupt { reason } => warn!(
        path = %self.path.display(),
        reason = %reason,
        "Checkpoint unusable, starting from scratch"
      ),
    }

    *self.state() = state;
    outcome
  }

  pub fn is_completed(&self, path: &str) -> bool {
    self.state().completed_paths.contains(path)
  }

  /// Record `path` as done. Returns `false` if it already was (no-op).
  pub fn mark_completed(&self, path: &str) -> bool {
    let inserted = self.state().completed_paths.insert(path.to_string());
    if !inserted {
      debug!(path, "Path already completed");
    }
    inserted
  }

  pub fn completed_count(&self) -> usize {
    self.state().completed_paths.len()
  }

  pub fn snapshot(&self) -> ProgressState {
    self.state().clone()
  }

  /// Atomically write the checkpoint.
  pub fn persist(&self) -> Result<(), StateError> {
    let _guard = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
    let state = self.snapshot();
    atomic::write_json(
      &self.path,
      &ProgressFile {
        version: FORMAT_VERSION,
        state,
      },
    )
  }

  /// Delete the checkpoint after a run finished successfully.
  pub fn discard(&self) -> Result<(), StateError> {
    let _guard = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
    *self.state() = ProgressState::fresh();
    atomic::remove(&self.path)?;
    debug!(path = %self.path.display(), "Discarded checkpoint");
    Ok(())
  }
}
