//! Persistence of the response cache across runs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use state::StateError;
use state::atomic::{self, LoadOutcome, Loaded};
use tracing::{debug, info, warn};

use crate::{CacheKey, ModelResponse, ResponseCache};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoredEntry {
  key: CacheKey,
  response: ModelResponse,
  size_bytes: usize,
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
  version: u32,
  /// Least recently used first.
  entries: Vec<StoredEntry>,
}

/// Saves and restores a [`ResponseCache`] with atomic writes.
#[derive(Debug, Clone)]
pub struct ResponseStore {
  path: PathBuf,
}

impl ResponseStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn save(&self, cache: &ResponseCache) -> Result<usize, StateError> {
    let entries: Vec<StoredEntry> = cache
      .snapshot()
      .into_iter()
      .map(|(key, response, size_bytes)| StoredEntry {
        key,
        response,
        size_bytes,
      })
      .collect();
    let count = entries.len();
    atomic::write_json(
      &self.path,
      &StoreFile {
        version: FORMAT_VERSION,
        entries,
      },
    )?;
    debug!(path = %self.path.display(), entries = count, "Saved response cache");
    Ok(count)
  }

  /// Re-insert saved entries in their recency order.
  ///
  /// Entries that no longer fit the cache's current limits are evicted or
  /// rejected as with any other insert. A missing or corrupt file leaves the
  /// cache untouched.
  pub fn restore(&self, cache: &ResponseCache) -> LoadOutcome {
    let outcome = match atomic::read_json::<StoreFile>(&self.path) {
      Loaded::Found(file) if file.version == FORMAT_VERSION => {
        let records = file.entries.len();
        for entry in file.entries {
          cache.put(entry.key, entry.response, entry.size_bytes);
        }
        LoadOutcome::Loaded { records }
      }
      Loaded::Found(file) => LoadOutcome::Corrupt {
        reason: format!("unsupported format version {}", file.version),
      },
      Loaded::Missing => LoadOutcome::Missing,
      Loaded::Corrupt(reason) => LoadOutcome::Corrupt { reason },
    };

    match &outcome {
      LoadOutcome::Loaded { records } => info!(
        entries = records,
        cached = cache.len(),
        max_entries = cache.limits().max_entries,
        "Restored response cache"
      ),
      LoadOutcome::Missing => debug!(path = %self.path.display(), "No saved response cache"),
      LoadOutcome::Corrupt { reason } => warn!(
        path = %self.path.display(),
        reason = %reason,
        "Saved response cache unusable, starting empty"
      ),
    }
    outcome
  }
}
