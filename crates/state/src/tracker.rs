//! Content-hash based change tracking across runs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use crosslink_core::ContentDigest;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::StateError;
use crate::atomic::{self, LoadOutcome, Loaded};

const FORMAT_VERSION: u32 = 1;

/// How a document compares to the digest recorded in the previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
  Unchanged,
  Changed,
  New,
}

impl Classification {
  pub fn as_str(&self) -> &'static str {
    match self {
      Classification::Unchanged => "unchanged",
      Classification::Changed => "changed",
      Classification::New => "new",
    }
  }

  /// Whether the document has to be processed again.
  pub fn needs_work(&self) -> bool {
    !matches!(self, Classification::Unchanged)
  }
}

impl std::fmt::Display for Classification {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Last known state of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
  pub path: String,
  #[serde(rename = "digest")]
  pub content_digest: ContentDigest,
  pub last_seen_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct TrackerFile {
  version: u32,
  records: Vec<FileRecord>,
}

/// Persisted path -> digest map.
///
/// Records are owned exclusively by the tracker. Callers must only call
/// [`mark_seen`](Self::mark_seen) once the work for a document is durably done,
/// otherwise a crash would leave unfinished work recorded as finished.
pub struct IncrementalTracker {
  path: PathBuf,
  records: Mutex<HashMap<String, FileRecord>>,
  // Serializes snapshot + rename so the newest snapshot is always the one on disk.
  persist_lock: Mutex<()>,
}

impl IncrementalTracker {
  /// Create an empty tracker persisting to `path`. Nothing is read.
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      records: Mutex::new(HashMap::new()),
      persist_lock: Mutex::new(()),
    }
  }

  /// Create a tracker and load any prior state from `path`.
  pub fn open(path: impl Into<PathBuf>) -> (Self, LoadOutcome) {
    let tracker = Self::new(path);
    let outcome = tracker.load();
    (tracker, outcome)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn records(&self) -> MutexGuard<'_, HashMap<String, FileRecord>> {
    self.records.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Replace in-memory state with the persisted map.
  ///
  /// A missing, truncated or unparseable file leaves the tracker empty, so
  /// every document is classified as new.
  pub fn load(&self) -> LoadOutcome {
    let (records, outcome) = match atomic::read_json::<TrackerFile>(&self.path) {
      Loaded::Found(file) if file.version == FORMAT_VERSION => {
        let count = file.records.len();
        let map: HashMap<String, FileRecord> = file.records.into_iter().map(|r| (r.path.clone(), r)).collect();
        (map, LoadOutcome::Loaded { records: count })
      }
      Loaded::Found(file) => {
        let reason = format!("unsupported format version {}", file.version);
        (HashMap::new(), LoadOutcome::Corrupt { reason })
      }
      Loaded::Missing => (HashMap::new(), LoadOutcome::Missing),
      Loaded::Corrupt(reason) => (HashMap::new(), LoadOutcome::Corrupt { reason }),
    };

    match &outcome {
      LoadOutcome::Corrupt { reason } => warn!(
        path = %self.path.display(),
        reason = %reason,
        "Incremental state unusable, reprocessing all documents"
      ),
      LoadOutcome::Missing => debug!(path = %self.path.display(), "No incremental state yet"),
      LoadOutcome::Loaded { records } => debug!(records, "Loaded incremental state"),
    }

    *self.records() = records;
    outcome
  }

  /// Atomically write the map to disk, ordered by path.
  pub fn persist(&self) -> Result<(), StateError> {
    let _guard = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
    let mut records: Vec<FileRecord> = self.records().values().cloned().collect();
    records.sort_by(|a, b| a.path.cmp(&b.path));
    let count = records.len();
    atomic::write_json(
      &self.path,
      &TrackerFile {
        version: FORMAT_VERSION,
        records,
      },
    )?;
    debug!(records = count, "Persisted incremental state");
    Ok(())
  }

  pub fn classify(&self, path: &str, content: impl AsRef<[u8]>) -> Classification {
    self.classify_digest(path, &ContentDigest::of(content))
  }

  pub fn classify_digest(&self, path: &str, digest: &ContentDigest) -> Classification {
    match self.records().get(path) {
      None => Classification::New,
      Some(record) if record.content_digest == *digest => Classification::Unchanged,
      Some(_) => Classification::Changed,
    }
  }

  /// Upsert the record for `path`. Only call once its work is durably complete.
  pub fn mark_seen(&self, path: &str, content: impl AsRef<[u8]>) {
    self.mark_seen_digest(path, ContentDigest::of(content));
  }

  pub fn mark_seen_digest(&self, path: &str, digest: ContentDigest) {
    let record = FileRecord {
      path: path.to_string(),
      content_digest: digest,
      last_seen_at: Utc::now(),
    };
    self.records().insert(path.to_string(), record);
  }

  /// Drop records for every known path not in `seen`, returning them sorted.
  ///
  /// These are the documents deleted since the previous run.
  pub fn reconcile<'a, I>(&self, seen: I) -> Vec<String>
  where
    I: IntoIterator<Item = &'a str>,
  {
    let seen: HashSet<&str> = seen.into_iter().collect();
    let mut records = self.records();
    let mut deleted: Vec<String> = records
      .keys()
      .filter(|path| !seen.contains(path.as_str()))
      .cloned()
      .collect();
    for path in &deleted {
      records.remove(path);
    }
    deleted.sort();
    deleted
  }

  pub fn record(&self, path: &str) -> Option<FileRecord> {
    self.records().get(path).cloned()
  }

  /// Remove one record, so the path is classified as new next time.
  pub fn forget(&self, path: &str) -> bool {
    self.records().remove(path).is_some()
  }

  pub fn len(&self) -> usize {
    self.records().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  fn tracker(temp: &TempDir) -> IncrementalTracker {
    IncrementalTracker::new(temp.path().join("incremental.json"))
  }

  #[test]
  fn test_classify_new_changed_unchanged() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker(&temp);

    assert_eq!(tracker.classify("a.md", "v1"), Classification::New);
    tracker.mark_seen("a.md", "v1");
    assert_eq!(tracker.classify("a.md", "v1"), Classification::Unchanged);
    assert_eq!(tracker.classify("a.md", "v2"), Classification::Changed);
  }

  #[test]
  fn test_edit_then_revert_is_unchanged() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker(&temp);
    tracker.mark_seen("note.md", "original bytes");

    assert_eq!(tracker.classify("note.md", "edited bytes"), Classification::Changed);
    assert_eq!(tracker.classify("note.md", "original bytes"), Classification::Unchanged);
  }

  #[test]
  fn test_classify_does_not_record() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker(&temp);
    tracker.classify("a.md", "v1");
    assert!(tracker.is_empty());
  }

  #[test]
  fn test_reconcile_returns_and_removes_missing() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker(&temp);
    for p in ["a.md", "b.md", "c.md"] {
      tracker.mark_seen(p, p);
    }

    let deleted = tracker.reconcile(["b.md"]);
    assert_eq!(deleted, vec!["a.md".to_string(), "c.md".to_string()]);
    assert_eq!(tracker.len(), 1);
    assert!(tracker.record("b.md").is_some());
    assert_eq!(tracker.classify("a.md", "a.md"), Classification::New);
  }

  #[test]
  fn test_persist_and_load_roundtrip() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker(&temp);
    tracker.mark_seen("b.md", "bee");
    tracker.mark_seen("a.md", "ay");
    tracker.persist().unwrap();

    let (loaded, outcome) = IncrementalTracker::open(temp.path().join("incremental.json"));
    assert_eq!(outcome, LoadOutcome::Loaded { records: 2 });
    assert_eq!(loaded.classify("a.md", "ay"), Classification::Unchanged);
    assert_eq!(loaded.classify("b.md", "changed"), Classification::Changed);
    assert_eq!(loaded.record("a.md"), tracker.record("a.md"));
  }

  #[test]
  fn test_persisted_records_are_ordered_by_path() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker(&temp);
    for p in ["z.md", "m.md", "a.md"] {
      tracker.mark_seen(p, p);
    }
    tracker.persist().unwrap();

    let raw: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(tracker.path()).unwrap()).unwrap();
    let paths: Vec<&str> = raw["records"]
      .as_array()
      .unwrap()
      .iter()
      .map(|r| r["path"].as_str().unwrap())
      .collect();
    assert_eq!(paths, vec!["a.md", "m.md", "z.md"]);
    assert_eq!(raw["version"], 1);
  }

  #[test]
  fn test_load_missing_is_empty() {
    let temp = TempDir::new().unwrap();
    let (tracker, outcome) = IncrementalTracker::open(temp.path().join("incremental.json"));
    assert_eq!(outcome, LoadOutcome::Missing);
    assert!(tracker.is_empty());
  }

  #[test]
  fn test_load_corrupt_is_empty_with_warning() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("incremental.json");
    std::fs::write(&path, "{\"version\": 1, \"records\": [{\"path\": \"a.md\", \"dig").unwrap();

    let (tracker, outcome) = IncrementalTracker::open(&path);
    assert!(matches!(outcome, LoadOutcome::Corrupt { .. }));
    assert!(tracker.is_empty());
    assert_eq!(tracker.classify("a.md", "anything"), Classification::New);
  }

  #[test]
  fn test_load_bad_digest_is_corrupt() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("incremental.json");
    std::fs::write(
      &path,
      r#"{"version": 1, "records": [{"path": "a.md", "digest": "nothex", "last_seen_at": "2024-01-01T00:00:00Z"}]}"#,
    )
    .unwrap();
    let (_, outcome) = IncrementalTracker::open(&path);
    assert!(matches!(outcome, LoadOutcome::Corrupt { .. }));
  }

  #[test]
  fn test_load_unknown_version_is_corrupt() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("incremental.json");
    std::fs::write(&path, r#"{"version": 99, "records": []}"#).unwrap();
    let (_, outcome) = IncrementalTracker::open(&path);
    assert_eq!(
      outcome,
      LoadOutcome::Corrupt {
        reason: "unsupported format version 99".to_string()
      }
    );
  }

  #[test]
  fn test_load_replaces_in_memory_state() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker(&temp);
    tracker.mark_seen("a.md", "a");
    tracker.persist().unwrap();
    tracker.mark_seen("unsaved.md", "x");

    tracker.load();
    assert_eq!(tracker.len(), 1);
    assert!(tracker.record("unsaved.md").is_none());
  }

  #[test]
  fn test_forget() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker(&temp);
    tracker.mark_seen("a.md", "a");
    assert!(tracker.forget("a.md"));
    assert!(!tracker.forget("a.md"));
    assert_eq!(tracker.classify("a.md", "a"), Classification::New);
  }
}
