//! Write-then-rename persistence.
//!
//! A state file is first written in full to a uniquely named sibling temp file,
//! synced, and then renamed over the target. The parent directory is synced
//! after the rename so the new entry survives a power loss. Readers see either
//! the previous file or the new one, never a partial write.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::StateError;

/// Result of loading a state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
  /// Prior state was read; `records` is the number of items restored.
  Loaded { records: usize },
  /// No state file exists yet.
  Missing,
  /// The file exists but could not be used; state starts empty.
  Corrupt { reason: String },
}

/// Raw result of reading a JSON state file.
pub enum Loaded<T> {
  Found(T),
  Missing,
  Corrupt(String),
}

fn temp_path_for(path: &Path) -> PathBuf {
  let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("state");
  path.with_file_name(format!(".{}.tmp-{}", name, uuid::Uuid::new_v4()))
}

/// Atomically replace `path` with `bytes`.
pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), StateError> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
  }

  let temp_path = temp_path_for(path);
  let write = || -> std::io::Result<()> {
    let mut file = File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()
  };
  if let Err(e) = write() {
    let _ = fs::remove_file(&temp_path);
    return Err(StateError::io(&temp_path, e));
  }

  if let Err(e) = fs::rename(&temp_path, path) {
    let _ = fs::remove_file(&temp_path);
    return Err(StateError::io(path, e));
  }
  sync_parent_dir(path)
}

fn parent_dir(path: &Path) -> &Path {
  match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  }
}

/// Flush the directory entry for `path` so a completed rename is durable.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<(), StateError> {
  let dir = parent_dir(path);
  File::open(dir)
    .and_then(|handle| handle.sync_all())
    .map_err(|e| StateError::io(dir, e))
}

// Directory handles cannot be synced portably; the rename itself is the commit point.
#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<(), StateError> {
  Ok(())
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
  let json = serde_json::to_vec_pretty(value)?;
  write_bytes(path, &json)
}

/// Read and parse a JSON state file without failing on absence or corruption.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Loaded<T> {
  let bytes = match fs::read(path) {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Loaded::Missing,
    Err(e) => return Loaded::Corrupt(format!("unreadable: {e}")),
  };
  match serde_json::from_slice(&bytes) {
    Ok(value) => Loaded::Found(value),
    Err(e) => Loaded::Corrupt(format!("unparseable: {e}")),
  }
}

/// Remove a state file; a file that is already gone is not an error.
pub fn remove(path: &Path) -> Result<(), StateError> {
  match fs::remove_file(path) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(StateError::io(path, e)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_write_creates_parent_dirs() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("deeply").join("nested").join("state.json");
    write_json(&path, &vec![1, 2, 3]).unwrap();
    assert!(path.exists());
  }

  #[test]
  fn test_write_replaces_and_leaves_no_temp_files() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state.json");
    write_json(&path, &"first").unwrap();
    write_json(&path, &"second").unwrap();

    let Loaded::Found(value) = read_json::<String>(&path) else {
      panic!("expected state to load");
    };
    assert_eq!(value, "second");

    let entries: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
  }

  #[cfg(unix)]
  #[test]
  fn test_sync_parent_dir() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state.json");
    assert_eq!(parent_dir(&path), temp.path());
    assert_eq!(parent_dir(Path::new("state.json")), Path::new("."));

    sync_parent_dir(&path).unwrap();
    assert!(matches!(
      sync_parent_dir(&temp.path().join("missing").join("state.json")),
      Err(StateError::Io { .. })
    ));
  }

  #[test]
  fn test_read_missing() {
    let temp = TempDir::new().unwrap();
    assert!(matches!(read_json::<String>(&temp.path().join("nope.json")), Loaded::Missing));
  }

  #[test]
  fn test_read_truncated_is_corrupt() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state.json");
    fs::write(&path, "{\"records\": [").unwrap();
    assert!(matches!(read_json::<serde_json::Value>(&path), Loaded::Corrupt(_)));
  }

  #[test]
  fn test_remove_missing_is_ok() {
    let temp = TempDir::new().unwrap();
    remove(&temp.path().join("gone.json")).unwrap();
  }
}
