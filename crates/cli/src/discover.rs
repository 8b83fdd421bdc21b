//! Document discovery.

use std::path::{Path, PathBuf};

use crosslink_core::{Document, PipelineConfig};
use ignore::WalkBuilder;
use tracing::{debug, warn};

fn has_extension(path: &Path, extensions: &[String]) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Identifier of a document: its path relative to `root`, `/`-separated.
pub fn document_id(root: &Path, path: &Path) -> String {
  let relative = path.strip_prefix(root).unwrap_or(path);
  relative
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

/// Collect files under `root` matching the configured extensions.
///
/// Respects `.gitignore` and skips hidden entries (which includes the
/// `.crosslink` state directory). Sorted by path.
pub fn scan(root: &Path, config: &PipelineConfig) -> Vec<PathBuf> {
  let walker = WalkBuilder::new(root)
    .hidden(true)
    .git_ignore(true)
    .git_global(true)
    .git_exclude(true)
    .max_filesize(Some(config.max_file_size))
    .build();

  let mut files: Vec<PathBuf> = walker
    .flatten()
    .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
    .map(|entry| entry.into_path())
    .filter(|path| has_extension(path, &config.extensions))
    .collect();
  files.sort();
  files
}

/// Read every discovered file; unreadable or non-UTF-8 files are skipped.
pub fn discover_documents(root: &Path, config: &PipelineConfig) -> Vec<Document> {
  let files = scan(root, config);
  debug!(root = %root.display(), files = files.len(), "Scanned for documents");

  files
    .into_iter()
    .filter_map(|path| match std::fs::read_to_string(&path) {
      Ok(content) => Some(Document::new(document_id(root, &path), content)),
      Err(e) => {
        warn!(path = %path.display(), err = %e, "Skipping unreadable document");
        None
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  fn write(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
  }

  #[test]
  fn test_discovers_matching_documents() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "a.md", b"# A");
    write(root, "nested/b.MARKDOWN", b"# B");
    write(root, "nested/c.rs", b"fn main() {}");
    write(root, ".crosslink/state/results.md", b"state");
    write(root, "binary.txt", &[0xff, 0xfe, 0x00]);

    let docs = discover_documents(root, &PipelineConfig::default());
    let paths: Vec<&str> = docs.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(paths, vec!["a.md", "nested/b.MARKDOWN"]);
    assert_eq!(docs[0].content, "# A");
  }

  #[test]
  fn test_respects_max_file_size() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "big.md", &[b'x'; 2048]);
    write(temp.path(), "small.md", b"ok");

    let config = PipelineConfig {
      max_file_size: 1024,
      ..Default::default()
    };
    let files = scan(temp.path(), &config);
    assert_eq!(files, vec![temp.path().join("small.md")]);
  }
}
