use serde::{Deserialize, Serialize};

use crate::ContentDigest;

/// A `(path, content)` pair supplied by the document source.
///
/// `path` is an opaque identifier (usually the path relative to the project
/// root, with `/` separators). The core never touches the filesystem through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
  pub path: String,
  pub content: String,
}

impl Document {
  pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      content: content.into(),
    }
  }

  pub fn digest(&self) -> ContentDigest {
    ContentDigest::of(&self.content)
  }

  /// Content length in bytes.
  pub fn len(&self) -> usize {
    self.content.len()
  }

  pub fn is_empty(&self) -> bool {
    self.content.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_digest_ignores_path() {
    let a = Document::new("notes/a.md", "same body");
    let b = Document::new("notes/b.md", "same body");
    assert_eq!(a.digest(), b.digest());
  }
}
