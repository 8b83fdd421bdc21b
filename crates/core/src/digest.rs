//! Content digests used for change detection and cache keys.
//!
//! A [`ContentDigest`] is the SHA-256 of some bytes. It is a pure function of
//! the input, so a document edited and then reverted to its original bytes
//! produces the original digest again.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Length of a digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Fixed-size SHA-256 digest of document content or a request payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
  /// Digest of a single byte string.
  pub fn of(content: impl AsRef<[u8]>) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(content.as_ref());
    Self(hasher.finalize().into())
  }

  /// Digest over several fields.
  ///
  /// Each part is prefixed with its length, so `["ab", "c"]` and `["a", "bc"]`
  /// never collide.
  pub fn of_parts<I, P>(parts: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: AsRef<[u8]>,
  {
    let mut hasher = Sha256::new();
    for part in parts {
      let bytes = part.as_ref();
      hasher.update((bytes.len() as u64).to_le_bytes());
      hasher.update(bytes);
    }
    Self(hasher.finalize().into())
  }

  pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
    &self.0
  }

  /// Lowercase hex rendering (64 chars).
  pub fn to_hex(&self) -> String {
    hex::encode(self.0)
  }

  /// First 12 hex chars, for log lines.
  pub fn short(&self) -> String {
    hex::encode(&self.0[..6])
  }
}

impl fmt::Display for ContentDigest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_hex())
  }
}

impl fmt::Debug for ContentDigest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ContentDigest({})", self.short())
  }
}

/// Error returned when parsing a digest from hex.
#[derive(Debug, thiserror::Error)]
pub enum DigestParseError {
  #[error("invalid hex: {0}")]
  Hex(#[from] hex::FromHexError),
  #[error("expected {DIGEST_LEN} bytes, got {0}")]
  Length(usize),
}

impl FromStr for ContentDigest {
  type Err = DigestParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let bytes = hex::decode(s)?;
    let len = bytes.len();
    let array: [u8; DIGEST_LEN] = bytes.try_into().map_err(|_| DigestParseError::Length(len))?;
    Ok(Self(array))
  }
}

impl Serialize for ContentDigest {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_hex())
  }
}

impl<'de> Deserialize<'de> for ContentDigest {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}
