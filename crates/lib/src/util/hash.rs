//! Hashing utilities for incremental rebuild signatures.
//!
//! - `ContentHash`: a full 64-character SHA-256 hash
//! - `hash_file()`: single file hashing
//! - `hash_bytes()`: arbitrary byte hashing

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

/// A full 64-character SHA-256 hash, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
  #[error("failed to read file {path}: {source}")]
  ReadFile {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to serialize hash input: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// Hash a file's contents, streaming it through the async runtime.
pub async fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let read_err = |source| HashError::ReadFile {
    path: path.display().to_string(),
    source,
  };

  let mut file = tokio::fs::File::open(path).await.map_err(read_err)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).await.map_err(read_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Sha256::digest(data)))
}

/// Hash the JSON serialization of a value.
pub fn hash_json<T: Serialize>(value: &T) -> Result<ContentHash, HashError> {
  Ok(hash_bytes(serde_json::to_string(value)?.as_bytes()))
}
