//! Content hashing for embedding cache keys

use crate::types::VectorKind;
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex digest identifying one (model version, kind, text) embedding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Cache key: `embed:` followed by the first 32 hex characters.
    pub fn cache_key(&self) -> String {
        format!("embed:{}", &self.0[..32])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute SHA-256 over the model version, kind and trimmed text
///
/// Fields are separated by a NUL byte so no two distinct triples collide
/// on concatenation.
pub fn content_hash(text: &str, kind: VectorKind, model_version: &str) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(model_version.as_bytes());
    hasher.update([0u8]);
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(text.trim().as_bytes());
    let result = hasher.finalize();
    ContentHash(format!("{result:x}"))
}
