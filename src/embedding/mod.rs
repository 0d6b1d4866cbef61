//! Embedding generation with a two-tier cache keyed by content hash.

mod cache;
mod generator;
mod hash;

pub use cache::{Cache, CacheError, LocalCache, SharedCache};
pub use generator::{CacheStats, EmbeddingGenerator};
pub use hash::{ContentHash, content_hash};
