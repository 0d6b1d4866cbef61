//! Embedding caches.
//!
//! Two tiers sit in front of the embedding function: a bounded in-process
//! cache ([`LocalCache`]) and a shared cache with a finite TTL
//! ([`SharedCache`]). Both implement [`Cache`]; the generator composes them
//! local-then-shared.

use crate::config::Eviction;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key-value cache of embeddings.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<f32>>, CacheError>;

    /// Store a value. `ttl` of `None` uses the cache's own policy.
    fn set(&self, key: &str, value: Vec<f32>, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Remaining lifetime of a key. `None` when absent or never expiring.
    fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;
}

/// Bounded in-process cache. Entries never expire; the eviction strategy
/// decides which entry goes when the cache is full.
pub struct LocalCache {
    eviction: Eviction,
    entries: Mutex<LruCache<String, Vec<f32>>>,
}

impl LocalCache {
    pub fn new(capacity: usize, eviction: Eviction) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            eviction,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for LocalCache {
    fn get(&self, key: &str) -> Result<Option<Vec<f32>>, CacheError> {
        let mut entries = self.entries.lock();
        // FIFO reads leave the recency order alone
        let hit = match self.eviction {
            Eviction::Lru => entries.get(key),
            Eviction::Fifo => entries.peek(key),
        };
        Ok(hit.cloned())
    }

    fn set(&self, key: &str, value: Vec<f32>, _ttl: Option<Duration>) -> Result<(), CacheError> {
        self.entries.lock().put(key.to_string(), value);
        Ok(())
    }

    fn ttl(&self, _key: &str) -> Result<Option<Duration>, CacheError> {
        Ok(None)
    }
}

/// Process-shared cache with per-entry expiry. Concurrent writers race and
/// the last write wins.
#[derive(Clone)]
pub struct SharedCache {
    entries: Arc<DashMap<String, (Vec<f32>, Instant)>>,
    default_ttl: Duration,
}

impl SharedCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_ttl,
        }
    }
}

impl Cache for SharedCache {
    fn get(&self, key: &str) -> Result<Option<Vec<f32>>, CacheError> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key)
            .map(|entry| (entry.value().0.clone(), entry.value().1));

        match hit {
            Some((value, expires)) if expires > now => Ok(Some(value)),
            Some(_) => {
                self.entries.remove_if(key, |_, (_, expires)| *expires <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Vec<f32>, ttl: Option<Duration>) -> Result<(), CacheError> {
        let expires = Instant::now() + ttl.unwrap_or(self.default_ttl);
        self.entries.insert(key.to_string(), (value, expires));
        Ok(())
    }

    fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .and_then(|entry| entry.value().1.checked_duration_since(now)))
    }
}
