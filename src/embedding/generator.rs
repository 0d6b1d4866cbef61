//! Cached text-to-vector generation.

use crate::config::Settings;
use crate::embedding::{Cache, LocalCache, SharedCache, content_hash};
use crate::error::{MatchError, MatchResult};
use crate::types::VectorKind;
use crate::vector::{EmbeddingFunction, VectorDimension};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Hit and miss counters since the generator was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub local_hits: u64,
    pub shared_hits: u64,
    pub misses: u64,
    pub cache_errors: u64,
}

#[derive(Default)]
struct Counters {
    local_hits: AtomicU64,
    shared_hits: AtomicU64,
    misses: AtomicU64,
    cache_errors: AtomicU64,
}

/// Turns profile text into vectors through the fast cache, then the shared
/// cache, then the embedding function.
///
/// Cache failures are logged and treated as misses; they never fail
/// [`EmbeddingGenerator::embed`].
pub struct EmbeddingGenerator {
    function: Arc<dyn EmbeddingFunction>,
    local: Arc<dyn Cache>,
    shared: Option<Arc<dyn Cache>>,
    model_version: String,
    shared_ttl: Duration,
    counters: Counters,
}

impl EmbeddingGenerator {
    pub fn new(
        function: Arc<dyn EmbeddingFunction>,
        local: Arc<dyn Cache>,
        shared: Option<Arc<dyn Cache>>,
        model_version: impl Into<String>,
        shared_ttl: Duration,
    ) -> Self {
        Self {
            function,
            local,
            shared,
            model_version: model_version.into(),
            shared_ttl,
            counters: Counters::default(),
        }
    }

    /// Build both cache tiers from settings around `function`.
    pub fn from_settings(function: Arc<dyn EmbeddingFunction>, settings: &Settings) -> Self {
        let ttl = Duration::from_secs(settings.cache.shared_ttl_secs);
        let local: Arc<dyn Cache> = Arc::new(LocalCache::new(
            settings.cache.local_capacity,
            settings.cache.eviction,
        ));
        let shared: Option<Arc<dyn Cache>> = settings
            .cache
            .shared_enabled
            .then(|| Arc::new(SharedCache::new(ttl)) as Arc<dyn Cache>);

        Self::new(
            function,
            local,
            shared,
            settings.embedding.model_version.clone(),
            ttl,
        )
    }

    pub fn dimension(&self) -> VectorDimension {
        self.function.dimension()
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// Embed `text` as a `kind` vector.
    ///
    /// # Errors
    /// `EmptyInput` when the text is blank after trimming,
    /// `EmbeddingUnavailable` when the embedding function fails.
    pub fn embed(&self, text: &str, kind: VectorKind) -> MatchResult<Vec<f32>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MatchError::EmptyInput { kind });
        }

        let key = content_hash(text, kind, &self.model_version).cache_key();

        if let Some(hit) = self.read(self.local.as_ref(), &key, "local") {
            self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }

        if let Some(shared) = &self.shared {
            if let Some(hit) = self.read(shared.as_ref(), &key, "shared") {
                self.counters.shared_hits.fetch_add(1, Ordering::Relaxed);
                self.write(self.local.as_ref(), &key, &hit, None, "local");
                return Ok(hit);
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(%kind, key = %key, "embedding cache miss");

        let vector = self
            .function
            .generate_embeddings(&[text])
            .map_err(|e| MatchError::EmbeddingUnavailable {
                reason: e.to_string(),
            })?
            .into_iter()
            .next()
            .ok_or_else(|| MatchError::EmbeddingUnavailable {
                reason: "embedding function returned no vector".to_string(),
            })?;
        self.function.dimension().validate_vector(&vector)?;

        self.write(self.local.as_ref(), &key, &vector, None, "local");
        if let Some(shared) = &self.shared {
            self.write(shared.as_ref(), &key, &vector, Some(self.shared_ttl), "shared");
        }

        Ok(vector)
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            shared_hits: self.counters.shared_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            cache_errors: self.counters.cache_errors.load(Ordering::Relaxed),
        }
    }

    fn read(&self, cache: &dyn Cache, key: &str, tier: &'static str) -> Option<Vec<f32>> {
        match cache.get(key) {
            Ok(hit) => hit,
            Err(e) => {
                self.counters.cache_errors.fetch_add(1, Ordering::Relaxed);
                warn!(tier, key, error = %e, "embedding cache read failed, treating as miss");
                None
            }
        }
    }

    fn write(
        &self,
        cache: &dyn Cache,
        key: &str,
        value: &[f32],
        ttl: Option<Duration>,
        tier: &'static str,
    ) {
        if let Err(e) = cache.set(key, value.to_vec(), ttl) {
            self.counters.cache_errors.fetch_add(1, Ordering::Relaxed);
            warn!(tier, key, error = %e, "embedding cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Eviction;
    use crate::embedding::CacheError;
    use crate::vector::{HashingEmbedder, VectorError};
    use std::sync::atomic::AtomicUsize;

    struct CountingFunction {
        inner: HashingEmbedder,
        calls: AtomicUsize,
    }

    impl EmbeddingFunction for CountingFunction {
        fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.generate_embeddings(texts)
        }

        fn dimension(&self) -> VectorDimension {
            self.inner.dimension()
        }
    }

    struct BrokenCache;

    impl Cache for BrokenCache {
        fn get(&self, _key: &str) -> Result<Option<Vec<f32>>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        fn set(&self, _: &str, _: Vec<f32>, _: Option<Duration>) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        fn ttl(&self, _key: &str) -> Result<Option<Duration>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    fn counting() -> Arc<CountingFunction> {
        Arc::new(CountingFunction {
            inner: HashingEmbedder::new(VectorDimension::new(32).unwrap()),
            calls: AtomicUsize::new(0),
        })
    }

    fn generator_with(function: Arc<CountingFunction>, shared: Option<Arc<dyn Cache>>) -> EmbeddingGenerator {
        EmbeddingGenerator::new(
            function,
            Arc::new(LocalCache::new(8, Eviction::Lru)),
            shared,
            "test@1",
            Duration::from_secs(60),
        )
    }

    #[test]
    fn empty_text_is_rejected() {
        let generator = generator_with(counting(), None);
        let err = generator.embed("   \n\t", VectorKind::Offerings).unwrap_err();
        assert!(matches!(err, MatchError::EmptyInput { kind: VectorKind::Offerings }));
    }

    #[test]
    fn second_call_hits_local_cache() {
        let function = counting();
        let generator = generator_with(function.clone(), None);

        let first = generator.embed("seed stage fintech", VectorKind::Requirements).unwrap();
        let second = generator.embed("  seed stage fintech ", VectorKind::Requirements).unwrap();

        assert_eq!(first, second);
        assert_eq!(function.calls.load(Ordering::SeqCst), 1);
        let stats = generator.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.local_hits, 1);
    }

    #[test]
    fn shared_cache_serves_a_fresh_generator() {
        let shared: Arc<dyn Cache> = Arc::new(SharedCache::new(Duration::from_secs(60)));
        let function = counting();

        let warm = generator_with(function.clone(), Some(shared.clone()));
        let a = warm.embed("angel investor", VectorKind::Offerings).unwrap();

        let cold = generator_with(function.clone(), Some(shared));
        let b = cold.embed("angel investor", VectorKind::Offerings).unwrap();

        assert_eq!(a, b);
        assert_eq!(function.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cold.cache_stats().shared_hits, 1);
    }

    #[test]
    fn broken_caches_do_not_fail_embed() {
        let function = counting();
        let generator = EmbeddingGenerator::new(
            function.clone(),
            Arc::new(BrokenCache),
            Some(Arc::new(BrokenCache) as Arc<dyn Cache>),
            "test@1",
            Duration::from_secs(60),
        );

        let a = generator.embed("growth marketing", VectorKind::Skills).unwrap();
        let b = generator.embed("growth marketing", VectorKind::Skills).unwrap();

        assert_eq!(a, b);
        assert_eq!(function.calls.load(Ordering::SeqCst), 2);
        assert!(generator.cache_stats().cache_errors >= 4);
    }

    #[test]
    fn kind_is_part_of_the_cache_key() {
        let function = counting();
        let generator = generator_with(function.clone(), None);
        generator.embed("fintech", VectorKind::Industry).unwrap();
        generator.embed("fintech", VectorKind::Skills).unwrap();
        assert_eq!(function.calls.load(Ordering::SeqCst), 2);
    }
}
