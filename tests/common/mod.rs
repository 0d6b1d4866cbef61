//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use reciprocity::config::{EmbeddingBackend, Settings};
use reciprocity::error::{MatchError, MatchResult};
use reciprocity::notify::{Notification, PairNotice};
use reciprocity::types::VectorKind;
use reciprocity::vector::VectorDimension;
use reciprocity::{
    Answer, InMemoryMatchStore, InMemoryVectorStore, MatchEngine, MatchRecord, MatchStore,
    MatchType, PairKey, ProfileVector, RecordingSink, Registration, UserId, VectorStore,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

/// Hashing embeddings, everything matches everything, no required floor.
pub fn test_settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.state_path = dir.path().join("state.json");
    settings.embedding.backend = EmbeddingBackend::Hashing;
    settings.embedding.hashing_dimension = 128;
    settings.matching.min_threshold = 0.0;
    settings.matching.required.clear();
    settings.batch.retry_backoff_ms = 1;
    settings.notification.backoff_ms = 1;
    settings
}

pub fn registration(user: &str, needs: &str, offers: &str) -> Registration {
    Registration {
        user_id: UserId::from(user),
        label: Some(format!("{user} (test)")),
        answers: vec![
            Answer::new("What are you looking for?", needs),
            Answer::new("What can you offer?", offers),
        ],
    }
}

const NEEDS: [&str; 10] = [
    "seed funding for a climate startup",
    "a rust mentor for systems work",
    "design partner for a fintech app",
    "hiring senior backend engineers",
    "introductions to hospital buyers",
    "growth marketing advice",
    "a cofounder with sales experience",
    "cloud credits and infrastructure help",
    "legal help with a data licence",
    "feedback on a pitch deck",
];

const OFFERS: [&str; 10] = [
    "angel investment in early stage climate",
    "systems programming mentorship in rust",
    "product design reviews for fintech",
    "backend engineering contracts",
    "healthcare procurement network",
    "performance marketing playbooks",
    "enterprise sales leadership",
    "infrastructure consulting on aws",
    "data licensing legal counsel",
    "pitch coaching for founders",
];

/// An engine on the in-memory adapters with a recording sink.
pub struct TestWorld {
    pub dir: TempDir,
    pub settings: Settings,
    pub engine: MatchEngine,
    pub sink: RecordingSink,
    pub vectors: FlakyVectorStore,
    pub matches: FlakyMatchStore,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(adjust: impl FnOnce(&mut Settings)) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let mut settings = test_settings(&dir);
        adjust(&mut settings);

        let sink = RecordingSink::new();
        let vectors = FlakyVectorStore::new();
        let matches = FlakyMatchStore::new();
        let engine = MatchEngine::builder(settings.clone())
            .notification_sink(Arc::new(sink.clone()))
            .vector_store(Arc::new(vectors.clone()))
            .match_store(Arc::new(matches.clone()))
            .build()
            .expect("engine builds");
        Self {
            dir,
            settings,
            engine,
            sink,
            vectors,
            matches,
        }
    }

    /// Register `count` users named `{prefix}{i}` with distinct answers.
    pub fn register_many(&self, prefix: &str, count: usize) -> Vec<UserId> {
        (0..count)
            .map(|i| {
                let user = format!("{prefix}{i}");
                self.engine
                    .register(registration(
                        &user,
                        NEEDS[i % NEEDS.len()],
                        OFFERS[(i + 1) % OFFERS.len()],
                    ))
                    .expect("registration accepted");
                UserId::from(user)
            })
            .collect()
    }

    pub fn dirty(&self) -> Vec<UserId> {
        self.engine
            .accounts()
            .dirty_users()
            .expect("dirty users")
            .into_iter()
            .map(|(user, _)| user)
            .collect()
    }

    pub fn batch_notifications(&self) -> Vec<Vec<PairNotice>> {
        self.sink
            .delivered()
            .into_iter()
            .filter_map(|notification| match notification {
                Notification::Batch(payload) => Some(payload.pairs),
                _ => None,
            })
            .collect()
    }
}

fn unavailable(store: &'static str, operation: &str) -> MatchError {
    MatchError::StoreUnavailable {
        store,
        operation: operation.to_string(),
        reason: "connection refused".to_string(),
    }
}

/// In-memory vector store that can be switched off: `set_down` fails
/// queries only, `set_offline` fails every call.
#[derive(Clone, Default)]
pub struct FlakyVectorStore {
    inner: InMemoryVectorStore,
    down: Arc<AtomicBool>,
    offline: Arc<AtomicBool>,
}

impl FlakyVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self, operation: &str) -> MatchResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(unavailable("vector", operation));
        }
        Ok(())
    }
}

impl VectorStore for FlakyVectorStore {
    fn upsert(&self, vector: ProfileVector) -> MatchResult<()> {
        self.check("upsert")?;
        self.inner.upsert(vector)
    }

    fn get(&self, user: &UserId, kind: VectorKind) -> MatchResult<Option<ProfileVector>> {
        self.check("get")?;
        self.inner.get(user, kind)
    }

    fn vectors_for(&self, user: &UserId) -> MatchResult<BTreeMap<VectorKind, ProfileVector>> {
        self.check("vectors_for")?;
        self.inner.vectors_for(user)
    }

    fn query(
        &self,
        kind: VectorKind,
        query: &[f32],
        limit: Option<usize>,
        exclude: Option<&UserId>,
    ) -> MatchResult<Vec<(UserId, f64)>> {
        self.check("query")?;
        if self.down.load(Ordering::SeqCst) {
            return Err(unavailable("vector", "query"));
        }
        self.inner.query(kind, query, limit, exclude)
    }

    fn delete_user(&self, user: &UserId) -> MatchResult<usize> {
        self.check("delete_user")?;
        self.inner.delete_user(user)
    }

    fn dimension(&self, kind: VectorKind) -> Option<VectorDimension> {
        self.inner.dimension(kind)
    }

    fn all(&self) -> MatchResult<Vec<ProfileVector>> {
        self.check("all")?;
        self.inner.all()
    }
}

/// In-memory match store that can be switched off entirely, or made to
/// refuse writes once a budget of successful puts is spent.
#[derive(Clone, Default)]
pub struct FlakyMatchStore {
    inner: InMemoryMatchStore,
    down: Arc<AtomicBool>,
    puts_left: Arc<Mutex<Option<usize>>>,
}

impl FlakyMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Let `puts` more writes through, then fail. `None` lifts the limit.
    pub fn fail_puts_after(&self, puts: Option<usize>) {
        *self.puts_left.lock() = puts;
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    fn check(&self, operation: &str) -> MatchResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(unavailable("match", operation));
        }
        Ok(())
    }
}

impl MatchStore for FlakyMatchStore {
    fn get(
        &self,
        owner: &UserId,
        matched: &UserId,
        match_type: MatchType,
    ) -> MatchResult<Option<MatchRecord>> {
        self.check("get")?;
        self.inner.get(owner, matched, match_type)
    }

    fn put(&self, record: MatchRecord) -> MatchResult<()> {
        self.check("put")?;
        {
            let mut left = self.puts_left.lock();
            match left.as_mut() {
                Some(0) => return Err(unavailable("match", "put")),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.inner.put(record)
    }

    fn remove(
        &self,
        owner: &UserId,
        matched: &UserId,
        match_type: MatchType,
    ) -> MatchResult<bool> {
        self.check("remove")?;
        self.inner.remove(owner, matched, match_type)
    }

    fn records_for(
        &self,
        owner: &UserId,
        match_type: Option<MatchType>,
    ) -> MatchResult<Vec<MatchRecord>> {
        self.check("records_for")?;
        self.inner.records_for(owner, match_type)
    }

    fn all(&self) -> MatchResult<Vec<MatchRecord>> {
        self.check("all")?;
        self.inner.all()
    }

    fn is_notified(&self, pair: &PairKey) -> MatchResult<bool> {
        self.check("is_notified")?;
        self.inner.is_notified(pair)
    }

    fn mark_notified(&self, pair: PairKey) -> MatchResult<()> {
        self.check("mark_notified")?;
        self.inner.mark_notified(pair)
    }

    fn notified_pairs(&self) -> MatchResult<Vec<PairKey>> {
        self.check("notified_pairs")?;
        self.inner.notified_pairs()
    }
}
