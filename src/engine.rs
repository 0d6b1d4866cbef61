//! The matching engine facade.
//!
//! Wires the ports and services together and exposes the operations the
//! CLI and HTTP surface call: registration, onboarding, match queries,
//! feedback and batch runs.

use crate::accounts::{Account, AccountStore, InMemoryAccountStore, Registration};
use crate::batch::{BatchOrchestrator, BatchReport, Pipeline};
use crate::config::{EmbeddingBackend, EmbeddingConfig, Settings};
use crate::embedding::{CacheStats, EmbeddingGenerator};
use crate::error::{MatchError, MatchResult};
use crate::feedback::{
    AdjustmentStats, FeedbackAdjuster, FeedbackLog, FeedbackRecord, FeedbackSubmission,
    KeywordClassifier, SentimentClassifier, SentimentGrade,
};
use crate::ledger::{InMemoryMatchStore, MatchRecord, MatchStore, ReciprocalLedger};
use crate::matching::{Explainer, SimilarityMatcher};
use crate::notify::{DeliveryOutcome, FailedDelivery, NotificationDispatcher, NotificationSink};
use crate::persona::{PersonaComposer, TextGenerator};
use crate::storage::Snapshot;
use crate::types::{BatchId, MatchType, Tier, UserId};
use crate::vector::{
    EmbeddingFunction, FastEmbedFunction, HashingEmbedder, InMemoryVectorStore, VectorDimension,
    VectorStore,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Embedding function selected by `embedding.backend`.
pub fn embedding_function(config: &EmbeddingConfig) -> MatchResult<Arc<dyn EmbeddingFunction>> {
    match config.backend {
        EmbeddingBackend::Fastembed => {
            let function = FastEmbedFunction::new(&config.model).map_err(|e| {
                MatchError::EmbeddingUnavailable {
                    reason: e.to_string(),
                }
            })?;
            Ok(Arc::new(function))
        }
        EmbeddingBackend::Hashing => {
            let dimension = VectorDimension::new(config.hashing_dimension)?;
            Ok(Arc::new(HashingEmbedder::new(dimension)))
        }
    }
}

/// Query for a user's stored matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchQuery {
    pub user_id: UserId,
    #[serde(default = "default_match_type")]
    pub match_type: MatchType,
    /// Defaults to `matching.top_k`
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Defaults to `matching.min_threshold`
    #[serde(default)]
    pub min_threshold: Option<f64>,
}

fn default_match_type() -> MatchType {
    MatchType::RequirementsToOfferings
}

impl MatchQuery {
    pub fn new(user_id: UserId, match_type: MatchType) -> Self {
        Self {
            user_id,
            match_type,
            top_k: None,
            min_threshold: None,
        }
    }
}

/// One row of a match query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchView {
    pub candidate_id: UserId,
    pub score: f64,
    pub tier: Tier,
    pub explanation: String,
}

impl From<MatchRecord> for MatchView {
    fn from(record: MatchRecord) -> Self {
        Self {
            candidate_id: record.matched,
            score: record.score,
            tier: record.tier,
            explanation: record.explanation,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OnboardReport {
    pub user_id: UserId,
    pub generation: u64,
    /// Best first, both directions
    pub matches: Vec<UserId>,
    pub pairs_reconciled: usize,
    /// False when the user re-registered while onboarding ran
    pub cleared: bool,
    pub delivery: DeliveryOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub users: usize,
    pub dirty: usize,
    pub vectors: usize,
    pub match_records: usize,
    pub ledger_issues: usize,
    pub failed_deliveries: usize,
    pub cache: CacheStats,
}

/// Builds a [`MatchEngine`]. Adapters left unset default to the in-memory
/// ones, seeded from the snapshot when one is given.
pub struct EngineBuilder {
    settings: Settings,
    function: Option<Arc<dyn EmbeddingFunction>>,
    accounts: Option<Arc<dyn AccountStore>>,
    vectors: Option<Arc<dyn VectorStore>>,
    matches: Option<Arc<dyn MatchStore>>,
    text_generator: Option<Arc<dyn TextGenerator>>,
    classifier: Option<Arc<dyn SentimentClassifier>>,
    sink: Option<Arc<dyn NotificationSink>>,
    snapshot: Option<Snapshot>,
}

impl EngineBuilder {
    pub fn embedding_function(mut self, function: Arc<dyn EmbeddingFunction>) -> Self {
        self.function = Some(function);
        self
    }

    pub fn account_store(mut self, store: Arc<dyn AccountStore>) -> Self {
        self.accounts = Some(store);
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vectors = Some(store);
        self
    }

    pub fn match_store(mut self, store: Arc<dyn MatchStore>) -> Self {
        self.matches = Some(store);
        self
    }

    pub fn text_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.text_generator = Some(generator);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn SentimentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn snapshot(mut self, snapshot: Option<Snapshot>) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn build(self) -> MatchResult<MatchEngine> {
        let settings = self.settings;
        settings.validate()?;
        let snapshot = self.snapshot.unwrap_or_default();

        let function = match self.function {
            Some(function) => function,
            None => embedding_function(&settings.embedding)?,
        };

        let accounts: Arc<dyn AccountStore> = match self.accounts {
            Some(store) => store,
            None => Arc::new(InMemoryAccountStore::from_accounts(snapshot.accounts)),
        };

        let vectors: Arc<dyn VectorStore> = match self.vectors {
            Some(store) => store,
            None => {
                let store = InMemoryVectorStore::new();
                for vector in snapshot.vectors {
                    store.upsert(vector)?;
                }
                Arc::new(store)
            }
        };

        let matches: Arc<dyn MatchStore> = match self.matches {
            Some(store) => store,
            None => {
                let store = InMemoryMatchStore::new();
                for record in snapshot.matches {
                    store.put(record)?;
                }
                for pair in snapshot.notified {
                    store.mark_notified(pair)?;
                }
                Arc::new(store)
            }
        };

        let dispatcher = match self.sink {
            Some(sink) => NotificationDispatcher::new(sink, &settings.notification),
            None => NotificationDispatcher::from_config(&settings.notification),
        };
        dispatcher.restore(snapshot.dispatcher);
        let dispatcher = Arc::new(dispatcher);

        let explainer = Explainer::new(
            self.text_generator.clone(),
            settings.matching.polish_explanations,
            settings.matching.highlight_floor,
        )
        .with_timeout(Duration::from_millis(settings.matching.polish_timeout_ms));
        let matcher = Arc::new(SimilarityMatcher::new(
            Arc::clone(&vectors),
            Arc::clone(&accounts),
            settings.matching.clone(),
            explainer,
        ));
        let ledger = Arc::new(ReciprocalLedger::new(Arc::clone(&matches), Arc::clone(&matcher)));

        let pipeline = Pipeline {
            accounts,
            vectors: Arc::clone(&vectors),
            generator: Arc::new(EmbeddingGenerator::from_settings(function, &settings)),
            persona: Arc::new(PersonaComposer::new(self.text_generator)),
            matcher,
            ledger,
        };

        let adjuster = FeedbackAdjuster::new(
            vectors,
            self.classifier
                .unwrap_or_else(|| Arc::new(KeywordClassifier::new())),
            settings.feedback.clone(),
            Arc::new(FeedbackLog::from_records(snapshot.feedback)),
        );
        let orchestrator =
            BatchOrchestrator::new(pipeline.clone(), Arc::clone(&dispatcher), settings.batch.clone());

        Ok(MatchEngine {
            settings,
            pipeline,
            matches,
            adjuster,
            dispatcher,
            orchestrator,
        })
    }
}

pub struct MatchEngine {
    settings: Settings,
    pipeline: Pipeline,
    matches: Arc<dyn MatchStore>,
    adjuster: FeedbackAdjuster,
    dispatcher: Arc<NotificationDispatcher>,
    orchestrator: BatchOrchestrator,
}

impl MatchEngine {
    pub fn builder(settings: Settings) -> EngineBuilder {
        EngineBuilder {
            settings,
            function: None,
            accounts: None,
            vectors: None,
            matches: None,
            text_generator: None,
            classifier: None,
            sink: None,
            snapshot: None,
        }
    }

    /// Engine on the in-memory adapters, restored from `state_path` when
    /// a snapshot exists there.
    pub fn open(settings: Settings) -> MatchResult<Self> {
        let snapshot = Snapshot::load(&settings.state_path)?;
        Self::builder(settings).snapshot(snapshot).build()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn ledger(&self) -> &Arc<ReciprocalLedger> {
        &self.pipeline.ledger
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.pipeline.accounts
    }

    pub fn vectors(&self) -> &Arc<dyn VectorStore> {
        &self.pipeline.vectors
    }

    /// Store answers, bump the generation and mark the user dirty.
    pub fn register(&self, registration: Registration) -> MatchResult<Account> {
        let account = self.pipeline.accounts.register(registration)?;
        info!(
            user_id = %account.user_id,
            generation = account.generation,
            answers = account.answers.len(),
            "user registered"
        );
        Ok(account)
    }

    /// Queue a user for the next batch without new answers.
    pub fn mark_dirty(&self, user: &UserId) -> MatchResult<u64> {
        let generation = self.pipeline.accounts.mark_dirty(user)?;
        info!(user_id = %user, generation, "user queued for re-matching");
        Ok(generation)
    }

    /// First-time run for one user: embed, match both directions,
    /// reconcile, clear the dirty flag and send the single-user webhook,
    /// even when nothing matched.
    pub async fn onboard_user(&self, user: &UserId) -> MatchResult<OnboardReport> {
        let pipeline = self.pipeline.clone();
        let matching = &self.settings.matching;
        let (top_k, min_threshold) = (matching.top_k, matching.min_threshold);
        let task_user = user.clone();

        let (generation, found, reconciled) = tokio::task::spawn_blocking(move || {
            let account = pipeline
                .accounts
                .get(&task_user)?
                .ok_or_else(|| MatchError::UnknownUser {
                    user_id: task_user.clone(),
                })?;
            let vectors = pipeline.embed_profile(&task_user)?;
            pipeline.commit_vectors(vectors)?;
            let found = pipeline.find_matches(&task_user, top_k, min_threshold)?;
            pipeline.commit_matches(std::slice::from_ref(&found))?;
            let summary = pipeline.reconcile(&found.touched())?;
            Ok::<_, MatchError>((account.generation, found, summary.pairs))
        })
        .await
        .map_err(|e| MatchError::Worker {
            phase: "onboarding".to_string(),
            reason: e.to_string(),
        })??;

        let cleared = self.pipeline.accounts.clear_dirty(user, generation)?;
        let matches = found.ranked_candidates();
        let delivery = self
            .dispatcher
            .notify_single(user, generation, matches.clone())
            .await;

        info!(
            user_id = %user,
            generation,
            matches = matches.len(),
            delivered = delivery.is_success(),
            "user onboarded"
        );
        Ok(OnboardReport {
            user_id: user.clone(),
            generation,
            matches,
            pairs_reconciled: reconciled,
            cleared,
            delivery,
        })
    }

    /// Stored matches for a user, best first. Unknown users, empty ledgers
    /// and store failures all give an empty list.
    pub fn matches(&self, query: &MatchQuery) -> MatchResult<Vec<MatchView>> {
        let top_k = query.top_k.unwrap_or(self.settings.matching.top_k);
        let min_threshold = query
            .min_threshold
            .unwrap_or(self.settings.matching.min_threshold)
            .clamp(0.0, 1.0);
        let records = match self.pipeline.ledger.ranked_matches(
            &query.user_id,
            query.match_type,
            top_k,
            min_threshold,
        ) {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    user_id = %query.user_id,
                    match_type = %query.match_type,
                    code = %e.status_code(),
                    error = %e,
                    "match query failed, answering with no matches"
                );
                Vec::new()
            }
        };
        Ok(records.into_iter().map(MatchView::from).collect())
    }

    /// Classify and apply feedback. Always echoes the stored record.
    pub fn submit_feedback(&self, submission: &FeedbackSubmission) -> MatchResult<FeedbackRecord> {
        let record = self.adjuster.submit(submission)?;
        if let Err(e) = self.pipeline.accounts.touch(&submission.user_id, Utc::now()) {
            debug!(user_id = %submission.user_id, error = %e, "activity not recorded");
        }
        Ok(record)
    }

    pub fn apply_feedback(
        &self,
        user: &UserId,
        subject: &UserId,
        sentiment: impl Into<SentimentGrade>,
        weight: Option<f32>,
    ) -> MatchResult<FeedbackRecord> {
        self.adjuster.apply_feedback(user, subject, sentiment, weight)
    }

    pub fn feedback_history(&self, user: &UserId) -> Vec<FeedbackRecord> {
        self.adjuster.history(user)
    }

    pub fn adjustment_stats(&self, user: &UserId) -> AdjustmentStats {
        self.adjuster.adjustment_stats(user)
    }

    pub async fn run_batch(&self, cancel: &CancellationToken) -> MatchResult<BatchReport> {
        self.orchestrator.run(BatchId::generate(), cancel).await
    }

    pub async fn run_batch_with_id(
        &self,
        batch_id: BatchId,
        cancel: &CancellationToken,
    ) -> MatchResult<BatchReport> {
        self.orchestrator.run(batch_id, cancel).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.pipeline.generator.cache_stats()
    }

    pub fn failed_deliveries(&self) -> Vec<FailedDelivery> {
        self.dispatcher.failures()
    }

    pub fn snapshot(&self) -> MatchResult<Snapshot> {
        Ok(Snapshot {
            accounts: self.pipeline.accounts.all()?,
            vectors: self.pipeline.vectors.all()?,
            matches: self.matches.all()?,
            notified: self.matches.notified_pairs()?,
            feedback: self.adjuster.log().all(),
            dispatcher: self.dispatcher.export_state(),
            ..Snapshot::default()
        })
    }

    /// Write the snapshot to `state_path`.
    pub fn save_state(&self) -> MatchResult<()> {
        self.snapshot()?.save(&self.settings.state_path)
    }

    pub fn health(&self) -> MatchResult<HealthReport> {
        Ok(HealthReport {
            users: self.pipeline.accounts.users()?.len(),
            dirty: self.pipeline.accounts.dirty_users()?.len(),
            vectors: self.pipeline.vectors.all()?.len(),
            match_records: self.matches.all()?.len(),
            ledger_issues: self.pipeline.ledger.audit()?.len(),
            failed_deliveries: self.dispatcher.failures().len(),
            cache: self.cache_stats(),
        })
    }
}
