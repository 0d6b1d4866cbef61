//! Reciprocal profile matching.
//!
//! Users register free-text answers, which are embedded per dimension
//! (requirements, offerings, skills, ...). A weighted similarity matcher
//! ranks candidates in both directions, the reciprocal ledger keeps the
//! stored results symmetric, and a batch orchestrator re-embeds dirty
//! users, re-matches them and announces new pairs through a webhook.

pub mod accounts;
pub mod batch;
pub mod config;
pub mod display;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod ledger;
pub mod matching;
pub mod notify;
pub mod persona;
#[cfg(feature = "http-server")]
pub mod server;
pub mod storage;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use accounts::{Account, AccountStore, Answer, InMemoryAccountStore, Registration};
pub use batch::{BatchOrchestrator, BatchReport, RunState};
pub use config::Settings;
pub use engine::{EngineBuilder, HealthReport, MatchEngine, MatchQuery, MatchView, OnboardReport};
pub use error::{MatchError, MatchResult};
pub use feedback::{FeedbackRecord, FeedbackSubmission, FeedbackTarget, SentimentGrade};
pub use ledger::{InMemoryMatchStore, MatchRecord, MatchStore, PairKey, ReciprocalLedger};
pub use matching::SimilarityMatcher;
pub use notify::{Notification, NotificationDispatcher, NotificationSink, RecordingSink};
pub use storage::Snapshot;
pub use types::{BatchId, MatchType, Sentiment, Tier, UserId, VectorKind};
pub use vector::{InMemoryVectorStore, ProfileVector, VectorStore};
