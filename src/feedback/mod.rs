//! Feedback-driven vector adjustment.
//!
//! A classified piece of feedback nudges the author's requirements vector
//! toward (or away from) the subject's offerings and the author's
//! offerings toward (or away from) the subject's requirements. Every
//! submission is appended to the [`FeedbackLog`], neutral ones included.

mod adjuster;
mod classifier;

pub use adjuster::FeedbackAdjuster;
pub use classifier::{ClassifierError, KeywordClassifier, SentimentClassifier, SentimentGrade};

use crate::types::{Sentiment, UserId, VectorKind};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What the feedback is about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackTarget {
    #[default]
    Match,
    Chat,
}

impl FromStr for FeedbackTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "match" => Ok(Self::Match),
            "chat" => Ok(Self::Chat),
            other => Err(format!("unknown feedback type '{other}', expected match or chat")),
        }
    }
}

/// Feedback as submitted by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSubmission {
    pub user_id: UserId,
    pub subject_id: UserId,
    #[serde(default, rename = "type")]
    pub target: FeedbackTarget,
    #[serde(default)]
    pub text: String,
}

/// Append-only record of one piece of feedback and the nudge it caused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub user_id: UserId,
    pub subject_id: UserId,
    pub target: FeedbackTarget,
    pub sentiment: Sentiment,
    pub grade: SentimentGrade,
    pub raw_text: String,
    /// Signed step applied; negative moves away from the subject
    pub step: f32,
    /// Own vectors that were actually moved
    pub adjusted: Vec<VectorKind>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentStats {
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub average_step: f64,
    pub last_at: Option<DateTime<Utc>>,
}

/// Every feedback record, in submission order.
#[derive(Debug, Default)]
pub struct FeedbackLog {
    records: RwLock<Vec<FeedbackRecord>>,
}

impl FeedbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<FeedbackRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn append(&self, record: FeedbackRecord) {
        self.records.write().push(record);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn all(&self) -> Vec<FeedbackRecord> {
        self.records.read().clone()
    }

    /// The user's most recent `limit` records, oldest first.
    pub fn history(&self, user: &UserId, limit: usize) -> Vec<FeedbackRecord> {
        let records = self.records.read();
        let mine: Vec<&FeedbackRecord> = records.iter().filter(|r| &r.user_id == user).collect();
        let skip = mine.len().saturating_sub(limit);
        mine.into_iter().skip(skip).cloned().collect()
    }

    pub fn stats(&self, user: &UserId, limit: usize) -> AdjustmentStats {
        let history = self.history(user, limit);
        if history.is_empty() {
            return AdjustmentStats::default();
        }

        let count = |sentiment: Sentiment| history.iter().filter(|r| r.sentiment == sentiment).count();
        let total_step: f64 = history.iter().map(|r| f64::from(r.step)).sum();
        AdjustmentStats {
            total: history.len(),
            positive: count(Sentiment::Positive),
            negative: count(Sentiment::Negative),
            neutral: count(Sentiment::Neutral),
            average_step: total_step / history.len() as f64,
            last_at: history.last().map(|r| r.created_at),
        }
    }
}
