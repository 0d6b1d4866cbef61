//! Reciprocal match ledger.
//!
//! Every stored record (A, B, t) has a partner (B, A, t.reciprocal()).
//! Records are upserted by identity and never deleted; scores that fall
//! under the query threshold simply drop out of ranked reads.

mod reciprocal;
mod store;

pub use reciprocal::{PairReconciliation, ReciprocalLedger, UpsertOutcome};
pub use store::{InMemoryMatchStore, MatchStore};

use crate::matching::{DimensionScore, ScoredMatch};
use crate::types::{MatchType, Tier, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stored outcome of scoring `matched` from `owner`'s point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub owner: UserId,
    pub matched: UserId,
    pub match_type: MatchType,
    pub score: f64,
    pub tier: Tier,
    pub breakdown: Vec<DimensionScore>,
    pub explanation: String,
    pub updated_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn from_scored(owner: UserId, scored: &ScoredMatch) -> Self {
        Self {
            owner,
            matched: scored.candidate_id.clone(),
            match_type: scored.match_type,
            score: scored.score,
            tier: scored.tier,
            breakdown: scored.breakdown.clone(),
            explanation: scored.explanation.clone(),
            updated_at: Utc::now(),
        }
    }

    /// Same score, tier and breakdown. Explanations and timestamps are
    /// presentation and do not count as a change.
    pub fn same_result(&self, other: &MatchRecord) -> bool {
        self.score == other.score && self.tier == other.tier && self.breakdown == other.breakdown
    }

    pub fn pair(&self) -> PairKey {
        PairKey::new(self.owner.clone(), self.matched.clone())
    }
}

/// Unordered pair of distinct users, stored smaller id first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub first: UserId,
    pub second: UserId,
}

impl PairKey {
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    pub fn contains(&self, user: &UserId) -> bool {
        &self.first == user || &self.second == user
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.first, self.second)
    }
}
