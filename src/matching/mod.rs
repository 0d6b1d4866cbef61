//! Multi-dimensional similarity matching.
//!
//! Each dimension pairs one of the querying user's kinds with one of the
//! candidate's kinds (see [`MatchType::dimension_pairs`]). Per-dimension
//! cosine similarities are combined with the configured weight table,
//! bucketed into a [`Tier`] and explained from the breakdown alone.
//!
//! [`MatchType::dimension_pairs`]: crate::types::MatchType::dimension_pairs
//! [`Tier`]: crate::types::Tier

mod explain;
mod matcher;
pub mod score;

pub use explain::{Explainer, template_explanation};
pub use matcher::SimilarityMatcher;

use crate::types::{MatchType, Tier, UserId, VectorKind};
use serde::{Deserialize, Serialize};

/// Similarity on one dimension and its share of the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    /// Querying user's kind
    pub kind: VectorKind,
    /// Candidate's kind compared against it
    pub counterpart_kind: VectorKind,
    pub similarity: f64,
    /// Weight after re-normalization over present dimensions
    pub weight: f64,
    pub contribution: f64,
}

/// Outcome of scoring one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub candidate_id: UserId,
    pub match_type: MatchType,
    pub score: f64,
    pub tier: Tier,
    pub breakdown: Vec<DimensionScore>,
    pub explanation: String,
}
