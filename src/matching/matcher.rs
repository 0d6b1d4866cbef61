use crate::accounts::AccountStore;
use crate::config::MatchingConfig;
use crate::error::MatchResult;
use crate::matching::{DimensionScore, Explainer, ScoredMatch, score};
use crate::types::{MatchType, UserId, VectorKind};
use crate::vector::{ProfileVector, VectorStore};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Scores users against each other over every configured dimension.
pub struct SimilarityMatcher {
    vectors: Arc<dyn VectorStore>,
    accounts: Arc<dyn AccountStore>,
    config: MatchingConfig,
    explainer: Explainer,
}

impl SimilarityMatcher {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        accounts: Arc<dyn AccountStore>,
        config: MatchingConfig,
        explainer: Explainer,
    ) -> Self {
        Self {
            vectors,
            accounts,
            config,
            explainer,
        }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Score `candidate` from `user`'s point of view using current vectors.
    pub fn score(
        &self,
        user: &UserId,
        candidate: &UserId,
        match_type: MatchType,
    ) -> MatchResult<ScoredMatch> {
        let ours = self.vectors.vectors_for(user)?;
        let theirs = self.vectors.vectors_for(candidate)?;
        Ok(self.score_profiles(candidate, match_type, &ours, &theirs))
    }

    pub fn score_profiles(
        &self,
        candidate: &UserId,
        match_type: MatchType,
        ours: &BTreeMap<VectorKind, ProfileVector>,
        theirs: &BTreeMap<VectorKind, ProfileVector>,
    ) -> ScoredMatch {
        let breakdown = score::breakdown(&self.config.weights, match_type, ours, theirs);
        let total = score::aggregate(&breakdown);
        let tier = score::tier(&self.config.tiers, total);
        let explanation = self.explainer.explain(tier, &breakdown);

        ScoredMatch {
            candidate_id: candidate.clone(),
            match_type,
            score: total,
            tier,
            breakdown,
            explanation,
        }
    }

    /// Required dimensions that are present must clear the floor.
    pub fn meets_required(&self, breakdown: &[DimensionScore]) -> bool {
        breakdown
            .iter()
            .filter(|d| self.config.required.contains(&d.kind))
            .all(|d| d.similarity >= self.config.required_floor)
    }

    /// Best `k` candidates for `user` across the whole population.
    ///
    /// Ordered by descending score, then more recent candidate activity,
    /// then candidate id. Excludes the user, candidates below
    /// `min_threshold`, and candidates failing a required dimension.
    /// Candidates must hold the counterpart of the direction's primary
    /// kind. Zero candidates is an empty result, not an error.
    pub fn top_k(
        &self,
        user: &UserId,
        match_type: MatchType,
        k: usize,
        min_threshold: f64,
    ) -> MatchResult<Vec<ScoredMatch>> {
        let ours = self.vectors.vectors_for(user)?;
        let (user_kind, candidate_kind) = match_type.dimension_pairs()[0];
        let Some(primary) = ours.get(&user_kind) else {
            debug!(user_id = %user, %match_type, "no primary vector, nothing to match");
            return Ok(Vec::new());
        };

        let pool = self
            .vectors
            .query(candidate_kind, &primary.values, None, Some(user))?;

        let mut ranked: Vec<(ScoredMatch, DateTime<Utc>)> = Vec::new();
        for (candidate, _) in pool {
            let theirs = self.vectors.vectors_for(&candidate)?;
            let scored = self.score_profiles(&candidate, match_type, &ours, &theirs);
            if scored.score < min_threshold || !self.meets_required(&scored.breakdown) {
                continue;
            }
            let active = self
                .accounts
                .get(&candidate)?
                .map(|account| account.last_active)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            ranked.push((scored, active));
        }

        ranked.sort_by(|(a, a_active), (b, b_active)| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b_active.cmp(a_active))
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
        ranked.truncate(k);

        Ok(ranked.into_iter().map(|(scored, _)| scored).collect())
    }
}
