use crate::accounts::AccountStore;
use crate::embedding::EmbeddingGenerator;
use crate::error::{MatchError, MatchResult};
use crate::ledger::{PairKey, ReciprocalLedger};
use crate::matching::{ScoredMatch, SimilarityMatcher};
use crate::persona::PersonaComposer;
use crate::types::{MatchType, UserId, VectorKind};
use crate::vector::{ProfileVector, VectorStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Phase 2 result for one user: fresh top-k in both directions plus the
/// counterparts the ledger already held.
#[derive(Debug, Clone)]
pub struct UserMatches {
    pub user: UserId,
    pub found: Vec<ScoredMatch>,
    pub previous: BTreeSet<UserId>,
}

impl UserMatches {
    /// Every pair whose stored records this rematch may have changed.
    pub fn touched(&self) -> BTreeSet<PairKey> {
        self.found
            .iter()
            .map(|m| &m.candidate_id)
            .chain(self.previous.iter())
            .filter(|other| *other != &self.user)
            .map(|other| PairKey::new(self.user.clone(), other.clone()))
            .collect()
    }

    /// Distinct candidates, best score first across both directions.
    pub fn ranked_candidates(&self) -> Vec<UserId> {
        let mut found: Vec<&ScoredMatch> = self.found.iter().collect();
        found.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
        let mut seen = BTreeSet::new();
        found
            .into_iter()
            .filter(|m| seen.insert(m.candidate_id.clone()))
            .map(|m| m.candidate_id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileSummary {
    pub pairs: usize,
    pub changed: usize,
    pub healed: usize,
}

/// Per-user steps shared by batch runs and onboarding.
///
/// `embed_profile` and `find_matches` only read; the `commit_*` and
/// `reconcile` steps write.
#[derive(Clone)]
pub struct Pipeline {
    pub accounts: Arc<dyn AccountStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub generator: Arc<EmbeddingGenerator>,
    pub persona: Arc<PersonaComposer>,
    pub matcher: Arc<SimilarityMatcher>,
    pub ledger: Arc<ReciprocalLedger>,
}

impl Pipeline {
    /// Regenerate profile text and embed it, one vector per kind.
    pub fn embed_profile(&self, user: &UserId) -> MatchResult<Vec<ProfileVector>> {
        let account = self
            .accounts
            .get(user)?
            .ok_or_else(|| MatchError::UnknownUser {
                user_id: user.clone(),
            })?;
        let texts = self.persona.profile_texts(&account);
        for required in [VectorKind::Requirements, VectorKind::Offerings] {
            if !texts.contains_key(&required) {
                return Err(MatchError::InvalidProfile {
                    user_id: user.clone(),
                    reason: format!("no {required} text to embed"),
                });
            }
        }

        let model_version = self.generator.model_version().to_string();
        texts
            .into_iter()
            .map(|(kind, text)| {
                let values = self.generator.embed(&text, kind)?;
                Ok(ProfileVector::new(user.clone(), kind, values)
                    .with_metadata("model_version", model_version.clone()))
            })
            .collect()
    }

    pub fn commit_vectors(&self, vectors: Vec<ProfileVector>) -> MatchResult<usize> {
        let count = vectors.len();
        for vector in vectors {
            self.vectors.upsert(vector)?;
        }
        Ok(count)
    }

    pub fn find_matches(
        &self,
        user: &UserId,
        top_k: usize,
        min_threshold: f64,
    ) -> MatchResult<UserMatches> {
        let mut found = Vec::new();
        for match_type in MatchType::ALL {
            found.extend(self.matcher.top_k(user, match_type, top_k, min_threshold)?);
        }
        let previous = self.ledger.counterparts(user)?;
        debug!(user_id = %user, found = found.len(), previous = previous.len(), "rematched user");
        Ok(UserMatches {
            user: user.clone(),
            found,
            previous,
        })
    }

    /// Owner-side records for every user at once; reciprocals come from
    /// `reconcile`. Nothing is left written when this fails.
    pub fn commit_matches(&self, batch: &[UserMatches]) -> MatchResult<usize> {
        let entries = batch.iter().flat_map(|matches| {
            matches
                .found
                .iter()
                .map(move |scored| (&matches.user, &scored.candidate_id, scored.match_type, scored))
        });
        Ok(self.ledger.record_matches(entries)?.len())
    }

    /// Reconcile pairs one at a time, in key order.
    pub fn reconcile(&self, pairs: &BTreeSet<PairKey>) -> MatchResult<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        for pair in pairs {
            let result = self.ledger.reconcile_pair(&pair.first, &pair.second)?;
            summary.pairs += 1;
            summary.healed += result.healed;
            if result.changed() {
                summary.changed += 1;
            }
        }
        Ok(summary)
    }

    pub fn label_of(&self, user: &UserId) -> MatchResult<String> {
        Ok(self
            .accounts
            .get(user)?
            .map(|account| account.label)
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| user.to_string()))
    }
}
