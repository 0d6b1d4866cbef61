//! Pure multi-dimensional scoring.

use crate::config::{TierBreakpoints, WeightTable};
use crate::matching::DimensionScore;
use crate::types::{MatchType, Tier, VectorKind};
use crate::vector::{ProfileVector, cosine_similarity};
use std::collections::BTreeMap;

/// Stored scores are rounded so re-running on unchanged vectors yields
/// identical records regardless of summation noise.
pub fn round_score(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Per-dimension similarities for the dimensions both users have and the
/// weight table covers. Weights are re-normalized over those dimensions;
/// missing dimensions are excluded, never scored as zero.
///
/// A pair is weighted by the larger weight of its two kinds, so both
/// directions of a cross dimension weigh the same. Similarities are
/// clamped to [0, 1].
pub fn breakdown(
    weights: &WeightTable,
    match_type: MatchType,
    user: &BTreeMap<VectorKind, ProfileVector>,
    candidate: &BTreeMap<VectorKind, ProfileVector>,
) -> Vec<DimensionScore> {
    let present: Vec<(VectorKind, VectorKind, f64, f64)> = match_type
        .dimension_pairs()
        .into_iter()
        .filter_map(|(user_kind, candidate_kind)| {
            let weight = weights.get(user_kind).max(weights.get(candidate_kind));
            if weight <= 0.0 {
                return None;
            }
            let ours = user.get(&user_kind)?;
            let theirs = candidate.get(&candidate_kind)?;
            if ours.values.len() != theirs.values.len() {
                return None;
            }
            let similarity = cosine_similarity(&ours.values, &theirs.values).clamp(0.0, 1.0);
            Some((user_kind, candidate_kind, similarity, weight))
        })
        .collect();

    let total: f64 = present.iter().map(|(_, _, _, weight)| weight).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    present
        .into_iter()
        .map(|(kind, counterpart_kind, similarity, weight)| {
            let normalized = weight / total;
            DimensionScore {
                kind,
                counterpart_kind,
                similarity: round_score(similarity),
                weight: round_score(normalized),
                contribution: round_score(similarity * normalized),
            }
        })
        .collect()
}

/// Weighted aggregate of a breakdown, in [0, 1].
pub fn aggregate(dimensions: &[DimensionScore]) -> f64 {
    let total_weight: f64 = dimensions.iter().map(|d| d.weight).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let sum: f64 = dimensions.iter().map(|d| d.similarity * d.weight).sum();
    round_score((sum / total_weight).clamp(0.0, 1.0))
}

pub fn tier(tiers: &TierBreakpoints, score: f64) -> Tier {
    tiers.tier_for(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn profile(user: &str, entries: &[(VectorKind, &[f32])]) -> BTreeMap<VectorKind, ProfileVector> {
        entries
            .iter()
            .map(|(kind, values)| {
                (
                    *kind,
                    ProfileVector::new(UserId::from(user), *kind, values.to_vec()),
                )
            })
            .collect()
    }

    /// Unit vector with cosine `similarity` against [1, 0].
    fn at(similarity: f32) -> [f32; 2] {
        [similarity, (1.0 - similarity * similarity).sqrt()]
    }

    #[test]
    fn missing_dimensions_renormalize_weights() {
        let weights = WeightTable::empty()
            .with(VectorKind::Requirements, 0.6)
            .with(VectorKind::Skills, 0.4);

        let alice = profile(
            "alice",
            &[
                (VectorKind::Requirements, &[1.0, 0.0]),
                (VectorKind::Skills, &[1.0, 0.0]),
            ],
        );
        let bob = profile("bob", &[(VectorKind::Offerings, &at(0.85))]);

        let dims = breakdown(&weights, MatchType::RequirementsToOfferings, &alice, &bob);
        assert_eq!(dims.len(), 1);
        assert_eq!(dims[0].kind, VectorKind::Requirements);
        assert_eq!(dims[0].counterpart_kind, VectorKind::Offerings);
        assert_eq!(dims[0].weight, 1.0);

        let score = aggregate(&dims);
        assert!((score - 0.85).abs() < 1e-6);
        assert_eq!(tier(&TierBreakpoints::default(), score), Tier::Excellent);
    }

    #[test]
    fn weighted_sum_over_present_dimensions() {
        let weights = WeightTable::empty()
            .with(VectorKind::Requirements, 0.5)
            .with(VectorKind::Skills, 0.25)
            .with(VectorKind::Culture, 0.25);

        let alice = profile(
            "alice",
            &[
                (VectorKind::Requirements, &[1.0, 0.0]),
                (VectorKind::Skills, &[1.0, 0.0]),
                (VectorKind::Culture, &[1.0, 0.0]),
            ],
        );
        let bob = profile(
            "bob",
            &[
                (VectorKind::Offerings, &at(0.9)),
                (VectorKind::Skills, &at(0.6)),
                (VectorKind::Culture, &at(0.3)),
            ],
        );

        let score = aggregate(&breakdown(
            &weights,
            MatchType::RequirementsToOfferings,
            &alice,
            &bob,
        ));
        assert!((score - (0.5 * 0.9 + 0.25 * 0.6 + 0.25 * 0.3)).abs() < 1e-5);
    }

    #[test]
    fn zero_weight_dimensions_are_ignored() {
        let weights = WeightTable::empty().with(VectorKind::Offerings, 1.0);
        let alice = profile(
            "alice",
            &[
                (VectorKind::Offerings, &[1.0, 0.0]),
                (VectorKind::Industry, &[1.0, 0.0]),
            ],
        );
        let bob = profile(
            "bob",
            &[
                (VectorKind::Requirements, &at(0.7)),
                (VectorKind::Industry, &at(0.1)),
            ],
        );

        let dims = breakdown(&weights, MatchType::OfferingsToRequirements, &alice, &bob);
        assert_eq!(dims.len(), 1);
        assert!((aggregate(&dims) - 0.7).abs() < 1e-5);
    }

    #[test]
    fn cross_dimension_scores_the_same_from_both_sides() {
        let weights = WeightTable::empty()
            .with(VectorKind::Requirements, 0.6)
            .with(VectorKind::Skills, 0.4);
        let alice = profile(
            "alice",
            &[
                (VectorKind::Requirements, &[1.0, 0.0]),
                (VectorKind::Skills, &[1.0, 0.0]),
            ],
        );
        let bob = profile(
            "bob",
            &[
                (VectorKind::Offerings, &at(0.85)),
                (VectorKind::Skills, &at(0.5)),
            ],
        );

        let forward = aggregate(&breakdown(&weights, MatchType::RequirementsToOfferings, &alice, &bob));
        let backward = aggregate(&breakdown(&weights, MatchType::OfferingsToRequirements, &bob, &alice));
        assert_eq!(forward, backward);
        assert!((forward - (0.6 * 0.85 + 0.4 * 0.5)).abs() < 1e-5);
    }

    #[test]
    fn no_shared_dimensions_scores_zero() {
        let alice = profile("alice", &[(VectorKind::Requirements, &[1.0, 0.0])]);
        let bob = profile("bob", &[(VectorKind::Skills, &[1.0, 0.0])]);
        let dims = breakdown(
            &WeightTable::default(),
            MatchType::RequirementsToOfferings,
            &alice,
            &bob,
        );
        assert!(dims.is_empty());
        assert_eq!(aggregate(&dims), 0.0);
    }

    #[test]
    fn opposite_vectors_clamp_to_zero() {
        let alice = profile("alice", &[(VectorKind::Requirements, &[1.0, 0.0])]);
        let bob = profile("bob", &[(VectorKind::Offerings, &[-1.0, 0.0])]);
        let dims = breakdown(
            &WeightTable::default(),
            MatchType::RequirementsToOfferings,
            &alice,
            &bob,
        );
        assert_eq!(dims[0].similarity, 0.0);
    }
}
