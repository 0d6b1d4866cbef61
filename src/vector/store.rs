//! Vector store port and the in-memory adapter.
//!
//! The store exclusively owns profile vectors: one per (user, kind), with a
//! dimensionality fixed per kind for the lifetime of the store.

use crate::error::MatchResult;
use crate::types::{UserId, VectorKind};
use crate::vector::{ProfileVector, VectorDimension, VectorError, cosine_similarity};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Persistence and similarity queries over profile vectors.
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite the vector for (user, kind).
    fn upsert(&self, vector: ProfileVector) -> MatchResult<()>;

    fn get(&self, user: &UserId, kind: VectorKind) -> MatchResult<Option<ProfileVector>>;

    /// Every vector the user currently has, keyed by kind.
    fn vectors_for(&self, user: &UserId) -> MatchResult<BTreeMap<VectorKind, ProfileVector>>;

    /// Users holding a `kind` vector ranked by cosine similarity to `query`,
    /// descending, ties by user id.
    fn query(
        &self,
        kind: VectorKind,
        query: &[f32],
        limit: Option<usize>,
        exclude: Option<&UserId>,
    ) -> MatchResult<Vec<(UserId, f64)>>;

    /// Remove every vector owned by the user. Returns how many were removed.
    fn delete_user(&self, user: &UserId) -> MatchResult<usize>;

    fn dimension(&self, kind: VectorKind) -> Option<VectorDimension>;

    /// Full dump, ordered by (user, kind).
    fn all(&self) -> MatchResult<Vec<ProfileVector>>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryVectorStore {
    vectors: Arc<DashMap<(UserId, VectorKind), ProfileVector>>,
    by_user: Arc<DashMap<UserId, BTreeSet<VectorKind>>>,
    dimensions: Arc<DashMap<VectorKind, VectorDimension>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the dimension of a kind up front instead of taking it from the
    /// first vector written.
    pub fn with_dimension(self, kind: VectorKind, dimension: VectorDimension) -> Self {
        self.dimensions.insert(kind, dimension);
        self
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    fn check_dimension(&self, kind: VectorKind, values: &[f32]) -> MatchResult<()> {
        let proposed = VectorDimension::new(values.len())?;
        let fixed = *self.dimensions.entry(kind).or_insert(proposed);
        fixed.validate_vector(values)?;
        Ok(())
    }
}

impl VectorStore for InMemoryVectorStore {
    fn upsert(&self, vector: ProfileVector) -> MatchResult<()> {
        self.check_dimension(vector.kind, &vector.values)?;

        let user = vector.user_id.clone();
        let kind = vector.kind;
        self.vectors.insert((user.clone(), kind), vector);
        self.by_user.entry(user).or_default().insert(kind);
        Ok(())
    }

    fn get(&self, user: &UserId, kind: VectorKind) -> MatchResult<Option<ProfileVector>> {
        Ok(self
            .vectors
            .get(&(user.clone(), kind))
            .map(|entry| entry.value().clone()))
    }

    fn vectors_for(&self, user: &UserId) -> MatchResult<BTreeMap<VectorKind, ProfileVector>> {
        let kinds = self
            .by_user
            .get(user)
            .map(|kinds| kinds.clone())
            .unwrap_or_default();

        Ok(kinds
            .into_iter()
            .filter_map(|kind| {
                self.vectors
                    .get(&(user.clone(), kind))
                    .map(|entry| (kind, entry.value().clone()))
            })
            .collect())
    }

    fn query(
        &self,
        kind: VectorKind,
        query: &[f32],
        limit: Option<usize>,
        exclude: Option<&UserId>,
    ) -> MatchResult<Vec<(UserId, f64)>> {
        if let Some(dimension) = self.dimension(kind) {
            if dimension.get() != query.len() {
                return Err(VectorError::DimensionMismatch {
                    expected: dimension.get(),
                    actual: query.len(),
                }
                .into());
            }
        }

        let mut hits: Vec<(UserId, f64)> = self
            .vectors
            .iter()
            .filter(|entry| entry.key().1 == kind)
            .filter(|entry| exclude != Some(&entry.key().0))
            .map(|entry| {
                (
                    entry.key().0.clone(),
                    cosine_similarity(query, &entry.value().values),
                )
            })
            .collect();

        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(limit) = limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    fn delete_user(&self, user: &UserId) -> MatchResult<usize> {
        let Some((_, kinds)) = self.by_user.remove(user) else {
            return Ok(0);
        };
        Ok(kinds
            .into_iter()
            .filter(|kind| self.vectors.remove(&(user.clone(), *kind)).is_some())
            .count())
    }

    fn dimension(&self, kind: VectorKind) -> Option<VectorDimension> {
        self.dimensions.get(&kind).map(|entry| *entry.value())
    }

    fn all(&self) -> MatchResult<Vec<ProfileVector>> {
        let mut vectors: Vec<ProfileVector> =
            self.vectors.iter().map(|entry| entry.value().clone()).collect();
        vectors.sort_by(|a, b| (&a.user_id, a.kind).cmp(&(&b.user_id, b.kind)));
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MatchError;

    fn vector(user: &str, kind: VectorKind, values: &[f32]) -> ProfileVector {
        ProfileVector::new(UserId::from(user), kind, values.to_vec())
    }

    #[test]
    fn test_upsert_overwrites_single_slot() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vector("alice", VectorKind::Requirements, &[1.0, 0.0]))
            .unwrap();
        store
            .upsert(vector("alice", VectorKind::Requirements, &[0.0, 1.0]))
            .unwrap();

        assert_eq!(store.len(), 1);
        let stored = store
            .get(&UserId::from("alice"), VectorKind::Requirements)
            .unwrap()
            .unwrap();
        assert_eq!(stored.values, vec![0.0, 1.0]);
    }

    #[test]
    fn test_dimension_is_fixed_per_kind() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vector("alice", VectorKind::Skills, &[1.0, 0.0, 0.0]))
            .unwrap();

        let err = store
            .upsert(vector("bob", VectorKind::Skills, &[1.0, 0.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            MatchError::Vector(VectorError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));

        // Other kinds are independent
        store
            .upsert(vector("bob", VectorKind::Industry, &[1.0, 0.0]))
            .unwrap();
    }

    #[test]
    fn test_query_ranks_and_excludes() {
        let store = InMemoryVectorStore::new();
        store.upsert(vector("a", VectorKind::Offerings, &[1.0, 0.0])).unwrap();
        store.upsert(vector("b", VectorKind::Offerings, &[0.7, 0.7])).unwrap();
        store.upsert(vector("c", VectorKind::Offerings, &[0.0, 1.0])).unwrap();
        store.upsert(vector("d", VectorKind::Requirements, &[1.0, 0.0])).unwrap();

        let hits = store
            .query(VectorKind::Offerings, &[1.0, 0.0], None, Some(&UserId::from("a")))
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        let top = store
            .query(VectorKind::Offerings, &[1.0, 0.0], Some(1), None)
            .unwrap();
        assert_eq!(top[0].0.as_str(), "a");
    }

    #[test]
    fn test_delete_user_removes_every_kind() {
        let store = InMemoryVectorStore::new();
        store.upsert(vector("a", VectorKind::Requirements, &[1.0])).unwrap();
        store.upsert(vector("a", VectorKind::Offerings, &[1.0])).unwrap();
        store.upsert(vector("b", VectorKind::Offerings, &[1.0])).unwrap();

        assert_eq!(store.delete_user(&UserId::from("a")).unwrap(), 2);
        assert!(store.vectors_for(&UserId::from("a")).unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }
}
