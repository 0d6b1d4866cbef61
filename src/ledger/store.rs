//! Match store port and the in-memory adapter.

use crate::error::MatchResult;
use crate::ledger::{MatchRecord, PairKey};
use crate::types::{MatchType, UserId};
use dashmap::{DashMap, DashSet};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Persistence for match records, unique on (owner, matched, match_type),
/// and for the set of announced pairs.
pub trait MatchStore: Send + Sync {
    fn get(
        &self,
        owner: &UserId,
        matched: &UserId,
        match_type: MatchType,
    ) -> MatchResult<Option<MatchRecord>>;

    /// Insert or replace by identity.
    fn put(&self, record: MatchRecord) -> MatchResult<()>;

    /// Delete by identity. Returns whether a record was there.
    fn remove(
        &self,
        owner: &UserId,
        matched: &UserId,
        match_type: MatchType,
    ) -> MatchResult<bool>;

    /// Records owned by `owner`, optionally of one type, ordered by
    /// (matched, match_type).
    fn records_for(
        &self,
        owner: &UserId,
        match_type: Option<MatchType>,
    ) -> MatchResult<Vec<MatchRecord>>;

    /// Full dump ordered by (owner, matched, match_type).
    fn all(&self) -> MatchResult<Vec<MatchRecord>>;

    fn is_notified(&self, pair: &PairKey) -> MatchResult<bool>;

    fn mark_notified(&self, pair: PairKey) -> MatchResult<()>;

    fn notified_pairs(&self) -> MatchResult<Vec<PairKey>>;
}

type RecordKey = (UserId, UserId, MatchType);

#[derive(Clone, Debug, Default)]
pub struct InMemoryMatchStore {
    records: Arc<DashMap<RecordKey, MatchRecord>>,
    by_owner: Arc<DashMap<UserId, BTreeSet<(UserId, MatchType)>>>,
    notified: Arc<DashSet<PairKey>>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MatchStore for InMemoryMatchStore {
    fn get(
        &self,
        owner: &UserId,
        matched: &UserId,
        match_type: MatchType,
    ) -> MatchResult<Option<MatchRecord>> {
        Ok(self
            .records
            .get(&(owner.clone(), matched.clone(), match_type))
            .map(|entry| entry.value().clone()))
    }

    fn put(&self, record: MatchRecord) -> MatchResult<()> {
        let owner = record.owner.clone();
        let key = (owner.clone(), record.matched.clone(), record.match_type);
        self.by_owner
            .entry(owner)
            .or_default()
            .insert((key.1.clone(), key.2));
        self.records.insert(key, record);
        Ok(())
    }

    fn remove(
        &self,
        owner: &UserId,
        matched: &UserId,
        match_type: MatchType,
    ) -> MatchResult<bool> {
        let key = (owner.clone(), matched.clone(), match_type);
        if self.records.remove(&key).is_none() {
            return Ok(false);
        }
        if let Some(mut keys) = self.by_owner.get_mut(owner) {
            keys.remove(&(key.1, key.2));
        }
        self.by_owner.remove_if(owner, |_, keys| keys.is_empty());
        Ok(true)
    }

    fn records_for(
        &self,
        owner: &UserId,
        match_type: Option<MatchType>,
    ) -> MatchResult<Vec<MatchRecord>> {
        let keys = self
            .by_owner
            .get(owner)
            .map(|keys| keys.clone())
            .unwrap_or_default();

        Ok(keys
            .into_iter()
            .filter(|(_, kind)| match_type.is_none_or(|wanted| wanted == *kind))
            .filter_map(|(matched, kind)| {
                self.records
                    .get(&(owner.clone(), matched, kind))
                    .map(|entry| entry.value().clone())
            })
            .collect())
    }

    fn all(&self) -> MatchResult<Vec<MatchRecord>> {
        let mut records: Vec<MatchRecord> =
            self.records.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by(|a, b| {
            (&a.owner, &a.matched, a.match_type).cmp(&(&b.owner, &b.matched, b.match_type))
        });
        Ok(records)
    }

    fn is_notified(&self, pair: &PairKey) -> MatchResult<bool> {
        Ok(self.notified.contains(pair))
    }

    fn mark_notified(&self, pair: PairKey) -> MatchResult<()> {
        self.notified.insert(pair);
        Ok(())
    }

    fn notified_pairs(&self) -> MatchResult<Vec<PairKey>> {
        let mut pairs: Vec<PairKey> = self.notified.iter().map(|p| p.key().clone()).collect();
        pairs.sort();
        Ok(pairs)
    }
}
