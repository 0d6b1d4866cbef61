use crate::error::{MatchError, MatchResult};
use crate::ledger::{MatchRecord, MatchStore, PairKey};
use crate::matching::{ScoredMatch, SimilarityMatcher};
use crate::types::{MatchType, UserId};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What an upsert did to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Stored record left untouched
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct PairReconciliation {
    pub pair: PairKey,
    pub outcomes: Vec<UpsertOutcome>,
    /// Asymmetric records found before recomputing
    pub healed: usize,
}

impl PairReconciliation {
    pub fn changed(&self) -> bool {
        self.outcomes
            .iter()
            .any(|outcome| *outcome != UpsertOutcome::Unchanged)
    }
}

type RecordKey = (UserId, UserId, MatchType);

/// Owns all match records and keeps both directions of every pair in step.
pub struct ReciprocalLedger {
    store: Arc<dyn MatchStore>,
    matcher: Arc<SimilarityMatcher>,
    // Per-user locks; pair work takes both in id order
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl ReciprocalLedger {
    pub fn new(store: Arc<dyn MatchStore>, matcher: Arc<SimilarityMatcher>) -> Self {
        Self {
            store,
            matcher,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn MatchStore> {
        &self.store
    }

    fn user_lock(&self, user: &UserId) -> Arc<Mutex<()>> {
        self.locks.entry(user.clone()).or_default().clone()
    }

    /// Upsert records as one unit. When a read or write fails, the writes
    /// already applied are undone before the error is returned. Callers
    /// hold the owners' locks.
    fn upsert_all(&self, records: Vec<MatchRecord>) -> MatchResult<Vec<UpsertOutcome>> {
        let mut outcomes = Vec::with_capacity(records.len());
        let mut undo: Vec<(RecordKey, Option<MatchRecord>)> = Vec::new();

        for record in records {
            let key = (record.owner.clone(), record.matched.clone(), record.match_type);
            let previous = match self.store.get(&key.0, &key.1, key.2) {
                Ok(previous) => previous,
                Err(e) => {
                    self.roll_back(undo);
                    return Err(e);
                }
            };
            if previous
                .as_ref()
                .is_some_and(|existing| existing.same_result(&record))
            {
                outcomes.push(UpsertOutcome::Unchanged);
                continue;
            }
            if let Err(e) = self.store.put(record) {
                self.roll_back(undo);
                return Err(e);
            }
            outcomes.push(if previous.is_some() {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Inserted
            });
            undo.push((key, previous));
        }
        Ok(outcomes)
    }

    fn roll_back(&self, undo: Vec<(RecordKey, Option<MatchRecord>)>) {
        let written = undo.len();
        let mut stuck = 0;
        for ((owner, matched, match_type), previous) in undo.into_iter().rev() {
            let restored = match previous {
                Some(previous) => self.store.put(previous),
                None => self.store.remove(&owner, &matched, match_type).map(|_| ()),
            };
            if let Err(e) = restored {
                stuck += 1;
                warn!(owner = %owner, matched = %matched, %match_type, error = %e, "record not rolled back");
            }
        }
        if stuck > 0 {
            // Left-over one-sided records are healed by the next reconcile of the pair
            error!(written, stuck, "ledger write rolled back partially");
        } else {
            debug!(written, "ledger write rolled back");
        }
    }

    /// Upsert the owner-side record only. The reciprocal entry is written
    /// by [`reconcile_pair`](Self::reconcile_pair).
    pub fn record_match(
        &self,
        owner: &UserId,
        matched: &UserId,
        match_type: MatchType,
        result: &ScoredMatch,
    ) -> MatchResult<UpsertOutcome> {
        let outcomes = self.record_matches([(owner, matched, match_type, result)])?;
        Ok(outcomes.into_iter().next().unwrap_or(UpsertOutcome::Unchanged))
    }

    /// Upsert many owner-side records all-or-nothing: a failed write rolls
    /// back the ones before it.
    pub fn record_matches<'a>(
        &self,
        entries: impl IntoIterator<Item = (&'a UserId, &'a UserId, MatchType, &'a ScoredMatch)>,
    ) -> MatchResult<Vec<UpsertOutcome>> {
        let mut records = Vec::new();
        let mut owners = BTreeSet::new();
        for (owner, matched, match_type, result) in entries {
            if owner == matched {
                return Err(self_pair(owner));
            }
            let mut record = MatchRecord::from_scored(owner.clone(), result);
            record.matched = matched.clone();
            record.match_type = match_type;
            owners.insert(owner.clone());
            records.push(record);
        }

        // Locks in id order, same as reconcile_pair
        let locks: Vec<Arc<Mutex<()>>> = owners.iter().map(|owner| self.user_lock(owner)).collect();
        let _guards: Vec<_> = locks.iter().map(|lock| lock.lock()).collect();
        self.upsert_all(records)
    }

    /// Recompute both directions of both match types for the pair from
    /// current vectors and upsert all four records together.
    pub fn reconcile_pair(&self, a: &UserId, b: &UserId) -> MatchResult<PairReconciliation> {
        if a == b {
            return Err(self_pair(a));
        }
        let pair = PairKey::new(a.clone(), b.clone());

        // Scoring reads vectors and may call out for explanations; no locks yet
        let mut records = Vec::with_capacity(4);
        for match_type in MatchType::ALL {
            let forward = self.matcher.score(a, b, match_type)?;
            records.push(MatchRecord::from_scored(a.clone(), &forward));
            let backward = self.matcher.score(b, a, match_type.reciprocal())?;
            records.push(MatchRecord::from_scored(b.clone(), &backward));
        }

        let first = self.user_lock(&pair.first);
        let second = self.user_lock(&pair.second);
        let _first = first.lock();
        let _second = second.lock();

        let mut healed = 0;
        for match_type in MatchType::ALL {
            let forward = self.store.get(a, b, match_type)?.is_some();
            let backward = self.store.get(b, a, match_type.reciprocal())?.is_some();
            if forward != backward {
                let (owner, matched) = if forward { (a, b) } else { (b, a) };
                let err = MatchError::InconsistentLedger {
                    owner: owner.clone(),
                    matched: matched.clone(),
                    reason: format!("missing reciprocal of {match_type} record"),
                };
                warn!(error = %err, pair = %pair, "self-healing asymmetric pair");
                healed += 1;
            }
        }

        let outcomes = self.upsert_all(records)?;
        debug!(pair = %pair, healed, ?outcomes, "pair reconciled");
        Ok(PairReconciliation {
            pair,
            outcomes,
            healed,
        })
    }

    /// Stored matches for `user`, best first, at most `top_k`.
    pub fn list_matches(
        &self,
        user: &UserId,
        match_type: MatchType,
        top_k: usize,
    ) -> MatchResult<Vec<MatchRecord>> {
        self.ranked_matches(user, match_type, top_k, 0.0)
    }

    /// Like [`list_matches`](Self::list_matches) but dropping records
    /// scored under `min_threshold`.
    pub fn ranked_matches(
        &self,
        user: &UserId,
        match_type: MatchType,
        top_k: usize,
        min_threshold: f64,
    ) -> MatchResult<Vec<MatchRecord>> {
        let mut records: Vec<MatchRecord> = self
            .store
            .records_for(user, Some(match_type))?
            .into_iter()
            .filter(|record| record.score >= min_threshold)
            .collect();
        records.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.matched.cmp(&b.matched))
        });
        records.truncate(top_k);
        Ok(records)
    }

    /// Everyone `user` has a stored record with, in either type.
    pub fn counterparts(&self, user: &UserId) -> MatchResult<BTreeSet<UserId>> {
        Ok(self
            .store
            .records_for(user, None)?
            .into_iter()
            .map(|record| record.matched)
            .collect())
    }

    /// Records whose reciprocal entry is missing.
    pub fn audit(&self) -> MatchResult<Vec<MatchError>> {
        let mut problems = Vec::new();
        for record in self.store.all()? {
            let partner =
                self.store
                    .get(&record.matched, &record.owner, record.match_type.reciprocal())?;
            if partner.is_none() {
                problems.push(MatchError::InconsistentLedger {
                    owner: record.owner,
                    matched: record.matched,
                    reason: format!("missing reciprocal of {} record", record.match_type),
                });
            }
        }
        Ok(problems)
    }

    pub fn is_notified(&self, pair: &PairKey) -> MatchResult<bool> {
        self.store.is_notified(pair)
    }

    pub fn mark_notified(&self, pairs: impl IntoIterator<Item = PairKey>) -> MatchResult<()> {
        for pair in pairs {
            self.store.mark_notified(pair)?;
        }
        Ok(())
    }
}

fn self_pair(user: &UserId) -> MatchError {
    MatchError::InconsistentLedger {
        owner: user.clone(),
        matched: user.clone(),
        reason: "a user cannot be matched with themselves".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::InMemoryAccountStore;
    use crate::config::MatchingConfig;
    use crate::ledger::InMemoryMatchStore;
    use crate::matching::Explainer;
    use crate::types::VectorKind;
    use crate::vector::{InMemoryVectorStore, ProfileVector, VectorStore};

    struct Fixture {
        vectors: InMemoryVectorStore,
        store: InMemoryMatchStore,
        matcher: Arc<SimilarityMatcher>,
        ledger: ReciprocalLedger,
    }

    fn fixture() -> Fixture {
        let vectors = InMemoryVectorStore::new();
        let store = InMemoryMatchStore::new();
        let config = MatchingConfig::default();
        let highlight = config.highlight_floor;
        let matcher = Arc::new(SimilarityMatcher::new(
            Arc::new(vectors.clone()),
            Arc::new(InMemoryAccountStore::new()),
            config,
            Explainer::new(None, false, highlight),
        ));
        let ledger = ReciprocalLedger::new(Arc::new(store.clone()), matcher.clone());
        Fixture {
            vectors,
            store,
            matcher,
            ledger,
        }
    }

    fn profile(f: &Fixture, user: &str, requirements: [f32; 2], offerings: [f32; 2]) {
        for (kind, values) in [
            (VectorKind::Requirements, requirements),
            (VectorKind::Offerings, offerings),
        ] {
            f.vectors
                .upsert(ProfileVector::new(UserId::from(user), kind, values.to_vec()))
                .unwrap();
        }
    }

    fn ids(a: &str, b: &str) -> (UserId, UserId) {
        (UserId::from(a), UserId::from(b))
    }

    #[test]
    fn record_match_reports_outcome() {
        let f = fixture();
        profile(&f, "alice", [1.0, 0.0], [0.0, 1.0]);
        profile(&f, "bob", [0.0, 1.0], [1.0, 0.0]);
        let (alice, bob) = ids("alice", "bob");
        let r2o = MatchType::RequirementsToOfferings;

        let scored = f.matcher.score(&alice, &bob, r2o).unwrap();
        assert_eq!(
            f.ledger.record_match(&alice, &bob, r2o, &scored).unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            f.ledger.record_match(&alice, &bob, r2o, &scored).unwrap(),
            UpsertOutcome::Unchanged
        );

        let mut weaker = scored.clone();
        weaker.score = 0.1;
        assert_eq!(
            f.ledger.record_match(&alice, &bob, r2o, &weaker).unwrap(),
            UpsertOutcome::Updated
        );
        assert_eq!(f.store.len(), 1);
    }

    #[test]
    fn reconcile_writes_both_directions() {
        let f = fixture();
        profile(&f, "alice", [1.0, 0.0], [0.0, 1.0]);
        profile(&f, "bob", [0.0, 1.0], [1.0, 0.0]);
        let (alice, bob) = ids("alice", "bob");

        let result = f.ledger.reconcile_pair(&alice, &bob).unwrap();
        assert_eq!(result.outcomes.len(), 4);
        assert_eq!(f.store.len(), 4);
        assert!(f.ledger.audit().unwrap().is_empty());

        let forward = f
            .store
            .get(&alice, &bob, MatchType::RequirementsToOfferings)
            .unwrap()
            .unwrap();
        let mirror = f
            .store
            .get(&bob, &alice, MatchType::OfferingsToRequirements)
            .unwrap()
            .unwrap();
        assert!((forward.score - 1.0).abs() < 1e-6);
        assert_eq!(forward.score, mirror.score);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let f = fixture();
        profile(&f, "alice", [1.0, 0.0], [0.6, 0.8]);
        profile(&f, "bob", [0.8, 0.6], [0.7, 0.7]);
        let (alice, bob) = ids("alice", "bob");

        f.ledger.reconcile_pair(&alice, &bob).unwrap();
        let before = f.store.all().unwrap();
        let again = f.ledger.reconcile_pair(&bob, &alice).unwrap();
        assert!(!again.changed());
        assert_eq!(before, f.store.all().unwrap());
    }

    #[test]
    fn one_sided_record_is_healed() {
        let f = fixture();
        profile(&f, "alice", [1.0, 0.0], [0.0, 1.0]);
        profile(&f, "bob", [0.0, 1.0], [1.0, 0.0]);
        let (alice, bob) = ids("alice", "bob");
        let r2o = MatchType::RequirementsToOfferings;

        let scored = f.matcher.score(&alice, &bob, r2o).unwrap();
        f.ledger.record_match(&alice, &bob, r2o, &scored).unwrap();
        assert_eq!(f.ledger.audit().unwrap().len(), 1);

        let result = f.ledger.reconcile_pair(&alice, &bob).unwrap();
        assert_eq!(result.healed, 1);
        assert!(f.ledger.audit().unwrap().is_empty());
    }

    #[test]
    fn list_matches_ranks_and_truncates() {
        let f = fixture();
        profile(&f, "alice", [1.0, 0.0], [1.0, 0.0]);
        profile(&f, "bob", [1.0, 0.0], [1.0, 0.0]);
        profile(&f, "carol", [0.6, 0.8], [0.6, 0.8]);
        profile(&f, "dave", [0.0, 1.0], [0.0, 1.0]);
        let alice = UserId::from("alice");
        for other in ["bob", "carol", "dave"] {
            f.ledger.reconcile_pair(&alice, &UserId::from(other)).unwrap();
        }

        let r2o = MatchType::RequirementsToOfferings;
        let all = f.ledger.list_matches(&alice, r2o, 10).unwrap();
        let names: Vec<&str> = all.iter().map(|r| r.matched.as_str()).collect();
        assert_eq!(names, vec!["bob", "carol", "dave"]);

        assert_eq!(f.ledger.list_matches(&alice, r2o, 1).unwrap().len(), 1);
        // dave scores zero and stays stored, just below the threshold
        assert_eq!(f.ledger.ranked_matches(&alice, r2o, 10, 0.5).unwrap().len(), 2);
        assert_eq!(f.ledger.counterparts(&alice).unwrap().len(), 3);
    }

    #[test]
    fn unknown_user_lists_empty() {
        let f = fixture();
        let nobody = UserId::from("nobody");
        assert!(
            f.ledger
                .list_matches(&nobody, MatchType::OfferingsToRequirements, 5)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn self_pair_is_rejected() {
        let f = fixture();
        let alice = UserId::from("alice");
        assert!(matches!(
            f.ledger.reconcile_pair(&alice, &alice),
            Err(MatchError::InconsistentLedger { .. })
        ));
    }

    #[test]
    fn notified_pairs_are_remembered() {
        let f = fixture();
        let (alice, bob) = ids("alice", "bob");
        let pair = PairKey::new(bob, alice);
        assert!(!f.ledger.is_notified(&pair).unwrap());
        f.ledger.mark_notified([pair.clone()]).unwrap();
        assert!(f.ledger.is_notified(&pair).unwrap());
        assert_eq!(f.store.notified_pairs().unwrap(), vec![pair]);
    }
}
