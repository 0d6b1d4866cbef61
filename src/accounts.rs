//! User accounts: registration answers, profile generation, dirty flags and
//! activity timestamps.
//!
//! The dirty flag is the single source of truth for staleness. Registration
//! sets it; only the reconciliation phase of a batch run clears it, and only
//! when the account was not re-registered in the meantime.

use crate::error::{MatchError, MatchResult};
use crate::types::{UserId, VectorKind};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// One (prompt, answer) pair collected during onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub prompt: String,
    pub answer: String,
    /// Explicit kind. Wins over prompt routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<VectorKind>,
}

impl Answer {
    pub fn new(prompt: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            answer: answer.into(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: VectorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Kind this answer feeds, if any.
    pub fn routed_kind(&self) -> Option<VectorKind> {
        self.kind.or_else(|| route_prompt(&self.prompt))
    }
}

/// Map an onboarding prompt to the vector kind its answer describes.
///
/// Rules are checked in order; the first keyword found wins.
pub fn route_prompt(prompt: &str) -> Option<VectorKind> {
    const RULES: &[(&[&str], VectorKind)] = &[
        (&["looking for", "need"], VectorKind::Requirements),
        (&["offer", "provide", "help with"], VectorKind::Offerings),
        (&["skill"], VectorKind::Skills),
        (&["industry", "sector"], VectorKind::Industry),
        (&["stage"], VectorKind::Stage),
        (&["culture", "values", "work style"], VectorKind::Culture),
    ];

    let prompt = prompt.to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| prompt.contains(k)))
        .map(|(_, kind)| *kind)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub user_id: UserId,
    /// Display name used in notifications. Defaults to the user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub answers: Vec<Answer>,
}

impl Registration {
    /// Non-blank answers grouped by the kind they route to.
    pub fn texts_by_kind(&self) -> BTreeMap<VectorKind, Vec<String>> {
        texts_by_kind(&self.answers)
    }

    /// Require at least one requirements-bearing and one offerings-bearing
    /// non-blank answer.
    pub fn validate(&self) -> MatchResult<()> {
        let texts = self.texts_by_kind();
        for kind in [VectorKind::Requirements, VectorKind::Offerings] {
            if !texts.contains_key(&kind) {
                return Err(MatchError::InvalidProfile {
                    user_id: self.user_id.clone(),
                    reason: format!("no non-empty {kind} answer"),
                });
            }
        }
        Ok(())
    }
}

fn texts_by_kind(answers: &[Answer]) -> BTreeMap<VectorKind, Vec<String>> {
    let mut texts: BTreeMap<VectorKind, Vec<String>> = BTreeMap::new();
    for answer in answers {
        let text = answer.answer.trim();
        if text.is_empty() {
            continue;
        }
        match answer.routed_kind() {
            Some(kind) => texts.entry(kind).or_default().push(text.to_string()),
            None => debug!(prompt = %answer.prompt, "answer matches no vector kind, ignored"),
        }
    }
    texts
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub label: String,
    pub answers: Vec<Answer>,
    /// Incremented by every registration
    pub generation: u64,
    pub dirty: bool,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Account {
    pub fn texts_by_kind(&self) -> BTreeMap<VectorKind, Vec<String>> {
        texts_by_kind(&self.answers)
    }
}

/// Storage port for accounts and their dirty flags.
pub trait AccountStore: Send + Sync {
    /// Create or replace the user's answers, bump the generation and set
    /// the dirty flag.
    fn register(&self, registration: Registration) -> MatchResult<Account>;

    fn get(&self, user: &UserId) -> MatchResult<Option<Account>>;

    /// All user ids, sorted.
    fn users(&self) -> MatchResult<Vec<UserId>>;

    /// Dirty users with their current generation, sorted by id.
    fn dirty_users(&self) -> MatchResult<Vec<(UserId, u64)>>;

    /// Clear the flag if the account is still at `generation`.
    /// Returns whether the flag was cleared.
    fn clear_dirty(&self, user: &UserId, generation: u64) -> MatchResult<bool>;

    /// Flag the user for the next run. Bumps the generation so a run that
    /// snapshotted the user earlier cannot clear this mark.
    fn mark_dirty(&self, user: &UserId) -> MatchResult<u64>;

    /// Record user activity, used to break ranking ties.
    fn touch(&self, user: &UserId, at: DateTime<Utc>) -> MatchResult<()>;

    /// Full dump, sorted by id.
    fn all(&self) -> MatchResult<Vec<Account>>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: Arc<DashMap<UserId, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        for account in accounts {
            store.accounts.insert(account.user_id.clone(), account);
        }
        store
    }

    fn unknown(user: &UserId) -> MatchError {
        MatchError::UnknownUser {
            user_id: user.clone(),
        }
    }
}

impl AccountStore for InMemoryAccountStore {
    fn register(&self, registration: Registration) -> MatchResult<Account> {
        registration.validate()?;

        let now = Utc::now();
        let Registration {
            user_id,
            label,
            answers,
        } = registration;

        let mut entry = self
            .accounts
            .entry(user_id.clone())
            .or_insert_with(|| Account {
                user_id: user_id.clone(),
                label: user_id.to_string(),
                answers: Vec::new(),
                generation: 0,
                dirty: false,
                created_at: now,
                last_active: now,
            });

        let account = entry.value_mut();
        if let Some(label) = label {
            account.label = label;
        }
        account.answers = answers;
        account.generation += 1;
        account.dirty = true;
        account.last_active = now;

        Ok(account.clone())
    }

    fn get(&self, user: &UserId) -> MatchResult<Option<Account>> {
        Ok(self.accounts.get(user).map(|entry| entry.value().clone()))
    }

    fn users(&self) -> MatchResult<Vec<UserId>> {
        let mut users: Vec<UserId> = self.accounts.iter().map(|e| e.key().clone()).collect();
        users.sort();
        Ok(users)
    }

    fn dirty_users(&self) -> MatchResult<Vec<(UserId, u64)>> {
        let mut dirty: Vec<(UserId, u64)> = self
            .accounts
            .iter()
            .filter(|entry| entry.dirty)
            .map(|entry| (entry.key().clone(), entry.generation))
            .collect();
        dirty.sort();
        Ok(dirty)
    }

    fn clear_dirty(&self, user: &UserId, generation: u64) -> MatchResult<bool> {
        let mut account = self.accounts.get_mut(user).ok_or_else(|| Self::unknown(user))?;
        if account.generation != generation {
            return Ok(false);
        }
        account.dirty = false;
        Ok(true)
    }

    fn mark_dirty(&self, user: &UserId) -> MatchResult<u64> {
        let mut account = self.accounts.get_mut(user).ok_or_else(|| Self::unknown(user))?;
        account.generation += 1;
        account.dirty = true;
        Ok(account.generation)
    }

    fn touch(&self, user: &UserId, at: DateTime<Utc>) -> MatchResult<()> {
        let mut account = self.accounts.get_mut(user).ok_or_else(|| Self::unknown(user))?;
        if at > account.last_active {
            account.last_active = at;
        }
        Ok(())
    }

    fn all(&self) -> MatchResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self.accounts.iter().map(|e| e.value().clone()).collect();
        accounts.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(user: &str) -> Registration {
        Registration {
            user_id: UserId::from(user),
            label: Some(format!("{user} label")),
            answers: vec![
                Answer::new("What are you looking for?", "Seed funding for a fintech app"),
                Answer::new("What can you offer others?", "Mentoring on product design"),
            ],
        }
    }

    #[test]
    fn prompts_route_to_kinds() {
        assert_eq!(route_prompt("What are you LOOKING FOR?"), Some(VectorKind::Requirements));
        assert_eq!(route_prompt("What do you need most?"), Some(VectorKind::Requirements));
        assert_eq!(route_prompt("What can you provide?"), Some(VectorKind::Offerings));
        assert_eq!(route_prompt("Top skills?"), Some(VectorKind::Skills));
        assert_eq!(route_prompt("Which sector are you in?"), Some(VectorKind::Industry));
        assert_eq!(route_prompt("What stage is your company?"), Some(VectorKind::Stage));
        assert_eq!(route_prompt("Describe your work style"), Some(VectorKind::Culture));
        assert_eq!(route_prompt("Favourite colour?"), None);
    }

    #[test]
    fn explicit_kind_wins_over_routing() {
        let answer = Answer::new("What are you looking for?", "Rust").with_kind(VectorKind::Skills);
        assert_eq!(answer.routed_kind(), Some(VectorKind::Skills));
    }

    #[test]
    fn registration_requires_both_sides() {
        let mut reg = registration("alice");
        reg.answers[1].answer = "   ".to_string();
        let err = reg.validate().unwrap_err();
        assert!(matches!(err, MatchError::InvalidProfile { .. }));
        assert!(err.to_string().contains("offerings"));
    }

    #[test]
    fn register_bumps_generation_and_sets_dirty() {
        let store = InMemoryAccountStore::new();
        let first = store.register(registration("alice")).unwrap();
        assert_eq!(first.generation, 1);
        assert!(first.dirty);
        assert_eq!(first.label, "alice label");

        let second = store.register(registration("alice")).unwrap();
        assert_eq!(second.generation, 2);
        assert_eq!(second.created_at, first.created_at);
    }

    #[test]
    fn clear_dirty_respects_newer_generation() {
        let store = InMemoryAccountStore::new();
        let alice = UserId::from("alice");
        store.register(registration("alice")).unwrap();
        let snapshot = store.dirty_users().unwrap();
        assert_eq!(snapshot, vec![(alice.clone(), 1)]);

        // Re-registered while a run was in flight
        store.register(registration("alice")).unwrap();
        assert!(!store.clear_dirty(&alice, 1).unwrap());
        assert!(store.get(&alice).unwrap().unwrap().dirty);

        assert!(store.clear_dirty(&alice, 2).unwrap());
        assert!(store.dirty_users().unwrap().is_empty());
    }

    #[test]
    fn marks_after_a_snapshot_survive_the_clear() {
        let store = InMemoryAccountStore::new();
        let user = UserId::from("alice");
        store.register(registration("alice")).unwrap();
        let (_, seen) = store.dirty_users().unwrap()[0].clone();

        let bumped = store.mark_dirty(&user).unwrap();
        assert_eq!(bumped, seen + 1);
        assert!(!store.clear_dirty(&user, seen).unwrap());
        assert_eq!(store.dirty_users().unwrap(), vec![(user.clone(), bumped)]);

        assert!(store.clear_dirty(&user, bumped).unwrap());
        assert!(store.dirty_users().unwrap().is_empty());
    }

    #[test]
    fn unknown_user_errors() {
        let store = InMemoryAccountStore::new();
        let err = store.mark_dirty(&UserId::from("ghost")).unwrap_err();
        assert_eq!(err.status_code(), "UNKNOWN_USER");
    }
}
