//! JSON snapshot of the in-memory state.

use crate::accounts::Account;
use crate::error::{MatchError, MatchResult};
use crate::feedback::FeedbackRecord;
use crate::ledger::{MatchRecord, PairKey};
use crate::notify::DispatcherState;
use crate::types::{MatchType, UserId, VectorKind};
use crate::vector::ProfileVector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to rebuild an engine on the in-memory adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub vectors: Vec<ProfileVector>,
    #[serde(default)]
    pub matches: Vec<MatchRecord>,
    #[serde(default)]
    pub notified: Vec<PairKey>,
    #[serde(default)]
    pub feedback: Vec<FeedbackRecord>,
    #[serde(default)]
    pub dispatcher: DispatcherState,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            accounts: Vec::new(),
            vectors: Vec::new(),
            matches: Vec::new(),
            notified: Vec::new(),
            feedback: Vec::new(),
            dispatcher: DispatcherState::default(),
        }
    }
}

impl Snapshot {
    /// Load from `path`. A missing file is `None`, not an error.
    pub fn load(path: &Path) -> MatchResult<Option<Self>> {
        if !path.exists() {
            debug!(path = %path.display(), "no snapshot yet");
            return Ok(None);
        }

        let json = fs::read_to_string(path).map_err(|e| persistence(path, e))?;
        let snapshot: Snapshot = serde_json::from_str(&json).map_err(|e| persistence(path, e))?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(persistence(
                path,
                format!(
                    "snapshot version {} is newer than supported version {SNAPSHOT_VERSION}",
                    snapshot.version
                ),
            ));
        }
        snapshot.validate().map_err(|e| persistence(path, e))?;
        Ok(Some(snapshot))
    }

    /// Write to a sibling temp file, then rename over `path`.
    pub fn save(&self, path: &Path) -> MatchResult<()> {
        self.validate().map_err(|e| persistence(path, e))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| persistence(path, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| persistence(path, e))?;

        let mut tmp_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        fs::write(&tmp, json).map_err(|e| persistence(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| persistence(path, e))?;
        debug!(
            path = %path.display(),
            accounts = self.accounts.len(),
            vectors = self.vectors.len(),
            matches = self.matches.len(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Uniqueness of the persisted layout: accounts by user, vectors by
    /// (user, kind), matches by (owner, matched, match_type).
    pub fn validate(&self) -> Result<(), String> {
        let mut users: BTreeSet<&UserId> = BTreeSet::new();
        for account in &self.accounts {
            if !users.insert(&account.user_id) {
                return Err(format!("duplicate account '{}'", account.user_id));
            }
        }

        let mut vectors: BTreeSet<(&UserId, VectorKind)> = BTreeSet::new();
        for vector in &self.vectors {
            if !vectors.insert((&vector.user_id, vector.kind)) {
                return Err(format!(
                    "duplicate {} vector for '{}'",
                    vector.kind, vector.user_id
                ));
            }
        }

        let mut matches: BTreeSet<(&UserId, &UserId, MatchType)> = BTreeSet::new();
        for record in &self.matches {
            if !matches.insert((&record.owner, &record.matched, record.match_type)) {
                return Err(format!(
                    "duplicate {} match '{}' -> '{}'",
                    record.match_type, record.owner, record.matched
                ));
            }
        }
        Ok(())
    }
}

fn persistence(path: &Path, reason: impl ToString) -> MatchError {
    MatchError::Persistence {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vector(user: &str, kind: VectorKind) -> ProfileVector {
        ProfileVector::new(UserId::from(user), kind, vec![1.0, 0.0])
    }

    #[test]
    fn missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        assert!(Snapshot::load(&dir.path().join("state.json")).unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let snapshot = Snapshot {
            vectors: vec![vector("alice", VectorKind::Requirements)],
            notified: vec![PairKey::new(UserId::from("b"), UserId::from("a"))],
            ..Snapshot::default()
        };
        snapshot.save(&path).unwrap();

        assert!(!dir.path().join("nested").join("state.json.tmp").exists());
        let loaded = Snapshot::load(&path).unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn duplicate_vectors_are_rejected() {
        let dir = TempDir::new().unwrap();
        let snapshot = Snapshot {
            vectors: vec![
                vector("alice", VectorKind::Skills),
                vector("alice", VectorKind::Skills),
            ],
            ..Snapshot::default()
        };
        let err = snapshot.save(&dir.path().join("state.json")).unwrap_err();
        assert!(matches!(err, MatchError::Persistence { .. }));
    }

    #[test]
    fn corrupt_file_is_a_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Snapshot::load(&path),
            Err(MatchError::Persistence { .. })
        ));
    }
}
