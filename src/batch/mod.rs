//! Three-phase batch update.
//!
//! `collect_dirty -> phase1_repersona -> phase2_match ->
//! phase3_reconcile_notify -> done`, with `failed` reachable from every
//! phase. Phase 1 and 2 fan out one task per dirty user and meet at a
//! barrier; nothing they computed is written until every task has
//! reported. Phase 3 runs on the calling task.

mod orchestrator;
mod pipeline;
mod workers;

pub use orchestrator::BatchOrchestrator;
pub use pipeline::{Pipeline, ReconcileSummary, UserMatches};
pub use workers::WorkerPool;

use crate::error::MatchError;
use crate::ledger::PairKey;
use crate::notify::DeliveryOutcome;
use crate::types::{BatchId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    CollectDirty,
    Phase1Repersona,
    Phase2Match,
    Phase3ReconcileNotify,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollectDirty => "collect_dirty",
            Self::Phase1Repersona => "phase1_repersona",
            Self::Phase2Match => "phase2_match",
            Self::Phase3ReconcileNotify => "phase3_reconcile_notify",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dirty user left out of the rest of the run. It stays dirty.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedUser {
    pub user_id: UserId,
    pub phase: RunState,
    pub code: String,
    pub reason: String,
}

/// What a run did.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub state: RunState,
    /// Snapshot taken at `collect_dirty`
    pub dirty: Vec<UserId>,
    pub skipped: Vec<SkippedUser>,
    pub vectors_written: usize,
    pub records_written: usize,
    pub reconciled_pairs: usize,
    pub changed_pairs: usize,
    pub healed: usize,
    pub announced: Vec<PairKey>,
    pub cleared: Vec<UserId>,
    /// Processed, but re-registered while the run was in flight
    pub still_dirty: Vec<UserId>,
    pub delivery: Option<DeliveryOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchReport {
    pub fn new(batch_id: BatchId) -> Self {
        Self {
            batch_id,
            state: RunState::CollectDirty,
            dirty: Vec::new(),
            skipped: Vec::new(),
            vectors_written: 0,
            records_written: 0,
            reconciled_pairs: 0,
            changed_pairs: 0,
            healed: 0,
            announced: Vec::new(),
            cleared: Vec::new(),
            still_dirty: Vec::new(),
            delivery: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn transition(&mut self, next: RunState) {
        info!(
            batch_id = %self.batch_id,
            from = %self.state,
            to = %next,
            "batch phase transition"
        );
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub(crate) fn skip(&mut self, user_id: UserId, error: &MatchError) {
        self.skipped.push(SkippedUser {
            user_id,
            phase: self.state,
            code: error.status_code(),
            reason: error.to_string(),
        });
    }

    pub fn elapsed_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
