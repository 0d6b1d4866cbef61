use crate::batch::{BatchReport, Pipeline, RunState, UserMatches, WorkerPool};
use crate::config::BatchConfig;
use crate::error::{MatchError, MatchResult};
use crate::ledger::PairKey;
use crate::notify::{NotificationDispatcher, PairNotice};
use crate::types::{BatchId, UserId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Drives one batch run over the dirty users.
pub struct BatchOrchestrator {
    pipeline: Pipeline,
    dispatcher: Arc<NotificationDispatcher>,
    workers: WorkerPool,
    config: BatchConfig,
    top_k: usize,
    min_threshold: f64,
    // One run at a time; a second caller is turned away
    running: Mutex<()>,
}

impl BatchOrchestrator {
    pub fn new(
        pipeline: Pipeline,
        dispatcher: Arc<NotificationDispatcher>,
        config: BatchConfig,
    ) -> Self {
        let matching = pipeline.matcher.config();
        let top_k = matching.top_k;
        let min_threshold = matching.min_threshold;
        Self {
            pipeline,
            dispatcher,
            workers: WorkerPool::from_config(&config),
            config,
            top_k,
            min_threshold,
            running: Mutex::new(()),
        }
    }

    /// Run to `done` or `failed`.
    ///
    /// On failure nothing after the failing phase is committed, dirty
    /// flags are untouched and no batch notification is sent.
    pub async fn run(&self, batch_id: BatchId, cancel: &CancellationToken) -> MatchResult<BatchReport> {
        let Ok(_running) = self.running.try_lock() else {
            warn!(batch_id = %batch_id, "batch run refused, another run is in progress");
            return Err(MatchError::BatchInProgress {
                batch_id: batch_id.to_string(),
            });
        };
        let mut report = BatchReport::new(batch_id);
        info!(batch_id = %report.batch_id, "batch run started");

        match self.execute(&mut report, cancel).await {
            Ok(()) => {
                report.transition(RunState::Done);
                info!(
                    batch_id = %report.batch_id,
                    dirty = report.dirty.len(),
                    skipped = report.skipped.len(),
                    pairs = report.reconciled_pairs,
                    announced = report.announced.len(),
                    elapsed_ms = report.elapsed_ms().unwrap_or_default(),
                    "batch run complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    batch_id = %report.batch_id,
                    phase = %report.state,
                    code = %e.status_code(),
                    error = %e,
                    "batch run failed"
                );
                report.transition(RunState::Failed);
                Err(e)
            }
        }
    }

    async fn execute(&self, report: &mut BatchReport, cancel: &CancellationToken) -> MatchResult<()> {
        let snapshot: BTreeMap<UserId, u64> =
            self.pipeline.accounts.dirty_users()?.into_iter().collect();
        report.dirty = snapshot.keys().cloned().collect();

        if snapshot.is_empty() {
            info!(batch_id = %report.batch_id, "no dirty users");
            if self.config.notify_empty {
                report.delivery = Some(
                    self.dispatcher
                        .notify_batch(&report.batch_id, Vec::new())
                        .await,
                );
            }
            return Ok(());
        }

        checkpoint(cancel, RunState::Phase1Repersona)?;
        report.transition(RunState::Phase1Repersona);
        let pipeline = self.pipeline.clone();
        let embedded = self
            .workers
            .run_all(RunState::Phase1Repersona, report.dirty.clone(), move |user| {
                pipeline.embed_profile(user)
            })
            .await;

        let mut ready = Vec::new();
        let mut vectors = Vec::new();
        for (user, result) in embedded {
            match result {
                Ok(user_vectors) => {
                    ready.push(user);
                    vectors.extend(user_vectors);
                }
                Err(e) => isolate(report, user, e)?,
            }
        }
        report.vectors_written = self.pipeline.commit_vectors(vectors)?;

        checkpoint(cancel, RunState::Phase2Match)?;
        report.transition(RunState::Phase2Match);
        let pipeline = self.pipeline.clone();
        let (top_k, min_threshold) = (self.top_k, self.min_threshold);
        let rematched = self
            .workers
            .run_all(RunState::Phase2Match, ready, move |user| {
                pipeline.find_matches(user, top_k, min_threshold)
            })
            .await;

        let mut matched: Vec<UserMatches> = Vec::new();
        for (user, result) in rematched {
            match result {
                Ok(found) => matched.push(found),
                Err(e) => isolate(report, user, e)?,
            }
        }
        report.records_written = self.pipeline.commit_matches(&matched)?;

        checkpoint(cancel, RunState::Phase3ReconcileNotify)?;
        report.transition(RunState::Phase3ReconcileNotify);
        let touched: BTreeSet<PairKey> = matched.iter().flat_map(UserMatches::touched).collect();
        let pipeline = self.pipeline.clone();
        let summary = tokio::task::spawn_blocking(move || pipeline.reconcile(&touched))
            .await
            .map_err(|e| MatchError::Worker {
                phase: RunState::Phase3ReconcileNotify.to_string(),
                reason: e.to_string(),
            })??;
        report.reconciled_pairs = summary.pairs;
        report.changed_pairs = summary.changed;
        report.healed = summary.healed;

        let announce = self.new_pairs(&matched)?;

        for user_matches in &matched {
            let user = &user_matches.user;
            let Some(generation) = snapshot.get(user) else {
                continue;
            };
            if self.pipeline.accounts.clear_dirty(user, *generation)? {
                report.cleared.push(user.clone());
            } else {
                debug!(user_id = %user, "re-registered during run, stays dirty");
                report.still_dirty.push(user.clone());
            }
        }

        if announce.is_empty() && !self.config.notify_empty {
            debug!(batch_id = %report.batch_id, "no new pairs to announce");
            return Ok(());
        }

        let mut notices = Vec::with_capacity(announce.len());
        for pair in &announce {
            notices.push(PairNotice {
                user_a_label: self.pipeline.label_of(&pair.first)?,
                user_a: pair.first.clone(),
                user_b_label: self.pipeline.label_of(&pair.second)?,
                user_b: pair.second.clone(),
            });
        }

        let outcome = self.dispatcher.notify_batch(&report.batch_id, notices).await;
        if outcome.is_success() {
            if let Err(e) = self.pipeline.ledger.mark_notified(announce.iter().cloned()) {
                warn!(batch_id = %report.batch_id, error = %e, "could not mark pairs announced");
            }
            report.announced = announce;
        }
        report.delivery = Some(outcome);
        Ok(())
    }

    /// Pairs not yet announced, at most `max_pairs_per_user` per dirty
    /// user, best first. A pair between two dirty users counts once.
    fn new_pairs(&self, matched: &[UserMatches]) -> MatchResult<Vec<PairKey>> {
        let mut chosen: Vec<PairKey> = Vec::new();
        let mut seen: BTreeSet<PairKey> = BTreeSet::new();

        for user_matches in matched {
            let mut taken = 0;
            for candidate in user_matches.ranked_candidates() {
                if taken >= self.config.max_pairs_per_user {
                    break;
                }
                let pair = PairKey::new(user_matches.user.clone(), candidate);
                if seen.contains(&pair) || self.pipeline.ledger.is_notified(&pair)? {
                    continue;
                }
                seen.insert(pair.clone());
                chosen.push(pair);
                taken += 1;
            }
        }
        Ok(chosen)
    }
}

fn checkpoint(cancel: &CancellationToken, next: RunState) -> MatchResult<()> {
    if cancel.is_cancelled() {
        return Err(MatchError::Cancelled {
            phase: next.to_string(),
        });
    }
    Ok(())
}

/// Per-user failures skip the user; infrastructure failures abort.
fn isolate(report: &mut BatchReport, user: UserId, error: MatchError) -> MatchResult<()> {
    if error.is_infrastructure() {
        return Err(error);
    }
    warn!(
        batch_id = %report.batch_id,
        phase = %report.state,
        user_id = %user,
        error = %error,
        "user skipped for this run"
    );
    report.skip(user, &error);
    Ok(())
}
