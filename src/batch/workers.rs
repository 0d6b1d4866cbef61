use crate::batch::RunState;
use crate::config::BatchConfig;
use crate::error::{MatchError, MatchResult};
use crate::types::UserId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, warn};

/// Bounded fan-out of blocking per-user work with timeouts and retries.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
    attempts: u32,
    timeout: Duration,
    backoff: Duration,
}

impl WorkerPool {
    pub fn new(workers: usize, attempts: u32, timeout: Duration, backoff: Duration) -> Self {
        Self {
            workers: workers.max(1),
            attempts: attempts.max(1),
            timeout,
            backoff,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(
            config.workers,
            config.task_attempts,
            Duration::from_millis(config.task_timeout_ms),
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    /// Run `work` once per user and wait for all of them.
    ///
    /// Results come back in input order. A task that cannot be joined is
    /// logged and left out; its user is treated as not processed.
    pub async fn run_all<T, F>(
        &self,
        phase: RunState,
        users: Vec<UserId>,
        work: F,
    ) -> Vec<(UserId, MatchResult<T>)>
    where
        T: Send + 'static,
        F: Fn(&UserId) -> MatchResult<T> + Send + Sync + 'static,
    {
        let work = Arc::new(work);
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let total = users.len();

        for (index, user) in users.into_iter().enumerate() {
            let work = Arc::clone(&work);
            let permits = Arc::clone(&permits);
            let pool = *self;
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let result = pool.run_one(phase, &user, work).await;
                (index, user, result)
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(done) => results.push(done),
                Err(e) => error!(%phase, error = %e, "worker task lost"),
            }
        }
        results.sort_by_key(|(index, _, _)| *index);
        results
            .into_iter()
            .map(|(_, user, result)| (user, result))
            .collect()
    }

    async fn run_one<T, F>(&self, phase: RunState, user: &UserId, work: Arc<F>) -> MatchResult<T>
    where
        T: Send + 'static,
        F: Fn(&UserId) -> MatchResult<T> + Send + Sync + 'static,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let task_work = Arc::clone(&work);
            let task_user = user.clone();
            let handle = tokio::task::spawn_blocking(move || task_work(&task_user));

            let result = match tokio::time::timeout(self.timeout, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join)) => Err(MatchError::Worker {
                    phase: phase.to_string(),
                    reason: join.to_string(),
                }),
                Err(_) => Err(MatchError::Timeout {
                    operation: format!("{phase} for '{user}'"),
                    after_ms: self.timeout.as_millis() as u64,
                }),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.attempts => {
                    warn!(
                        %phase,
                        user_id = %user,
                        attempt,
                        error = %e,
                        "task failed, retrying"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                other => return other,
            }
        }
    }
}
