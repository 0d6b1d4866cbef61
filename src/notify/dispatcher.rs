use crate::config::NotificationConfig;
use crate::error::MatchError;
use crate::notify::{
    BatchPayload, MatchNotice, Notification, NotificationSink, PairNotice, RecordingSink,
    SinglePayload, WebhookSink,
};
use crate::types::{BatchId, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A notification that exhausted its attempts. Kept, never dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedDelivery {
    pub key: String,
    pub attempts: u32,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
    pub notification: Notification,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    /// Key was already delivered by an earlier call
    Duplicate,
    Failed(FailedDelivery),
}

impl DeliveryOutcome {
    /// The receiver has seen this key at least once.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered { .. } | Self::Duplicate)
    }
}

/// Persisted dispatcher bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatcherState {
    #[serde(default)]
    pub delivered: Vec<String>,
    #[serde(default)]
    pub failures: Vec<FailedDelivery>,
}

/// At-least-once delivery with idempotency keys and bounded retries.
pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
    max_attempts: u32,
    backoff: Duration,
    delivered: DashSet<String>,
    failures: Mutex<Vec<FailedDelivery>>,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, config: &NotificationConfig) -> Self {
        Self {
            sink,
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
            delivered: DashSet::new(),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Webhook sink when a backend is configured, otherwise a recording
    /// sink so runs still complete.
    pub fn from_config(config: &NotificationConfig) -> Self {
        let sink: Arc<dyn NotificationSink> = match &config.backend_url {
            Some(url) => Arc::new(WebhookSink::new(
                url.clone(),
                config.api_key.clone(),
                Duration::from_secs(config.timeout_secs),
            )),
            None => {
                info!("no notification backend configured, recording deliveries only");
                Arc::new(RecordingSink::new())
            }
        };
        Self::new(sink, config)
    }

    pub async fn notify_batch(&self, batch_id: &BatchId, pairs: Vec<PairNotice>) -> DeliveryOutcome {
        self.dispatch(Notification::Batch(BatchPayload {
            batch_id: batch_id.clone(),
            pairs,
        }))
        .await
    }

    pub async fn notify_single(
        &self,
        user: &UserId,
        generation: u64,
        matches: Vec<UserId>,
    ) -> DeliveryOutcome {
        self.dispatch(Notification::Single {
            generation,
            payload: SinglePayload {
                user_id: user.clone(),
                matches: matches
                    .into_iter()
                    .map(|target_user_id| MatchNotice { target_user_id })
                    .collect(),
            },
        })
        .await
    }

    async fn dispatch(&self, notification: Notification) -> DeliveryOutcome {
        let key = notification.idempotency_key();
        if self.delivered.contains(&key) {
            debug!(%key, "already delivered, skipping");
            return DeliveryOutcome::Duplicate;
        }

        let mut attempts = 0;
        let reason = loop {
            attempts += 1;
            match self.sink.deliver(&notification, &key).await {
                Ok(()) => {
                    self.delivered.insert(key.clone());
                    info!(%key, attempts, "notification delivered");
                    return DeliveryOutcome::Delivered { attempts };
                }
                Err(e) if e.is_retryable() && attempts < self.max_attempts => {
                    let delay = self.backoff * 2u32.saturating_pow(attempts - 1);
                    warn!(
                        %key,
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break e.to_string(),
            }
        };

        let err = MatchError::DeliveryFailure {
            key: key.clone(),
            attempts,
            reason: reason.clone(),
        };
        error!(error = %err, "giving up on notification");
        let failure = FailedDelivery {
            key,
            attempts,
            reason,
            failed_at: Utc::now(),
            notification,
        };
        self.failures.lock().push(failure.clone());
        DeliveryOutcome::Failed(failure)
    }

    pub fn failures(&self) -> Vec<FailedDelivery> {
        self.failures.lock().clone()
    }

    pub fn export_state(&self) -> DispatcherState {
        let mut delivered: Vec<String> = self.delivered.iter().map(|k| k.key().clone()).collect();
        delivered.sort();
        DispatcherState {
            delivered,
            failures: self.failures(),
        }
    }

    pub fn restore(&self, state: DispatcherState) {
        for key in state.delivered {
            self.delivered.insert(key);
        }
        self.failures.lock().extend(state.failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_attempts: u32) -> NotificationConfig {
        NotificationConfig {
            max_attempts,
            backoff_ms: 1,
            ..NotificationConfig::default()
        }
    }

    fn pair(a: &str, b: &str) -> PairNotice {
        PairNotice {
            user_a: UserId::from(a),
            user_a_label: a.to_uppercase(),
            user_b: UserId::from(b),
            user_b_label: b.to_uppercase(),
        }
    }

    #[tokio::test]
    async fn delivers_once_per_key() {
        let sink = RecordingSink::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(sink.clone()), &config(3));
        let batch = BatchId::from_string("b-1");

        let first = dispatcher.notify_batch(&batch, vec![pair("alice", "bob")]).await;
        assert_eq!(first, DeliveryOutcome::Delivered { attempts: 1 });
        let second = dispatcher.notify_batch(&batch, vec![pair("alice", "bob")]).await;
        assert_eq!(second, DeliveryOutcome::Duplicate);
        assert!(second.is_success());
        assert_eq!(sink.delivered().len(), 1);
        assert_eq!(sink.keys(), vec!["batch:b-1".to_string()]);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let sink = RecordingSink::failing_first(2);
        let dispatcher = NotificationDispatcher::new(Arc::new(sink.clone()), &config(3));

        let outcome = dispatcher
            .notify_single(&UserId::from("alice"), 1, vec![UserId::from("bob")])
            .await;
        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 3 });
        assert_eq!(sink.attempts(), 3);
        assert!(dispatcher.failures().is_empty());
    }

    #[tokio::test]
    async fn exhausted_attempts_are_recorded() {
        let sink = RecordingSink::failing_first(5);
        let dispatcher = NotificationDispatcher::new(Arc::new(sink.clone()), &config(3));

        let outcome = dispatcher
            .notify_batch(&BatchId::from_string("b-2"), vec![pair("carol", "dave")])
            .await;
        let DeliveryOutcome::Failed(failure) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(failure.attempts, 3);
        assert_eq!(dispatcher.failures().len(), 1);
        assert!(sink.delivered().is_empty());

        // Not marked delivered, so a later call tries again
        let retry = dispatcher
            .notify_batch(&BatchId::from_string("b-2"), vec![pair("carol", "dave")])
            .await;
        assert!(retry.is_success());
    }

    #[tokio::test]
    async fn empty_single_notification_is_sent() {
        let sink = RecordingSink::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(sink.clone()), &config(1));
        let outcome = dispatcher.notify_single(&UserId::from("ghost"), 1, Vec::new()).await;
        assert!(outcome.is_success());

        let Notification::Single { payload, .. } = &sink.delivered()[0] else {
            panic!("expected single-user notification");
        };
        assert!(payload.matches.is_empty());
    }

    #[tokio::test]
    async fn state_survives_restore() {
        let sink = RecordingSink::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(sink.clone()), &config(1));
        dispatcher
            .notify_batch(&BatchId::from_string("b-3"), Vec::new())
            .await;

        let restored = NotificationDispatcher::new(Arc::new(sink.clone()), &config(1));
        restored.restore(dispatcher.export_state());
        let again = restored
            .notify_batch(&BatchId::from_string("b-3"), Vec::new())
            .await;
        assert_eq!(again, DeliveryOutcome::Duplicate);
        assert_eq!(sink.attempts(), 1);
    }
}
