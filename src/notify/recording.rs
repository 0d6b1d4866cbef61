use crate::notify::{Notification, NotificationSink, SinkError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Keeps every delivered notification in memory.
///
/// Used when no backend is configured and in tests. Can be told to fail
/// its first `n` deliveries.
#[derive(Clone, Default)]
pub struct RecordingSink {
    delivered: Arc<Mutex<Vec<(String, Notification)>>>,
    fail_next: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(n: usize) -> Self {
        let sink = Self::default();
        sink.fail_next.store(n, Ordering::SeqCst);
        sink
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .iter()
            .map(|(_, notification)| notification.clone())
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.delivered.lock().iter().map(|(key, _)| key.clone()).collect()
    }

    /// Calls to `deliver`, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: &Notification, key: &str) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(SinkError::Transport("simulated outage".to_string()));
        }
        self.delivered
            .lock()
            .push((key.to_string(), notification.clone()));
        Ok(())
    }
}
