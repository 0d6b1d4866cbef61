//! "Matches ready" notifications.
//!
//! Payloads are handed to a [`NotificationSink`] by the
//! [`NotificationDispatcher`], which owns idempotency, retries and the
//! record of failed deliveries.

mod dispatcher;
mod recording;
mod webhook;

pub use dispatcher::{DeliveryOutcome, DispatcherState, FailedDelivery, NotificationDispatcher};
pub use recording::RecordingSink;
pub use webhook::WebhookSink;

use crate::types::{BatchId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One newly matched pair, as announced to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairNotice {
    pub user_a: UserId,
    pub user_a_label: String,
    pub user_b: UserId,
    pub user_b_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPayload {
    pub batch_id: BatchId,
    pub pairs: Vec<PairNotice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchNotice {
    pub target_user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinglePayload {
    pub user_id: UserId,
    pub matches: Vec<MatchNotice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Batch(BatchPayload),
    Single {
        /// Profile generation the matches were computed from
        generation: u64,
        #[serde(flatten)]
        payload: SinglePayload,
    },
}

impl Notification {
    /// Receivers may see the same key more than once.
    pub fn idempotency_key(&self) -> String {
        match self {
            Self::Batch(payload) => format!("batch:{}", payload.batch_id),
            Self::Single {
                generation,
                payload,
            } => format!("user:{}:{generation}", payload.user_id),
        }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Receiver rejected delivery with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Receiver refused credentials (status {0})")]
    Unauthorized(u16),
}

impl SinkError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::Unauthorized(_) => false,
        }
    }
}

/// Where notifications go.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification, key: &str) -> Result<(), SinkError>;
}
