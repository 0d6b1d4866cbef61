use crate::notify::{Notification, NotificationSink, SinkError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

const BATCH_ENDPOINT: &str = "/api/v1/webhooks/matches-ready";
const SINGLE_ENDPOINT: &str = "/api/v1/webhooks/user-matches-ready";

/// Posts notifications to the backend as JSON.
pub struct WebhookSink {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl WebhookSink {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(timeout.min(Duration::from_secs(10)))
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn endpoint(&self, notification: &Notification) -> String {
        let path = match notification {
            Notification::Batch(_) => BATCH_ENDPOINT,
            Notification::Single { .. } => SINGLE_ENDPOINT,
        };
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, notification: &Notification, key: &str) -> Result<(), SinkError> {
        let url = self.endpoint(notification);
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Idempotency-Key", key);
        if let Some(api_key) = &self.api_key {
            request = request.header("X-API-KEY", api_key);
        }
        request = match notification {
            Notification::Batch(payload) => request.json(payload),
            Notification::Single { payload, .. } => request.json(payload),
        };

        // Payloads and headers carry user data and credentials; log the key only
        debug!(%key, %url, "posting webhook");
        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let code = status.as_u16();
        if code == 401 || code == 403 {
            error!(%key, status = code, "webhook credentials rejected");
            return Err(SinkError::Unauthorized(code));
        }
        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status: code,
            body: body.chars().take(200).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{BatchPayload, SinglePayload};
    use crate::types::{BatchId, UserId};

    #[test]
    fn endpoints_per_notification() {
        let sink = WebhookSink::new("https://backend.test/", None, Duration::from_secs(30));
        let batch = Notification::Batch(BatchPayload {
            batch_id: BatchId::from_string("b"),
            pairs: Vec::new(),
        });
        let single = Notification::Single {
            generation: 1,
            payload: SinglePayload {
                user_id: UserId::from("alice"),
                matches: Vec::new(),
            },
        };
        assert_eq!(
            sink.endpoint(&batch),
            "https://backend.test/api/v1/webhooks/matches-ready"
        );
        assert_eq!(
            sink.endpoint(&single),
            "https://backend.test/api/v1/webhooks/user-matches-ready"
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_transport_error() {
        let sink = WebhookSink::new("http://127.0.0.1:9", None, Duration::from_millis(500));
        let batch = Notification::Batch(BatchPayload {
            batch_id: BatchId::from_string("b"),
            pairs: Vec::new(),
        });
        let err = sink.deliver(&batch, "batch:b").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
