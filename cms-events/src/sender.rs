use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cms_core::{Webhook, WebhookId};
use parking_lot::Mutex;
use reqwest::Client;

use crate::signature::SIGNATURE_HEADER;
use crate::{Delivery, DeliveryError};

/// Transport for one delivery attempt
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(&self, webhook: &Webhook, delivery: &Delivery) -> Result<(), DeliveryError>;
}

/// POSTs signed JSON bodies over HTTP
#[derive(Clone)]
pub struct HttpWebhookSender {
    client: Client,
    timeout: Duration,
}

impl HttpWebhookSender {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn request(&self, webhook: &Webhook, delivery: &Delivery) -> Result<reqwest::Request, DeliveryError> {
        self.client
            .post(&webhook.url)
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, &delivery.signature)
            .body(delivery.body.clone())
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, webhook: &Webhook, delivery: &Delivery) -> Result<(), DeliveryError> {
        let request = self.request(webhook, delivery)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// In-memory sender that logs attempts and fails on demand.
#[derive(Clone, Default)]
pub struct RecordingSender {
    attempts: Arc<Mutex<Vec<(WebhookId, Delivery)>>>,
    /// Remaining forced failures per webhook; `None` fails forever.
    failures: Arc<Mutex<HashMap<WebhookId, Option<u32>>>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer 503 for the next `times` attempts to `webhook`.
    pub fn fail_times(&self, webhook: WebhookId, times: u32) {
        self.failures.lock().insert(webhook, Some(times));
    }

    pub fn fail_always(&self, webhook: WebhookId) {
        self.failures.lock().insert(webhook, None);
    }

    pub fn attempts(&self) -> Vec<(WebhookId, Delivery)> {
        self.attempts.lock().clone()
    }

    pub fn attempts_for(&self, webhook: WebhookId) -> usize {
        self.attempts.lock().iter().filter(|(id, _)| *id == webhook).count()
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    async fn send(&self, webhook: &Webhook, delivery: &Delivery) -> Result<(), DeliveryError> {
        self.attempts.lock().push((webhook.id, delivery.clone()));

        let mut failures = self.failures.lock();
        match failures.get_mut(&webhook.id) {
            Some(None) => Err(DeliveryError::Status(503)),
            Some(Some(n)) if *n > 0 => {
                *n -= 1;
                Err(DeliveryError::Status(503))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature;
    use cms_core::{EventId, WorkspaceId};

    #[test]
    fn http_request_carries_signature_and_body() {
        let hook = Webhook::new(WorkspaceId::new(), "h", "https://hooks.example.test/in", "s3cret");
        let body = br#"{"id":"1"}"#.to_vec();
        let delivery = Delivery {
            event_id: EventId::new(),
            timestamp: 1_700_000_000,
            signature: signature::sign("s3cret", 1_700_000_000, &body).unwrap(),
            body,
        };

        let sender = HttpWebhookSender::new(Duration::from_secs(5));
        let request = sender.request(&hook, &delivery).unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "https://hooks.example.test/in");
        let header = request.headers()[SIGNATURE_HEADER].to_str().unwrap();
        assert!(signature::verify("s3cret", header, &delivery.body));
        assert_eq!(request.body().and_then(|b| b.as_bytes()), Some(&delivery.body[..]));
    }

    #[test]
    fn bad_url_is_a_transport_error() {
        let hook = Webhook::new(WorkspaceId::new(), "h", "not a url", "s");
        let delivery = Delivery {
            event_id: EventId::new(),
            timestamp: 0,
            signature: String::new(),
            body: Vec::new(),
        };
        let err = HttpWebhookSender::new(Duration::from_secs(1))
            .request(&hook, &delivery)
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
    }
}
