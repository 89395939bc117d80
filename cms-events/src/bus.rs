use std::sync::Arc;

use chrono::Utc;
use cms_core::{CmsResult, Event, EventId, Webhook, WebhookId};
use cms_store::{EventRepository, WebhookRepository};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::{signature, Delivery, DeliveryError, RetryPolicy, WebhookPayload, WebhookSender};

/// Outcome of delivering one event to one webhook, after retries.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub webhook: WebhookId,
    pub event: EventId,
    pub attempts: u32,
    pub result: Result<(), DeliveryError>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> bool {
        self.result.is_ok()
    }
}

/// Persists events and fans them out to the workspace's webhooks.
#[derive(Clone)]
pub struct EventBus {
    events: Arc<dyn EventRepository>,
    webhooks: Arc<dyn WebhookRepository>,
    sender: Arc<dyn WebhookSender>,
    policy: RetryPolicy,
}

impl EventBus {
    pub fn new(
        events: Arc<dyn EventRepository>,
        webhooks: Arc<dyn WebhookRepository>,
        sender: Arc<dyn WebhookSender>,
    ) -> Self {
        Self {
            events,
            webhooks,
            sender,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Append to the event log. Saving the same id twice is a no-op.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn save(&self, event: &Event) -> CmsResult<()> {
        self.events.save(event).await
    }

    /// Start a delivery task for each active webhook subscribed to the event's type.
    ///
    /// Returns as soon as the tasks are spawned; failures inside them are logged
    /// and reported through the handles, never to the caller.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn publish(&self, event: &Event) -> CmsResult<Vec<JoinHandle<DeliveryReport>>> {
        let hooks: Vec<Webhook> = self
            .webhooks
            .find_by_workspace(event.workspace)
            .await?
            .into_iter()
            .filter(|hook| hook.wants(&event.event_type))
            .collect();

        if hooks.is_empty() {
            debug!("no webhooks subscribed");
            return Ok(Vec::new());
        }

        let payload = WebhookPayload::from_event(event)?;
        let body = serde_json::to_vec(&payload)?;

        let handles = hooks
            .into_iter()
            .map(|hook| {
                let sender = self.sender.clone();
                let policy = self.policy.clone();
                let body = body.clone();
                let event_id = event.id;
                tokio::spawn(async move { deliver(sender, policy, hook, event_id, body).await })
            })
            .collect::<Vec<_>>();

        info!(webhooks = handles.len(), "publishing event");
        Ok(handles)
    }
}

/// Sign `body` for `webhook` at `timestamp`.
pub fn prepare(webhook: &Webhook, event_id: EventId, body: Vec<u8>, timestamp: i64) -> Result<Delivery, DeliveryError> {
    let signature = signature::sign(&webhook.secret, timestamp, &body)?;
    Ok(Delivery {
        event_id,
        body,
        timestamp,
        signature,
    })
}

async fn deliver(
    sender: Arc<dyn WebhookSender>,
    policy: RetryPolicy,
    webhook: Webhook,
    event_id: EventId,
    body: Vec<u8>,
) -> DeliveryReport {
    let mut attempt = 0;
    let result = loop {
        attempt += 1;
        // re-signed per attempt so the timestamp stays fresh
        let outcome = match prepare(&webhook, event_id, body.clone(), Utc::now().timestamp()) {
            Ok(delivery) => sender.send(&webhook, &delivery).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                debug!(webhook = %webhook.id, attempt, "webhook delivered");
                break Ok(());
            }
            Err(e) if e.is_retryable() && policy.should_retry(attempt) => {
                let wait = policy.backoff(attempt);
                warn!(webhook = %webhook.id, url = %webhook.url, attempt, error = %e, ?wait, "webhook delivery failed, retrying");
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                error!(webhook = %webhook.id, url = %webhook.url, attempt, error = %e, "webhook delivery failed permanently");
                break Err(e);
            }
        }
    };

    DeliveryReport {
        webhook: webhook.id,
        event: event_id,
        attempts: attempt,
        result,
    }
}
