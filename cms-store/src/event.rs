use async_trait::async_trait;
use cms_core::{CmsError, CmsResult, Event, EventId, Webhook, WebhookId, WorkspaceId};

use crate::MemoryDatabase;

/// Append-only event log.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append; saving an id that is already present is a no-op.
    async fn save(&self, event: &Event) -> CmsResult<()>;

    async fn find_by_id(&self, id: EventId) -> CmsResult<Event>;

    /// Every event in append order.
    async fn list(&self) -> CmsResult<Vec<Event>>;
}

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn save(&self, webhook: &Webhook) -> CmsResult<()>;

    async fn find_by_id(&self, id: WebhookId) -> CmsResult<Webhook>;

    async fn find_by_workspace(&self, workspace: WorkspaceId) -> CmsResult<Vec<Webhook>>;
}

#[derive(Clone)]
pub struct MemoryEventRepository {
    db: MemoryDatabase,
}

impl MemoryEventRepository {
    pub fn new(db: MemoryDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventRepository for MemoryEventRepository {
    async fn save(&self, event: &Event) -> CmsResult<()> {
        self.db
            .write(|state| {
                if !state.event_index.contains_key(&event.id) {
                    let position = state.events.len();
                    state.events.push(event.clone());
                    state.event_index.insert(event.id, position);
                }
            })
            .await;
        Ok(())
    }

    async fn find_by_id(&self, id: EventId) -> CmsResult<Event> {
        self.db
            .read(|state| state.event_index.get(&id).and_then(|i| state.events.get(*i)).cloned())
            .ok_or_else(|| CmsError::not_found(format!("event {} not found", id)))
    }

    async fn list(&self) -> CmsResult<Vec<Event>> {
        Ok(self.db.read(|state| state.events.clone()))
    }
}

#[derive(Clone)]
pub struct MemoryWebhookRepository {
    db: MemoryDatabase,
}

impl MemoryWebhookRepository {
    pub fn new(db: MemoryDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl WebhookRepository for MemoryWebhookRepository {
    async fn save(&self, webhook: &Webhook) -> CmsResult<()> {
        self.db
            .write(|state| state.webhooks.insert(webhook.id, webhook.clone()))
            .await;
        Ok(())
    }

    async fn find_by_id(&self, id: WebhookId) -> CmsResult<Webhook> {
        self.db
            .read(|state| state.webhooks.get(&id).cloned())
            .ok_or_else(|| CmsError::not_found(format!("webhook {} not found", id)))
    }

    async fn find_by_workspace(&self, workspace: WorkspaceId) -> CmsResult<Vec<Webhook>> {
        let mut hooks: Vec<Webhook> = self.db.read(|state| {
            state
                .webhooks
                .values()
                .filter(|w| w.workspace == workspace)
                .cloned()
                .collect()
        });
        hooks.sort_by_key(|w| w.id);
        Ok(hooks)
    }
}
