use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cms_core::{CmsError, CmsResult, UploadTicket};
use tracing::debug;

/// Upload ticket registry, keyed by blob uuid.
///
/// Tickets are immutable once written; nothing here expires them on its own.
#[async_trait]
pub trait UploadRepository: Send + Sync {
    async fn save(&self, ticket: &UploadTicket) -> CmsResult<()>;

    async fn find_by_id(&self, uuid: &str) -> CmsResult<UploadTicket>;

    /// Purge tickets expired at `now`; returns how many were removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> CmsResult<usize>;
}

#[derive(Clone)]
pub struct MemoryUploadRepository {
    db: crate::MemoryDatabase,
}

impl MemoryUploadRepository {
    pub fn new(db: crate::MemoryDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UploadRepository for MemoryUploadRepository {
    async fn save(&self, ticket: &UploadTicket) -> CmsResult<()> {
        if ticket.uuid.is_empty() {
            return Err(CmsError::invalid_input("upload ticket without uuid"));
        }
        self.db
            .write(|state| state.uploads.insert(ticket.uuid.clone(), ticket.clone()))
            .await;
        Ok(())
    }

    async fn find_by_id(&self, uuid: &str) -> CmsResult<UploadTicket> {
        self.db
            .read(|state| state.uploads.get(uuid).cloned())
            .ok_or_else(|| CmsError::not_found(format!("upload {} not found", uuid)))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> CmsResult<usize> {
        let removed = self
            .db
            .write(|state| {
                let before = state.uploads.len();
                state.uploads.retain(|_, t| !t.expired(now));
                before - state.uploads.len()
            })
            .await;
        debug!(removed, "purged expired upload tickets");
        Ok(removed)
    }
}
