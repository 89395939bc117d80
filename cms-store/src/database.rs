//! Shared in-memory state and its transaction boundary.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cms_core::{
    Asset, AssetId, CmsError, CmsResult, Event, EventId, File, UploadTicket, Webhook, WebhookId,
};
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Every collection the repositories keep.
#[derive(Debug, Clone, Default)]
pub(crate) struct State {
    pub assets: HashMap<AssetId, Asset>,
    /// Top-level file per asset; flat trees keep their entries in `flat_pages`.
    pub files: HashMap<AssetId, File>,
    pub flat_pages: BTreeMap<(AssetId, usize), Vec<File>>,
    pub uploads: HashMap<String, UploadTicket>,
    pub events: Vec<Event>,
    pub event_index: HashMap<EventId, usize>,
    pub webhooks: HashMap<WebhookId, Webhook>,
}

/// Work a transaction runs, boxed so stores can wrap it.
pub type TxWork<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Opens transactions over a store.
#[async_trait]
pub trait Transactor: Send + Sync {
    async fn begin(&self) -> CmsResult<Box<dyn Transaction>>;
}

/// An open unit of work. Dropping it without committing discards its writes.
#[async_trait]
pub trait Transaction: Send {
    /// Run `work` as part of this transaction. Repository calls made outside
    /// of it are not.
    fn scope<'a>(&self, work: TxWork<'a>) -> TxWork<'a> {
        work
    }

    async fn commit(self: Box<Self>) -> CmsResult<()>;

    async fn rollback(self: Box<Self>) -> CmsResult<()>;
}

tokio::task_local! {
    /// Key of the database whose transaction the current task runs in.
    static ACTIVE_TX: usize;
}

/// Process-local database shared by the memory repositories.
///
/// One transaction is open at a time. While it is, writes from other tasks
/// wait for it to finish and reads from other tasks see the last committed
/// state.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<RwLock<State>>,
    committed: Arc<RwLock<Option<State>>>,
    writer: Arc<Mutex<()>>,
    conflicts: Arc<AtomicUsize>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with a serialisation conflict.
    pub fn fail_next_commits(&self, n: usize) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    fn take_conflict(&self) -> bool {
        self.conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.writer) as usize
    }

    fn in_transaction(&self) -> bool {
        ACTIVE_TX.try_with(|key| *key == self.key()).unwrap_or(false)
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        let committed = self.committed.read();
        match committed.as_ref() {
            Some(snapshot) if !self.in_transaction() => f(snapshot),
            _ => f(&self.state.read()),
        }
    }

    pub(crate) async fn write<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut State) -> R + Send,
    {
        if self.in_transaction() {
            return f(&mut self.state.write());
        }
        let _writer = self.writer.lock().await;
        f(&mut self.state.write())
    }
}

#[async_trait]
impl Transactor for MemoryDatabase {
    async fn begin(&self) -> CmsResult<Box<dyn Transaction>> {
        let guard = self.writer.clone().lock_owned().await;
        {
            let mut committed = self.committed.write();
            *committed = Some(self.state.read().clone());
        }
        Ok(Box::new(MemoryTransaction {
            db: self.clone(),
            open: true,
            _guard: guard,
        }))
    }
}

/// Snapshot-and-restore transaction holding the database's writer lock.
pub struct MemoryTransaction {
    db: MemoryDatabase,
    open: bool,
    _guard: OwnedMutexGuard<()>,
}

impl MemoryTransaction {
    fn close(&mut self, keep: bool) {
        if !self.open {
            return;
        }
        self.open = false;
        let mut committed = self.db.committed.write();
        if let Some(snapshot) = committed.take() {
            if !keep {
                *self.db.state.write() = snapshot;
            }
        }
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn scope<'a>(&self, work: TxWork<'a>) -> TxWork<'a> {
        Box::pin(ACTIVE_TX.scope(self.db.key(), work))
    }

    async fn commit(mut self: Box<Self>) -> CmsResult<()> {
        if self.db.take_conflict() {
            self.close(false);
            return Err(CmsError::conflict("could not serialize access due to concurrent update"));
        }
        self.close(true);
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> CmsResult<()> {
        self.close(false);
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.close(false);
    }
}

/// Transactor for stores without transactions; commit and rollback do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransactor;

struct NoopTransaction;

#[async_trait]
impl Transactor for NoopTransactor {
    async fn begin(&self) -> CmsResult<Box<dyn Transaction>> {
        Ok(Box::new(NoopTransaction))
    }
}

#[async_trait]
impl Transaction for NoopTransaction {
    async fn commit(self: Box<Self>) -> CmsResult<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> CmsResult<()> {
        Ok(())
    }
}
