//! # cms-store
//!
//! Persistence for the asset engine. Every collection is reached through a
//! repository trait; the `Memory*` implementations share one
//! [`MemoryDatabase`] so that a [`Transactor`] can commit or roll back writes
//! across all of them at once.

mod asset;
mod collab;
mod database;
mod event;
mod file;
mod search;
mod upload;

pub use asset::{AssetRepository, BatchDeleteOutcome, MemoryAssetRepository};
pub use collab::{MemoryPolicies, MemoryProjects, MemoryThreads, PolicySource, ProjectResolver, ThreadGateway};
pub use database::{MemoryDatabase, MemoryTransaction, NoopTransactor, Transaction, Transactor, TxWork};
pub use event::{EventRepository, MemoryEventRepository, MemoryWebhookRepository, WebhookRepository};
pub use file::{FileRepository, MemoryFileRepository, DEFAULT_FLAT_PAGE_SIZE};
pub use search::{decode_cursor, encode_cursor, AssetSearch, Page, Pagination, SortDirection, SortKey, DEFAULT_PAGE_SIZE};
pub use upload::{MemoryUploadRepository, UploadRepository};
