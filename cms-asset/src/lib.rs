//! # cms-asset
//!
//! Asset lifecycle orchestration. [`AssetInteractor`] ties the blob gateway,
//! the repositories, the task queue and the event bus together:
//!
//! - inline and ticket-based creation, with storage quota enforcement
//! - resumable upload links
//! - archive extraction status tracking and flat file indexing
//! - publish, unpublish, single and batch deletion
//!
//! Writes run in one transaction per operation and retry on conflict.
//! Events are persisted inside that transaction and fanned out to webhooks
//! only after it commits.

mod extract;
mod interactor;
mod params;
#[cfg(feature = "tracing-basic")]
pub mod telemetry;
mod tx;

pub use extract::{ArchiveExtractor, DecompressHandler};
pub use interactor::{AssetInteractor, Gateways, Repos};
pub use params::{CreateAssetParam, CreateUploadParam, UpdateAssetParam, UploadInfo};
pub use tx::with_tx_retry;
