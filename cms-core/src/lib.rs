//! cms-core: identifiers, access filters, errors and the asset data model.

pub mod access;
pub mod asset;
pub mod config;
pub mod errors;
pub mod event;
pub mod file;
pub mod id;
pub mod operator;
pub mod upload;

pub use access::{AccessFilter, ProjectFilter, WorkspaceFilter};
pub use asset::{extension, is_extractable, ArchiveExtractionStatus, Asset, AssetBuilder, AssetDocument, PreviewType};
pub use config::{AssetSettings, CmsConfig, CmsConfigSnapshot, WebhookSettings};
pub use errors::{CmsError, CmsResult, ErrorKind};
pub use event::{Event, EventObject, EventType, Webhook};
pub use file::{root_path, File, FileChildren};
pub use id::{
    AssetId, EventId, Id, IdKind, IdList, IntegrationId, ProjectId, ThreadId, UserId, WebhookId, WorkspaceId,
};
pub use operator::{Actor, Operator};
pub use upload::{split_cursor, wrap_cursor, UploadTicket};
