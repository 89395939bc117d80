//! # cms-blob
//!
//! Object-store gateway for asset blobs.
//!
//! Every file of an asset lives under `uuid[0:2]/uuid[2:]/`. The gateway
//! streams uploads in, issues presigned links for resumable uploads, serves
//! range and conditional reads, lists extracted archive entries and flips
//! per-object ACLs on publish.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryGateway`] keeps objects in process memory
//! - [`S3Gateway`] talks to any S3-compatible store through the AWS SDK

mod config;
mod content_type;
mod error;
mod gateway;
mod memory;
mod s3;
mod types;

pub use config::{asset_prefix, GatewayConfig};
pub use content_type::{guess_content_type, resolve_content_type, DEFAULT_CONTENT_TYPE};
pub use error::{BlobError, BlobResult};
pub use gateway::{new_blob_uuid, BlobGateway};
pub use memory::{DeleteCall, MemoryGateway};
pub use s3::{S3Config, S3Gateway};
pub use types::{
    stream_from_bytes, AccessInfo, ByteRange, ByteStream, FileEntry, GatewayCapabilities, ReadHeaders, ReadResponse,
    ReadStatus, ResolvedRange, ResponseHeaders, UploadFile, UploadLink, UploadLinkParams,
};
