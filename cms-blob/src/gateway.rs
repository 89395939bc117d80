use async_trait::async_trait;
use cms_core::{Asset, File, UploadTicket};

use crate::{
    AccessInfo, BlobResult, FileEntry, GatewayCapabilities, ReadHeaders, ReadResponse, UploadFile, UploadLink,
    UploadLinkParams,
};

/// Wire-level contract to the object store holding asset blobs.
///
/// Every method is a suspension point; dropping the returned future cancels
/// the call. Blob keys follow `uuid[0:2]/uuid[2:]/path`.
#[async_trait]
pub trait BlobGateway: Send + Sync {
    /// Stream a file in under a freshly generated uuid; returns `(uuid, size)`.
    async fn upload_asset(&self, file: UploadFile) -> BlobResult<(String, u64)>;

    /// Issue a presigned upload link for resumable flows.
    async fn issue_upload_link(&self, params: UploadLinkParams) -> BlobResult<UploadLink>;

    /// Resolve the object a ticket-based upload left behind.
    async fn uploaded_asset(&self, ticket: &UploadTicket) -> BlobResult<File>;

    /// Read a file, honouring range and conditional headers.
    async fn read_asset(&self, uuid: &str, file_name: &str, headers: &ReadHeaders) -> BlobResult<ReadResponse>;

    /// List every entry stored below an asset's prefix.
    async fn get_asset_files(&self, uuid: &str) -> BlobResult<Vec<FileEntry>>;

    /// Delete one file. Missing objects are not an error.
    async fn delete_asset(&self, uuid: &str, file_name: &str) -> BlobResult<()>;

    /// Delete every object of each asset. Missing objects are not an error.
    async fn delete_assets(&self, uuids: &[String]) -> BlobResult<()>;

    async fn publish_asset(&self, uuid: &str, file_name: &str) -> BlobResult<()>;

    async fn unpublish_asset(&self, uuid: &str, file_name: &str) -> BlobResult<()>;

    /// Canonical URL and visibility, derived at read time.
    fn access_info(&self, asset: &Asset) -> AccessInfo;

    /// Delete the blob a canonical URL points at.
    async fn remove_asset(&self, url: &str) -> BlobResult<()>;

    fn capabilities(&self) -> GatewayCapabilities;
}

/// New blob uuid.
pub fn new_blob_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
