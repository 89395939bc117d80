use cms_blob::UploadFile;
use cms_core::{AssetId, PreviewType, ProjectId};

/// Input of [`crate::AssetInteractor::create`]. Exactly one of `file` and
/// `token` is expected; `file` wins when both are given.
#[derive(Debug)]
pub struct CreateAssetParam {
    pub project: ProjectId,
    pub file: Option<UploadFile>,
    /// Uuid of an upload ticket from [`crate::AssetInteractor::create_upload`]
    pub token: Option<String>,
    pub skip_decompression: bool,
}

impl CreateAssetParam {
    pub fn inline(project: ProjectId, file: UploadFile) -> Self {
        Self {
            project,
            file: Some(file),
            token: None,
            skip_decompression: false,
        }
    }

    pub fn from_token(project: ProjectId, token: impl Into<String>) -> Self {
        Self {
            project,
            file: None,
            token: Some(token.into()),
            skip_decompression: false,
        }
    }

    pub fn skip_decompression(mut self, skip: bool) -> Self {
        self.skip_decompression = skip;
        self
    }
}

#[derive(Debug, Clone)]
pub struct UpdateAssetParam {
    pub id: AssetId,
    pub preview_type: Option<PreviewType>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateUploadParam {
    pub project: ProjectId,
    pub file_name: String,
    pub content_type: String,
    pub content_encoding: String,
    pub content_length: u64,
    /// Wrapped cursor from a previous call; empty starts a new upload.
    pub cursor: String,
}

/// Where and how the client should send the next part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInfo {
    pub uuid: String,
    pub url: String,
    pub content_type: String,
    pub content_encoding: String,
    pub content_length: u64,
    /// Wrapped cursor for the next part; empty after the last one.
    pub next: String,
}
