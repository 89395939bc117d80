use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::{BlobError, BlobResult};

/// Stream of bytes for upload/download
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Wrap an in-memory buffer as a single-chunk stream.
pub fn stream_from_bytes(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(futures_util::stream::once(async move { Ok(data) }))
}

/// A file handed to [`crate::BlobGateway::upload_asset`].
pub struct UploadFile {
    pub name: String,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    /// Declared size, if the caller knows it up front.
    pub size: Option<u64>,
    pub content: ByteStream,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content: ByteStream) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            content_encoding: None,
            size: None,
            content,
        }
    }

    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        Self::new(name, stream_from_bytes(data)).with_size(size)
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_content_encoding(mut self, content_encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(content_encoding.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("content_encoding", &self.content_encoding)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Parameters for a presigned upload link.
#[derive(Debug, Clone, Default)]
pub struct UploadLinkParams {
    /// Generated by the gateway when empty.
    pub uuid: String,
    pub file_name: String,
    pub content_type: String,
    pub content_encoding: String,
    pub content_length: u64,
    pub expires_at: Option<DateTime<Utc>>,
    /// Part cursor from a previous link; empty for the first part.
    pub cursor: String,
}

/// Presigned upload link. `next` is empty when this is the last part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLink {
    pub uuid: String,
    pub url: String,
    pub content_type: String,
    pub content_encoding: String,
    pub content_length: u64,
    pub next: String,
}

/// Entry discovered below an asset's key prefix after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Path relative to the asset root, without leading slash.
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub content_type: String,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            content_type: String::new(),
        }
    }
}

/// Canonical URL and visibility of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessInfo {
    pub url: String,
    pub public: bool,
}

/// Byte range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>, // None means "to end of file"
}

impl ByteRange {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Parse a single `bytes=a-b`, `bytes=a-` or `bytes=-n` header against a
    /// known object size.
    pub fn parse_header(header: &str, total_size: u64) -> BlobResult<Self> {
        let spec = header
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(|| BlobError::invalid(format!("unsupported range unit: {}", header)))?;
        if spec.contains(',') {
            return Err(BlobError::invalid("multiple ranges are not supported"));
        }
        let (start, end) = spec
            .split_once('-')
            .ok_or_else(|| BlobError::invalid(format!("malformed range: {}", header)))?;
        let parse = |s: &str| {
            s.trim()
                .parse::<u64>()
                .map_err(|_| BlobError::invalid(format!("malformed range: {}", header)))
        };

        let range = match (start.trim().is_empty(), end.trim().is_empty()) {
            (true, true) => return Err(BlobError::invalid(format!("malformed range: {}", header))),
            (true, false) => {
                let suffix = parse(end)?.min(total_size);
                ByteRange::new(total_size.saturating_sub(suffix), total_size.checked_sub(1))
            }
            (false, true) => ByteRange::new(parse(start)?, None),
            (false, false) => {
                let end = parse(end)?.min(total_size.saturating_sub(1));
                ByteRange::new(parse(start)?, Some(end))
            }
        };
        if !range.is_valid(total_size) {
            return Err(BlobError::invalid(format!("range not satisfiable: {}", header)));
        }
        Ok(range)
    }

    pub fn length(&self, total_size: u64) -> u64 {
        match self.end {
            Some(end) => end.saturating_sub(self.start) + 1,
            None => total_size.saturating_sub(self.start),
        }
    }

    pub fn is_valid(&self, total_size: u64) -> bool {
        if self.start >= total_size {
            return false;
        }
        match self.end {
            Some(end) => end >= self.start && end < total_size,
            None => true,
        }
    }

    pub fn resolve(&self, total_size: u64) -> ResolvedRange {
        ResolvedRange {
            start: self.start,
            end: self.end.unwrap_or(total_size.saturating_sub(1)),
            total_size,
        }
    }
}

/// Range information for partial content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
    pub total_size: u64,
}

impl ResolvedRange {
    /// `Content-Range` header value.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total_size)
    }
}

/// Request headers relevant to a read.
#[derive(Debug, Clone, Default)]
pub struct ReadHeaders {
    pub range: Option<String>,
    pub if_none_match: Option<String>,
}

impl ReadHeaders {
    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    pub fn with_if_none_match(mut self, etag: impl Into<String>) -> Self {
        self.if_none_match = Some(etag.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Ok,
    PartialContent,
    NotModified,
}

impl ReadStatus {
    pub fn code(&self) -> u16 {
        match self {
            ReadStatus::Ok => 200,
            ReadStatus::PartialContent => 206,
            ReadStatus::NotModified => 304,
        }
    }
}

/// Headers describing a read response.
#[derive(Debug, Clone)]
pub struct ResponseHeaders {
    pub status: ReadStatus,
    pub content_type: String,
    pub content_encoding: String,
    pub content_length: u64,
    pub content_range: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Body plus headers returned by [`crate::BlobGateway::read_asset`].
pub struct ReadResponse {
    pub body: ByteStream,
    pub headers: ResponseHeaders,
}

impl fmt::Debug for ReadResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadResponse")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// What a gateway can do beyond the basics.
#[derive(Debug, Clone, Default)]
pub struct GatewayCapabilities {
    pub supports_upload_links: bool,
    pub supports_range: bool,
    pub supports_acl: bool,
}

impl GatewayCapabilities {
    pub fn basic() -> Self {
        Self::default()
    }

    pub fn with_upload_links(mut self) -> Self {
        self.supports_upload_links = true;
        self
    }

    pub fn with_range(mut self) -> Self {
        self.supports_range = true;
        self
    }

    pub fn with_acl(mut self) -> Self {
        self.supports_acl = true;
        self
    }
}
