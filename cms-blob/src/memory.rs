//! In-process gateway for development and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use cms_core::{root_path, Asset, File, UploadTicket};
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};

use crate::config::asset_prefix;
use crate::content_type::resolve_content_type;
use crate::gateway::new_blob_uuid;
use crate::{
    AccessInfo, BlobError, BlobGateway, BlobResult, ByteRange, FileEntry, GatewayCapabilities, GatewayConfig,
    ReadHeaders, ReadResponse, ReadStatus, ResponseHeaders, UploadFile, UploadLink, UploadLinkParams,
};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    content_encoding: String,
    etag: String,
    public: bool,
    last_modified: DateTime<Utc>,
    seq: u64,
}

/// A delete request observed by [`MemoryGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteCall {
    Asset { uuid: String, file_name: String },
    Assets(Vec<String>),
    Url(String),
}

/// Object store kept in a process-local map.
#[derive(Clone)]
pub struct MemoryGateway {
    config: GatewayConfig,
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    deletes: Arc<Mutex<Vec<DeleteCall>>>,
    seq: Arc<AtomicU64>,
    upload_links: bool,
    fail_deletes: Arc<AtomicBool>,
}

impl MemoryGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            objects: Arc::new(RwLock::new(HashMap::new())),
            deletes: Arc::new(Mutex::new(Vec::new())),
            seq: Arc::new(AtomicU64::new(0)),
            upload_links: true,
            fail_deletes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Behave like a local store that cannot presign links.
    pub fn without_upload_links(mut self) -> Self {
        self.upload_links = false;
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Store an object directly, as a client following an upload link would.
    pub fn put_object(&self, uuid: &str, file_name: &str, data: impl Into<Bytes>, content_type: &str) {
        self.insert(root_path(uuid, file_name), data.into(), content_type.to_string(), String::new());
    }

    /// Store extracted archive entries below an asset's prefix.
    pub fn seed_extracted(&self, uuid: &str, entries: &[FileEntry]) {
        for entry in entries {
            let data = Bytes::from(vec![0u8; entry.size as usize]);
            let content_type = resolve_content_type(Some(&entry.content_type), &entry.name);
            self.insert(root_path(uuid, &entry.name), data, content_type, String::new());
        }
    }

    /// Make every subsequent delete fail with a backend error.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn delete_calls(&self) -> Vec<DeleteCall> {
        self.deletes.lock().clone()
    }

    pub fn contains(&self, uuid: &str, file_name: &str) -> bool {
        self.objects.read().contains_key(&root_path(uuid, file_name))
    }

    pub fn is_public(&self, uuid: &str, file_name: &str) -> bool {
        self.objects
            .read()
            .get(&root_path(uuid, file_name))
            .is_some_and(|o| o.public)
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    fn insert(&self, key: String, data: Bytes, content_type: String, content_encoding: String) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let object = StoredObject {
            etag: format!("\"{}\"", uuid::Uuid::new_v4().simple()),
            data,
            content_type,
            content_encoding,
            public: false,
            last_modified: Utc::now(),
            seq,
        };
        self.objects.write().insert(key, object);
    }

    fn check_deletes(&self) -> BlobResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobError::backend(std::io::Error::new(
                std::io::ErrorKind::Other,
                "delete rejected by store",
            )));
        }
        Ok(())
    }

    fn set_public(&self, uuid: &str, file_name: &str, public: bool) -> BlobResult<()> {
        let key = root_path(uuid, file_name);
        let mut objects = self.objects.write();
        let object = objects.get_mut(&key).ok_or_else(|| BlobError::not_found(key.clone()))?;
        object.public = public;
        Ok(())
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

#[async_trait]
impl BlobGateway for MemoryGateway {
    async fn upload_asset(&self, file: UploadFile) -> BlobResult<(String, u64)> {
        let name = file.name.rsplit('/').next().unwrap_or_default().trim().to_string();
        if name.is_empty() {
            return Err(BlobError::invalid_file("file name is empty"));
        }
        let max = self.config.max_upload_size;
        if let Some(size) = file.size.filter(|s| *s > max) {
            return Err(BlobError::TooLarge { size, max });
        }

        let mut content = file.content;
        let mut buf = BytesMut::new();
        while let Some(chunk) = content.next().await {
            let chunk = chunk?;
            let size = (buf.len() + chunk.len()) as u64;
            if size > max {
                return Err(BlobError::TooLarge { size, max });
            }
            buf.extend_from_slice(&chunk);
        }
        if buf.is_empty() {
            return Err(BlobError::invalid_file(format!("{} is empty", name)));
        }

        let uuid = new_blob_uuid();
        let size = buf.len() as u64;
        let content_type = resolve_content_type(file.content_type.as_deref(), &name);
        self.insert(
            root_path(&uuid, &name),
            buf.freeze(),
            content_type,
            file.content_encoding.unwrap_or_default(),
        );
        Ok((uuid, size))
    }

    async fn issue_upload_link(&self, params: UploadLinkParams) -> BlobResult<UploadLink> {
        if !self.upload_links {
            return Err(BlobError::unsupported("issue_upload_link"));
        }
        if params.file_name.trim().is_empty() {
            return Err(BlobError::invalid_file("file name is empty"));
        }
        let max = self.config.max_upload_size;
        if params.content_length > max {
            return Err(BlobError::TooLarge {
                size: params.content_length,
                max,
            });
        }

        let uuid = if params.uuid.is_empty() {
            new_blob_uuid()
        } else {
            params.uuid
        };
        let part = if params.cursor.is_empty() {
            1
        } else {
            params
                .cursor
                .parse::<u64>()
                .map_err(|_| BlobError::invalid(format!("invalid upload cursor {:?}", params.cursor)))?
        };

        let (content_length, next) = match self.config.part_size {
            Some(part_size) if params.content_length > part_size => {
                let parts = params.content_length.div_ceil(part_size);
                if part == 0 || part > parts {
                    return Err(BlobError::invalid(format!("upload cursor {} out of range", part)));
                }
                let start = (part - 1) * part_size;
                let length = part_size.min(params.content_length - start);
                let next = if part < parts { (part + 1).to_string() } else { String::new() };
                (length, next)
            }
            _ if part != 1 => {
                return Err(BlobError::invalid(format!("upload cursor {} out of range", part)));
            }
            _ => (params.content_length, String::new()),
        };

        let expires_at = params
            .expires_at
            .unwrap_or_else(|| Utc::now() + self.config.upload_link_ttl);
        let content_type = resolve_content_type(Some(&params.content_type), &params.file_name);
        let url = format!(
            "{}/{}?part={}&expires={}",
            self.config.base_url,
            root_path(&uuid, &params.file_name),
            part,
            expires_at.timestamp()
        );

        Ok(UploadLink {
            uuid,
            url,
            content_type,
            content_encoding: params.content_encoding,
            content_length,
            next,
        })
    }

    async fn uploaded_asset(&self, ticket: &UploadTicket) -> BlobResult<File> {
        let key = root_path(&ticket.uuid, &ticket.file_name);
        let objects = self.objects.read();
        let object = objects.get(&key).ok_or_else(|| BlobError::not_found(key.clone()))?;

        let content_type = if ticket.content_type.is_empty() {
            object.content_type.clone()
        } else {
            ticket.content_type.clone()
        };
        Ok(File::new(ticket.file_name.clone(), ticket.file_name.clone(), object.data.len() as u64)
            .with_content_type(content_type)
            .with_content_encoding(ticket.content_encoding.clone()))
    }

    async fn read_asset(&self, uuid: &str, file_name: &str, headers: &ReadHeaders) -> BlobResult<ReadResponse> {
        let key = root_path(uuid, file_name);
        let object = self
            .objects
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| BlobError::not_found(key.clone()))?;

        let total = object.data.len() as u64;
        let mut response = ResponseHeaders {
            status: ReadStatus::Ok,
            content_type: object.content_type,
            content_encoding: object.content_encoding,
            content_length: total,
            content_range: None,
            etag: Some(object.etag.clone()),
            last_modified: Some(object.last_modified),
        };

        if headers.if_none_match.as_deref() == Some(object.etag.as_str()) {
            response.status = ReadStatus::NotModified;
            response.content_length = 0;
            return Ok(ReadResponse {
                body: crate::stream_from_bytes(Bytes::new()),
                headers: response,
            });
        }

        let body = match headers.range.as_deref() {
            Some(range) => {
                let resolved = ByteRange::parse_header(range, total)?.resolve(total);
                response.status = ReadStatus::PartialContent;
                response.content_length = resolved.end - resolved.start + 1;
                response.content_range = Some(resolved.content_range());
                object.data.slice(resolved.start as usize..=resolved.end as usize)
            }
            None => object.data,
        };

        Ok(ReadResponse {
            body: crate::stream_from_bytes(body),
            headers: response,
        })
    }

    async fn get_asset_files(&self, uuid: &str) -> BlobResult<Vec<FileEntry>> {
        let prefix = asset_prefix(uuid);
        let objects = self.objects.read();
        let mut found: Vec<(&String, &StoredObject)> =
            objects.iter().filter(|(key, _)| key.starts_with(&prefix)).collect();
        found.sort_by_key(|(_, o)| o.seq);

        Ok(found
            .into_iter()
            .map(|(key, o)| FileEntry {
                name: key[prefix.len()..].to_string(),
                size: o.data.len() as u64,
                content_type: o.content_type.clone(),
            })
            .collect())
    }

    async fn delete_asset(&self, uuid: &str, file_name: &str) -> BlobResult<()> {
        self.deletes.lock().push(DeleteCall::Asset {
            uuid: uuid.to_string(),
            file_name: file_name.to_string(),
        });
        self.check_deletes()?;
        self.objects.write().remove(&root_path(uuid, file_name));
        Ok(())
    }

    async fn delete_assets(&self, uuids: &[String]) -> BlobResult<()> {
        self.deletes.lock().push(DeleteCall::Assets(uuids.to_vec()));
        self.check_deletes()?;
        let prefixes: Vec<String> = uuids.iter().map(|u| asset_prefix(u)).collect();
        self.objects
            .write()
            .retain(|key, _| !prefixes.iter().any(|p| key.starts_with(p)));
        Ok(())
    }

    async fn publish_asset(&self, uuid: &str, file_name: &str) -> BlobResult<()> {
        self.set_public(uuid, file_name, true)
    }

    async fn unpublish_asset(&self, uuid: &str, file_name: &str) -> BlobResult<()> {
        self.set_public(uuid, file_name, false)
    }

    fn access_info(&self, asset: &Asset) -> AccessInfo {
        AccessInfo {
            url: self.config.asset_url(asset.uuid(), asset.file_name()),
            public: asset.public(),
        }
    }

    async fn remove_asset(&self, url: &str) -> BlobResult<()> {
        let (uuid, file_name) = self
            .config
            .parse_asset_url(url)
            .ok_or_else(|| BlobError::invalid(format!("not an asset url: {}", url)))?;
        self.deletes.lock().push(DeleteCall::Url(url.to_string()));
        self.check_deletes()?;
        self.objects.write().remove(&root_path(&uuid, &file_name));
        Ok(())
    }

    fn capabilities(&self) -> GatewayCapabilities {
        let caps = GatewayCapabilities::basic().with_range().with_acl();
        if self.upload_links {
            caps.with_upload_links()
        } else {
            caps
        }
    }
}
