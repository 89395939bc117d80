//! S3-compatible gateway built on the AWS SDK.

use std::env;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::types::{Delete, ObjectCannedAcl, ObjectIdentifier};
use aws_sdk_s3::Client;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use cms_core::{root_path, Asset, File, UploadTicket};
use futures_util::StreamExt;
use tracing::{debug, instrument};

use crate::config::asset_prefix;
use crate::content_type::resolve_content_type;
use crate::gateway::new_blob_uuid;
use crate::{
    AccessInfo, BlobError, BlobGateway, BlobResult, ByteRange, FileEntry, GatewayCapabilities, GatewayConfig,
    ReadHeaders, ReadResponse, ReadStatus, ResponseHeaders, UploadFile, UploadLink, UploadLinkParams,
};

/// Batch limit of the DeleteObjects call.
const DELETE_BATCH: usize = 1000;

/// Connection settings read from `CMS_S3_*` environment variables.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl S3Config {
    pub fn from_env() -> BlobResult<Self> {
        fn get_env(key: &str) -> BlobResult<String> {
            env::var(key).map_err(|_| BlobError::invalid(format!("{} environment variable required", key)))
        }

        Ok(Self {
            bucket: get_env("CMS_S3_BUCKET")?,
            region: get_env("CMS_S3_REGION")?,
            endpoint_url: get_env("CMS_S3_ENDPOINT_URL")?,
            access_key_id: get_env("CMS_S3_ACCESS_KEY_ID")?,
            secret_access_key: get_env("CMS_S3_SECRET_ACCESS_KEY")?,
        })
    }
}

/// Gateway for any S3-compatible object store.
#[derive(Clone)]
pub struct S3Gateway {
    client: Client,
    bucket: String,
    config: GatewayConfig,
}

impl S3Gateway {
    pub async fn new(config: GatewayConfig, s3: S3Config) -> Self {
        let bucket = s3.bucket.clone();
        let client = Self::create_client(s3).await;
        Self { client, bucket, config }
    }

    pub async fn from_env(config: GatewayConfig) -> BlobResult<Self> {
        Ok(Self::new(config, S3Config::from_env()?).await)
    }

    async fn create_client(s3: S3Config) -> Client {
        let credentials = Credentials::new(s3.access_key_id, s3.secret_access_key, None, None, "cms");

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(s3.region))
            .credentials_provider(credentials)
            .endpoint_url(s3.endpoint_url)
            .load()
            .await;

        Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(true)
                .build(),
        )
    }

    fn map_aws_error(err: impl std::error::Error + Send + Sync + 'static) -> BlobError {
        BlobError::backend(err)
    }

    fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
    }

    async fn head(&self, key: &str) -> BlobResult<aws_sdk_s3::operation::head_object::HeadObjectOutput> {
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_not_found() => BlobError::not_found(key),
                _ => Self::map_aws_error(e),
            })
    }

    async fn list_keys(&self, prefix: &str) -> BlobResult<Vec<aws_sdk_s3::types::Object>> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let result = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(Self::map_aws_error)?;

            objects.extend(result.contents.unwrap_or_default());
            match result.next_continuation_token {
                Some(next) if result.is_truncated.unwrap_or(false) => token = Some(next),
                _ => break,
            }
        }
        Ok(objects)
    }

    async fn delete_keys(&self, keys: Vec<String>) -> BlobResult<()> {
        for chunk in keys.chunks(DELETE_BATCH) {
            let objects = chunk
                .iter()
                .map(|k| ObjectIdentifier::builder().key(k).build().map_err(Self::map_aws_error))
                .collect::<BlobResult<Vec<_>>>()?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(Self::map_aws_error)?;
            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(Self::map_aws_error)?;
        }
        Ok(())
    }

    async fn set_acl(&self, uuid: &str, file_name: &str, acl: ObjectCannedAcl) -> BlobResult<()> {
        let key = root_path(uuid, file_name);
        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(&key)
            .acl(acl)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_no_such_key() => BlobError::not_found(key.clone()),
                _ => Self::map_aws_error(e),
            })?;
        Ok(())
    }
}

#[async_trait]
impl BlobGateway for S3Gateway {
    #[instrument(skip(self, file), fields(file_name = %file.name))]
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
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(root_path(&uuid, &name))
            .content_type(resolve_content_type(file.content_type.as_deref(), &name))
            .body(AwsByteStream::from(buf.freeze()));
        if let Some(encoding) = file.content_encoding.filter(|e| !e.is_empty()) {
            request = request.content_encoding(encoding);
        }
        request.send().await.map_err(Self::map_aws_error)?;

        debug!(uuid = %uuid, size, "uploaded asset blob");
        Ok((uuid, size))
    }

    async fn issue_upload_link(&self, params: UploadLinkParams) -> BlobResult<UploadLink> {
        if params.file_name.trim().is_empty() {
            return Err(BlobError::invalid_file("file name is empty"));
        }
        if !params.cursor.is_empty() {
            return Err(BlobError::invalid(format!("invalid upload cursor {:?}", params.cursor)));
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
        let ttl = match params.expires_at {
            Some(at) => (at - Utc::now()).to_std().unwrap_or_default(),
            None => self.config.upload_link_ttl,
        };
        let presigning = PresigningConfig::expires_in(ttl).map_err(Self::map_aws_error)?;
        let content_type = resolve_content_type(Some(&params.content_type), &params.file_name);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(root_path(&uuid, &params.file_name))
            .content_type(&content_type);
        if params.content_length > 0 {
            request = request.content_length(params.content_length as i64);
        }
        if !params.content_encoding.is_empty() {
            request = request.content_encoding(&params.content_encoding);
        }
        let presigned = request.presigned(presigning).await.map_err(Self::map_aws_error)?;

        Ok(UploadLink {
            uuid,
            url: presigned.uri().to_string(),
            content_type,
            content_encoding: params.content_encoding,
            content_length: params.content_length,
            next: String::new(),
        })
    }

    async fn uploaded_asset(&self, ticket: &UploadTicket) -> BlobResult<File> {
        let head = self.head(&root_path(&ticket.uuid, &ticket.file_name)).await?;
        let content_type = if ticket.content_type.is_empty() {
            head.content_type.clone().unwrap_or_default()
        } else {
            ticket.content_type.clone()
        };
        let size = head.content_length.unwrap_or(0).max(0) as u64;
        Ok(File::new(ticket.file_name.clone(), ticket.file_name.clone(), size)
            .with_content_type(content_type)
            .with_content_encoding(ticket.content_encoding.clone()))
    }

    async fn read_asset(&self, uuid: &str, file_name: &str, headers: &ReadHeaders) -> BlobResult<ReadResponse> {
        let key = root_path(uuid, file_name);
        let head = self.head(&key).await?;
        let total = head.content_length.unwrap_or(0).max(0) as u64;

        let mut response = ResponseHeaders {
            status: ReadStatus::Ok,
            content_type: head.content_type.clone().unwrap_or_default(),
            content_encoding: head.content_encoding.clone().unwrap_or_default(),
            content_length: total,
            content_range: None,
            etag: head.e_tag.clone(),
            last_modified: head.last_modified.as_ref().and_then(Self::to_chrono),
        };

        if headers.if_none_match.is_some() && headers.if_none_match == head.e_tag {
            response.status = ReadStatus::NotModified;
            response.content_length = 0;
            return Ok(ReadResponse {
                body: crate::stream_from_bytes(bytes::Bytes::new()),
                headers: response,
            });
        }

        let mut request = self.client.get_object().bucket(&self.bucket).key(&key);
        if let Some(range) = headers.range.as_deref() {
            let resolved = ByteRange::parse_header(range, total)?.resolve(total);
            request = request.range(format!("bytes={}-{}", resolved.start, resolved.end));
            response.status = ReadStatus::PartialContent;
            response.content_length = resolved.end - resolved.start + 1;
            response.content_range = Some(resolved.content_range());
        }

        let result = request.send().await.map_err(|e| match e.as_service_error() {
            Some(se) if se.is_no_such_key() => BlobError::not_found(key.clone()),
            _ => Self::map_aws_error(e),
        })?;
        let body = result.body.collect().await.map_err(Self::map_aws_error)?;

        Ok(ReadResponse {
            body: crate::stream_from_bytes(body.into_bytes()),
            headers: response,
        })
    }

    async fn get_asset_files(&self, uuid: &str) -> BlobResult<Vec<FileEntry>> {
        let prefix = asset_prefix(uuid);
        let objects = self.list_keys(&prefix).await?;
        Ok(objects
            .into_iter()
            .filter_map(|o| {
                let key = o.key?;
                let name = key.strip_prefix(&prefix)?.to_string();
                let size = o.size.unwrap_or(0).max(0) as u64;
                Some(FileEntry {
                    content_type: resolve_content_type(None, &name),
                    name,
                    size,
                })
            })
            .collect())
    }

    async fn delete_asset(&self, uuid: &str, file_name: &str) -> BlobResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(root_path(uuid, file_name))
            .send()
            .await
            .map_err(Self::map_aws_error)?;
        Ok(())
    }

    #[instrument(skip(self, uuids), fields(count = uuids.len()))]
    async fn delete_assets(&self, uuids: &[String]) -> BlobResult<()> {
        let mut keys = Vec::new();
        for uuid in uuids {
            keys.extend(self.list_keys(&asset_prefix(uuid)).await?.into_iter().filter_map(|o| o.key));
        }
        debug!(keys = keys.len(), "deleting asset objects");
        self.delete_keys(keys).await
    }

    async fn publish_asset(&self, uuid: &str, file_name: &str) -> BlobResult<()> {
        self.set_acl(uuid, file_name, ObjectCannedAcl::PublicRead).await
    }

    async fn unpublish_asset(&self, uuid: &str, file_name: &str) -> BlobResult<()> {
        self.set_acl(uuid, file_name, ObjectCannedAcl::Private).await
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
        self.delete_asset(&uuid, &file_name).await
    }

    fn capabilities(&self) -> GatewayCapabilities {
        GatewayCapabilities::basic().with_range().with_acl().with_upload_links()
    }
}
