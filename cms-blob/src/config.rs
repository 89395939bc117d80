use std::time::Duration;

use cms_core::{root_path, CmsConfigSnapshot};

/// Configuration shared by gateway implementations
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Public base URL assets are served from, without trailing slash.
    pub base_url: String,

    /// Absolute max size allowed for a single upload
    pub max_upload_size: u64,

    /// Lifetime of presigned upload links when the caller gives no expiry
    pub upload_link_ttl: Duration,

    /// Part size for multi-part upload links; `None` issues a single link
    pub part_size: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/assets".to_string(),
            max_upload_size: 10 * 1024 * 1024 * 1024, // 10GB
            upload_link_ttl: Duration::from_secs(15 * 60),
            part_size: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_snapshot(snapshot: &CmsConfigSnapshot) -> Self {
        let d = Self::default();
        Self {
            base_url: snapshot
                .get_string("asset.base_url")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(d.base_url),
            max_upload_size: snapshot.get_u64("asset.max_upload_size").unwrap_or(d.max_upload_size),
            upload_link_ttl: snapshot
                .get_u64("blob.upload_link_ttl_secs")
                .map(Duration::from_secs)
                .unwrap_or(d.upload_link_ttl),
            part_size: snapshot.get_u64("blob.part_size").filter(|n| *n > 0),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_upload_size(mut self, max: u64) -> Self {
        self.max_upload_size = max;
        self
    }

    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = Some(part_size);
        self
    }

    /// Canonical URL of a stored file.
    pub fn asset_url(&self, uuid: &str, file_name: &str) -> String {
        format!("{}/{}", self.base_url, root_path(uuid, file_name))
    }

    /// Inverse of [`GatewayConfig::asset_url`]: `(uuid, file_name)`.
    pub fn parse_asset_url(&self, url: &str) -> Option<(String, String)> {
        let rest = url.strip_prefix(&self.base_url)?.strip_prefix('/')?;
        let mut parts = rest.splitn(3, '/');
        let head = parts.next().filter(|s| !s.is_empty())?;
        let tail = parts.next().filter(|s| !s.is_empty())?;
        let file_name = parts.next().filter(|s| !s.is_empty())?;
        Some((format!("{}{}", head, tail), file_name.to_string()))
    }
}

/// Key prefix every file of an asset lives under.
pub fn asset_prefix(uuid: &str) -> String {
    root_path(uuid, "")
}
