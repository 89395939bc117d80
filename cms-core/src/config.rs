//! # Configuration
//!
//! Configuration is a flat string key/value store. Applications layer it
//! however they like; the asset engine only reads typed snapshots.
//!
//! ```rust
//! use cms_core::CmsConfig;
//! let mut config = CmsConfig::new();
//! config.set("asset.flat_page_size", "500");
//! assert_eq!(config.get("asset.flat_page_size"), Some("500"));
//! ```
//!
//! ## Environment overrides
//! [`CmsConfig::load_env`] strips a prefix and maps `__` to `.`:
//!
//! ```bash
//! export CMS__ASSET__UPLOAD_TTL_SECS=3600   # asset.upload_ttl_secs
//! ```

use std::collections::HashMap;
use std::time::Duration;

/// Prefix used by [`CmsConfig::from_env`].
pub const ENV_PREFIX: &str = "CMS__";

#[derive(Debug, Default, Clone)]
pub struct CmsConfig {
    values: HashMap<String, String>,
}

impl CmsConfig {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Config seeded from process environment variables under [`ENV_PREFIX`].
    pub fn from_env() -> Self {
        let mut config = Self::new();
        config.load_env(ENV_PREFIX, std::env::vars());
        config
    }

    /// Load `PREFIX` + `A__B` pairs as `a.b`.
    pub fn load_env<I>(&mut self, prefix: &str, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                self.set(normalized, value);
            }
        }
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn snapshot(&self) -> CmsConfigSnapshot {
        CmsConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CmsConfigSnapshot {
    map: HashMap<String, String>,
}

impl CmsConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse::<bool>().ok())
    }
}

/// Tunables of the asset orchestrator.
#[derive(Debug, Clone)]
pub struct AssetSettings {
    pub upload_ttl: Duration,
    pub max_upload_size: u64,
    pub flat_page_size: usize,
    /// Retries on serialisable conflict, on top of the first attempt.
    pub tx_retries: usize,
    pub base_url: String,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            upload_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            max_upload_size: 10 * 1024 * 1024 * 1024,
            flat_page_size: 1000,
            tx_retries: 2,
            base_url: "http://localhost:8080/assets".to_string(),
        }
    }
}

impl AssetSettings {
    pub fn from_snapshot(snapshot: &CmsConfigSnapshot) -> Self {
        let d = Self::default();
        Self {
            upload_ttl: snapshot
                .get_u64("asset.upload_ttl_secs")
                .map(Duration::from_secs)
                .unwrap_or(d.upload_ttl),
            max_upload_size: snapshot.get_u64("asset.max_upload_size").unwrap_or(d.max_upload_size),
            flat_page_size: snapshot
                .get_usize("asset.flat_page_size")
                .filter(|n| *n > 0)
                .unwrap_or(d.flat_page_size),
            tx_retries: snapshot.get_usize("asset.tx_retries").unwrap_or(d.tx_retries),
            base_url: snapshot.get_string("asset.base_url").unwrap_or(d.base_url),
        }
    }
}

/// Webhook delivery policy.
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub timeout: Duration,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
        }
    }
}

impl WebhookSettings {
    pub fn from_snapshot(snapshot: &CmsConfigSnapshot) -> Self {
        let d = Self::default();
        Self {
            max_attempts: snapshot
                .get_u64("webhook.max_attempts")
                .map(|n| n.max(1) as u32)
                .unwrap_or(d.max_attempts),
            base_backoff: snapshot
                .get_u64("webhook.base_backoff_ms")
                .map(Duration::from_millis)
                .unwrap_or(d.base_backoff),
            max_backoff: snapshot
                .get_u64("webhook.max_backoff_ms")
                .map(Duration::from_millis)
                .unwrap_or(d.max_backoff),
            timeout: snapshot
                .get_u64("webhook.timeout_secs")
                .map(Duration::from_secs)
                .unwrap_or(d.timeout),
        }
    }
}
