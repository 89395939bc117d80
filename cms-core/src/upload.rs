use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ProjectId;

/// Record authorising a resumable upload; immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    pub uuid: String,
    pub project: ProjectId,
    pub file_name: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content_encoding: String,
    pub content_length: u64,
    pub expires_at: DateTime<Utc>,
}

impl UploadTicket {
    pub fn new(uuid: impl Into<String>, project: ProjectId, file_name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            uuid: uuid.into(),
            project,
            file_name: file_name.into(),
            content_type: String::new(),
            content_encoding: String::new(),
            content_length: 0,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_content_encoding(mut self, content_encoding: impl Into<String>) -> Self {
        self.content_encoding = content_encoding.into();
        self
    }

    pub fn with_content_length(mut self, content_length: u64) -> Self {
        self.content_length = content_length;
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Opaque resumable-upload cursor: `<uuid>_<cursor>`.
pub fn wrap_cursor(uuid: &str, next: &str) -> String {
    if next.is_empty() {
        String::new()
    } else {
        format!("{}_{}", uuid, next)
    }
}

/// Split a wrapped cursor on the first underscore.
pub fn split_cursor(cursor: &str) -> Option<(&str, &str)> {
    cursor.split_once('_').filter(|(uuid, _)| !uuid.is_empty())
}
