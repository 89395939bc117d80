use cms_core::AssetId;
use serde::{Deserialize, Serialize};

/// Unpack an archive stored at `path` (a blob key) into the asset's prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompressTask {
    pub asset_id: AssetId,
    pub path: String,
}

/// Copy the documents of `collection` matching `filter`, applying `changes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyTask {
    pub collection: String,
    pub filter: serde_json::Value,
    pub changes: serde_json::Value,
}

/// Import the rows of an uploaded asset into `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTask {
    pub asset_id: AssetId,
    pub target: String,
    pub format: String,
}

/// Work handed to background workers.
///
/// Serialises externally tagged: `{"decompress": {"asset_id": .., "path": ..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPayload {
    Decompress(DecompressTask),
    Copy(CopyTask),
    Import(ImportTask),
}

impl TaskPayload {
    pub fn decompress(asset_id: AssetId, path: impl Into<String>) -> Self {
        Self::Decompress(DecompressTask {
            asset_id,
            path: path.into(),
        })
    }

    /// Stable job type string used for dispatch and logging.
    pub fn job_type(&self) -> &'static str {
        match self {
            Self::Decompress(_) => "decompress",
            Self::Copy(_) => "copy",
            Self::Import(_) => "import",
        }
    }

    pub fn as_decompress(&self) -> Option<&DecompressTask> {
        match self {
            Self::Decompress(task) => Some(task),
            _ => None,
        }
    }
}
