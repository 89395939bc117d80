//! Asset records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{CmsError, CmsResult};
use crate::file::root_path;
use crate::id::{AssetId, IntegrationId, ProjectId, ThreadId, UserId, WorkspaceId};

/// Rendering hint derived from asset contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PreviewType {
    Image,
    Geo,
    Geo3dTiles,
    GeoMvt,
    Model3d,
    Unknown,
    #[default]
    None,
}

impl PreviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreviewType::Image => "image",
            PreviewType::Geo => "geo",
            PreviewType::Geo3dTiles => "geo-3d-tiles",
            PreviewType::GeoMvt => "geo-mvt",
            PreviewType::Model3d => "model-3d",
            PreviewType::Unknown => "unknown",
            PreviewType::None => "none",
        }
    }

    /// Best guess from the uploaded file alone.
    pub fn detect(file_name: &str, content_type: &str) -> PreviewType {
        if content_type.to_ascii_lowercase().starts_with("image/") {
            return PreviewType::Image;
        }
        match extension(file_name).as_deref() {
            Some("kml" | "czml" | "geojson" | "gpx" | "shp") => PreviewType::Geo,
            Some("glb" | "gltf") => PreviewType::Model3d,
            Some("mvt") => PreviewType::GeoMvt,
            Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "tif" | "tiff") => PreviewType::Image,
            _ => PreviewType::Unknown,
        }
    }

    /// Preview type implied by extracted archive entries, if any.
    ///
    /// `tileset.json` anywhere wins over `.mvt` tiles.
    pub fn from_entries<'a, I>(paths: I) -> Option<PreviewType>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut mvt = false;
        for path in paths {
            let base = path.rsplit('/').next().unwrap_or(path);
            if base == "tileset.json" {
                return Some(PreviewType::Geo3dTiles);
            }
            if extension(base).as_deref() == Some("mvt") {
                mvt = true;
            }
        }
        mvt.then_some(PreviewType::GeoMvt)
    }
}

impl fmt::Display for PreviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreviewType {
    type Err = CmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "image" => PreviewType::Image,
            "geo" => PreviewType::Geo,
            "geo-3d-tiles" => PreviewType::Geo3dTiles,
            "geo-mvt" => PreviewType::GeoMvt,
            "model-3d" => PreviewType::Model3d,
            "unknown" => PreviewType::Unknown,
            "none" | "" => PreviewType::None,
            other => return Err(CmsError::invalid_input(format!("unknown preview type {:?}", other))),
        })
    }
}

/// Extraction lifecycle of an archive asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArchiveExtractionStatus {
    Pending,
    InProgress,
    Done,
    Failed,
    Skipped,
    #[default]
    None,
}

impl ArchiveExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveExtractionStatus::Pending => "pending",
            ArchiveExtractionStatus::InProgress => "in-progress",
            ArchiveExtractionStatus::Done => "done",
            ArchiveExtractionStatus::Failed => "failed",
            ArchiveExtractionStatus::Skipped => "skipped",
            ArchiveExtractionStatus::None => "none",
        }
    }

    /// Status a freshly created asset starts in.
    pub fn initial(file_name: &str, skip_decompression: bool) -> Self {
        match (is_extractable(file_name), skip_decompression) {
            (true, false) => ArchiveExtractionStatus::Pending,
            (true, true) => ArchiveExtractionStatus::Skipped,
            (false, _) => ArchiveExtractionStatus::Done,
        }
    }

    pub fn can_transition_to(&self, next: ArchiveExtractionStatus) -> bool {
        use ArchiveExtractionStatus::*;
        matches!(
            (self, next),
            (None, Pending | Done | Skipped)
                | (Pending, InProgress)
                | (InProgress, Done | Failed)
                | (Failed, Pending)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ArchiveExtractionStatus::Done | ArchiveExtractionStatus::Skipped)
    }
}

impl fmt::Display for ArchiveExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveExtractionStatus {
    type Err = CmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => ArchiveExtractionStatus::Pending,
            "in-progress" | "in_progress" => ArchiveExtractionStatus::InProgress,
            "done" => ArchiveExtractionStatus::Done,
            "failed" => ArchiveExtractionStatus::Failed,
            "skipped" => ArchiveExtractionStatus::Skipped,
            "none" | "" => ArchiveExtractionStatus::None,
            other => {
                return Err(CmsError::invalid_input(format!(
                    "unknown archive extraction status {:?}",
                    other
                )))
            }
        })
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(PreviewType);
string_serde!(ArchiveExtractionStatus);

/// Lowercased extension without the dot.
pub fn extension(file_name: &str) -> Option<String> {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    base.rsplit_once('.')
        .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Archives the extraction worker knows how to unpack.
pub fn is_extractable(file_name: &str) -> bool {
    matches!(extension(file_name).as_deref(), Some("zip" | "7z"))
}

/// An uploaded artifact and its status fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "AssetDocument", try_from = "AssetDocument")]
pub struct Asset {
    id: AssetId,
    project: ProjectId,
    workspace: WorkspaceId,
    created_at: Option<DateTime<Utc>>,
    user: Option<UserId>,
    integration: Option<IntegrationId>,
    file_name: String,
    size: u64,
    content_type: String,
    content_encoding: String,
    preview_type: PreviewType,
    uuid: String,
    url: Option<String>,
    thread: Option<ThreadId>,
    archive_extraction_status: ArchiveExtractionStatus,
    flat_files: bool,
    public: bool,
}

impl Asset {
    pub fn builder() -> AssetBuilder {
        AssetBuilder::default()
    }

    pub fn id(&self) -> AssetId {
        self.id
    }
    pub fn project(&self) -> ProjectId {
        self.project
    }
    pub fn workspace(&self) -> WorkspaceId {
        self.workspace
    }
    pub fn user(&self) -> Option<UserId> {
        self.user
    }
    pub fn integration(&self) -> Option<IntegrationId> {
        self.integration
    }
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
    pub fn size(&self) -> u64 {
        self.size
    }
    pub fn content_type(&self) -> &str {
        &self.content_type
    }
    pub fn content_encoding(&self) -> &str {
        &self.content_encoding
    }
    pub fn preview_type(&self) -> PreviewType {
        self.preview_type
    }
    pub fn uuid(&self) -> &str {
        &self.uuid
    }
    /// Legacy persisted URL; canonical URLs are derived at read time.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
    pub fn thread(&self) -> Option<ThreadId> {
        self.thread
    }
    pub fn archive_extraction_status(&self) -> ArchiveExtractionStatus {
        self.archive_extraction_status
    }
    pub fn flat_files(&self) -> bool {
        self.flat_files
    }
    pub fn public(&self) -> bool {
        self.public
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or_else(|| self.id.timestamp())
    }

    /// Blob key of the originally uploaded file.
    pub fn root_path(&self) -> String {
        root_path(&self.uuid, &self.file_name)
    }

    pub fn set_preview_type(&mut self, preview_type: PreviewType) {
        self.preview_type = preview_type;
    }

    pub fn set_thread(&mut self, thread: ThreadId) {
        self.thread = Some(thread);
    }

    pub fn set_public(&mut self, public: bool) {
        self.public = public;
    }

    pub fn set_flat_files(&mut self, flat_files: bool) {
        self.flat_files = flat_files;
    }

    /// Move the extraction status along the state machine.
    pub fn transition_extraction(&mut self, next: ArchiveExtractionStatus) -> CmsResult<()> {
        if !self.archive_extraction_status.can_transition_to(next) {
            return Err(CmsError::invalid_transition(format!(
                "asset {}: archive extraction status cannot move from {} to {}",
                self.id, self.archive_extraction_status, next
            )));
        }
        self.archive_extraction_status = next;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct AssetBuilder {
    id: Option<AssetId>,
    project: Option<ProjectId>,
    workspace: Option<WorkspaceId>,
    created_at: Option<DateTime<Utc>>,
    user: Option<UserId>,
    integration: Option<IntegrationId>,
    machine: bool,
    file_name: String,
    size: u64,
    content_type: String,
    content_encoding: String,
    preview_type: PreviewType,
    uuid: String,
    url: Option<String>,
    thread: Option<ThreadId>,
    archive_extraction_status: ArchiveExtractionStatus,
    flat_files: bool,
    public: bool,
}

impl AssetBuilder {
    pub fn new_id(mut self) -> Self {
        self.id = Some(AssetId::new());
        self
    }
    pub fn id(mut self, id: AssetId) -> Self {
        self.id = Some(id);
        self
    }
    pub fn project(mut self, project: ProjectId) -> Self {
        self.project = Some(project);
        self
    }
    pub fn workspace(mut self, workspace: WorkspaceId) -> Self {
        self.workspace = Some(workspace);
        self
    }
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
    pub fn created_by_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }
    pub fn created_by_integration(mut self, integration: IntegrationId) -> Self {
        self.integration = Some(integration);
        self
    }
    /// Allow an asset without a creator; reserved for trusted runners.
    pub fn created_by_machine(mut self) -> Self {
        self.machine = true;
        self
    }
    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }
    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
    pub fn content_encoding(mut self, content_encoding: impl Into<String>) -> Self {
        self.content_encoding = content_encoding.into();
        self
    }
    pub fn preview_type(mut self, preview_type: PreviewType) -> Self {
        self.preview_type = preview_type;
        self
    }
    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
    pub fn thread(mut self, thread: ThreadId) -> Self {
        self.thread = Some(thread);
        self
    }
    pub fn archive_extraction_status(mut self, status: ArchiveExtractionStatus) -> Self {
        self.archive_extraction_status = status;
        self
    }
    pub fn flat_files(mut self, flat_files: bool) -> Self {
        self.flat_files = flat_files;
        self
    }
    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn build(self) -> CmsResult<Asset> {
        let id = self
            .id
            .filter(|id| !id.is_nil())
            .ok_or_else(|| CmsError::invalid_input("asset id is required"))?;
        let project = self
            .project
            .ok_or_else(|| CmsError::invalid_input("asset project is required"))?;
        let workspace = self
            .workspace
            .ok_or_else(|| CmsError::invalid_input("asset workspace is required"))?;
        if self.size == 0 {
            return Err(CmsError::invalid_input("asset size must be greater than zero"));
        }
        if self.uuid.is_empty() {
            return Err(CmsError::invalid_input("asset uuid is required"));
        }
        match (self.user.is_some(), self.integration.is_some()) {
            (true, true) => {
                return Err(CmsError::invalid_input("asset creator must be a user or an integration, not both"))
            }
            (false, false) if !self.machine => {
                return Err(CmsError::invalid_input("asset creator is required"))
            }
            _ => {}
        }

        Ok(Asset {
            id,
            project,
            workspace,
            created_at: self.created_at,
            user: self.user,
            integration: self.integration,
            file_name: self.file_name,
            size: self.size,
            content_type: self.content_type,
            content_encoding: self.content_encoding,
            preview_type: self.preview_type,
            uuid: self.uuid,
            url: self.url,
            thread: self.thread,
            archive_extraction_status: self.archive_extraction_status,
            flat_files: self.flat_files,
            public: self.public,
        })
    }
}

/// Persisted wire shape with stable field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetDocument {
    pub id: AssetId,
    pub project: ProjectId,
    pub workspace: WorkspaceId,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<UserId>,
    #[serde(default)]
    pub integration: Option<IntegrationId>,
    pub filename: String,
    pub size: u64,
    #[serde(default)]
    pub contenttype: String,
    #[serde(default)]
    pub contentencoding: String,
    #[serde(default)]
    pub previewtype: PreviewType,
    pub uuid: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub thread: Option<ThreadId>,
    #[serde(default)]
    pub archiveextractionstatus: ArchiveExtractionStatus,
    #[serde(default)]
    pub flatfiles: bool,
    #[serde(default)]
    pub public: bool,
}

impl From<Asset> for AssetDocument {
    fn from(a: Asset) -> Self {
        AssetDocument {
            created_at: a.created_at(),
            id: a.id,
            project: a.project,
            workspace: a.workspace,
            user: a.user,
            integration: a.integration,
            filename: a.file_name,
            size: a.size,
            contenttype: a.content_type,
            contentencoding: a.content_encoding,
            previewtype: a.preview_type,
            uuid: a.uuid,
            url: a.url,
            thread: a.thread,
            archiveextractionstatus: a.archive_extraction_status,
            flatfiles: a.flat_files,
            public: a.public,
        }
    }
}

impl TryFrom<AssetDocument> for Asset {
    type Error = CmsError;

    fn try_from(d: AssetDocument) -> Result<Self, Self::Error> {
        let mut b = Asset::builder()
            .id(d.id)
            .project(d.project)
            .workspace(d.workspace)
            .created_at(d.created_at)
            .file_name(d.filename)
            .size(d.size)
            .content_type(d.contenttype)
            .content_encoding(d.contentencoding)
            .preview_type(d.previewtype)
            .uuid(d.uuid)
            .archive_extraction_status(d.archiveextractionstatus)
            .flat_files(d.flatfiles)
            .public(d.public)
            .created_by_machine();
        if let Some(user) = d.user {
            b = b.created_by_user(user);
        }
        if let Some(integration) = d.integration {
            b = b.created_by_integration(integration);
        }
        if let Some(url) = d.url {
            b = b.url(url);
        }
        if let Some(thread) = d.thread {
            b = b.thread(thread);
        }
        b.build()
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset {} ({})", self.id, self.file_name)
    }
}
