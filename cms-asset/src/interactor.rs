use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use cms_blob::{new_blob_uuid, resolve_content_type, BlobGateway, ReadHeaders, ReadResponse, UploadLinkParams};
use cms_core::{
    split_cursor, wrap_cursor, Actor, ArchiveExtractionStatus, Asset, AssetId, AssetSettings, CmsError, CmsResult,
    ErrorKind, Event, EventType, File, Operator, PreviewType, ProjectId, ThreadId, UploadTicket, WorkspaceId,
};
use cms_events::EventBus;
use cms_queue::{JobId, TaskDispatcher, TaskPayload};
use cms_store::{
    AssetRepository, AssetSearch, FileRepository, MemoryAssetRepository, MemoryDatabase, MemoryFileRepository,
    MemoryUploadRepository, Page, PolicySource, ProjectResolver, ThreadGateway, Transactor, UploadRepository,
};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::params::{CreateAssetParam, CreateUploadParam, UpdateAssetParam, UploadInfo};
use crate::tx::with_tx_retry;

/// Persistence the interactor writes through.
#[derive(Clone)]
pub struct Repos {
    pub assets: Arc<dyn AssetRepository>,
    pub files: Arc<dyn FileRepository>,
    pub uploads: Arc<dyn UploadRepository>,
    pub transactor: Arc<dyn Transactor>,
}

impl Repos {
    pub fn memory(db: &MemoryDatabase, settings: &AssetSettings) -> Self {
        Self {
            assets: Arc::new(MemoryAssetRepository::new(db.clone())),
            files: Arc::new(MemoryFileRepository::new(db.clone()).with_page_size(settings.flat_page_size)),
            uploads: Arc::new(MemoryUploadRepository::new(db.clone())),
            transactor: Arc::new(db.clone()),
        }
    }
}

/// Services outside the asset store.
#[derive(Clone)]
pub struct Gateways {
    pub blob: Arc<dyn BlobGateway>,
    pub dispatcher: Arc<dyn TaskDispatcher>,
    pub projects: Arc<dyn ProjectResolver>,
    pub policies: Arc<dyn PolicySource>,
    pub threads: Arc<dyn ThreadGateway>,
}

/// The asset use cases.
///
/// Every operation checks the operator first, does its repository writes in one
/// transaction (events are persisted inside it) and publishes events only
/// after the commit.
#[derive(Clone)]
pub struct AssetInteractor {
    repos: Repos,
    gateways: Gateways,
    events: EventBus,
    settings: AssetSettings,
}

impl AssetInteractor {
    pub fn new(repos: Repos, gateways: Gateways, events: EventBus) -> Self {
        Self {
            repos,
            gateways,
            events,
            settings: AssetSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: AssetSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &AssetSettings {
        &self.settings
    }

    /// Repository narrowed to what `operator` may see.
    fn assets_for(&self, operator: &Operator) -> Arc<dyn AssetRepository> {
        self.repos.assets.filtered(&operator.projects)
    }

    async fn writable_workspace(&self, operator: &Operator, project: ProjectId) -> CmsResult<WorkspaceId> {
        let workspace = self.gateways.projects.workspace_of(project).await?;
        if !operator.can_write_workspace(&workspace) {
            return Err(CmsError::operation_denied(format!(
                "no write access to workspace {} of project {}",
                workspace, project
            )));
        }
        Ok(workspace)
    }

    fn ensure_update(operator: &Operator, asset: &Asset) -> CmsResult<()> {
        if operator.can_update_project(&asset.project()) {
            Ok(())
        } else {
            Err(CmsError::operation_denied(format!("no update access to asset {}", asset.id())))
        }
    }

    async fn transaction<T, F, Fut>(&self, op: F) -> CmsResult<T>
    where
        T: Send,
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = CmsResult<T>> + Send,
    {
        with_tx_retry(self.repos.transactor.as_ref(), self.settings.tx_retries, op).await
    }

    /// Fan the event out. Failures are logged; the change is already committed.
    async fn publish(&self, event: &Event) {
        match self.events.publish(event).await {
            Ok(deliveries) => debug!(event_id = %event.id, deliveries = deliveries.len(), "event published"),
            Err(err) => warn!(event_id = %event.id, error = %err, "event publication failed"),
        }
    }

    // ---- reads ----

    pub async fn find_by_id(&self, operator: &Operator, id: AssetId) -> CmsResult<Asset> {
        self.assets_for(operator).find_by_id(id).await
    }

    pub async fn find_by_uuid(&self, operator: &Operator, uuid: &str) -> CmsResult<Asset> {
        self.assets_for(operator).find_by_uuid(uuid).await
    }

    pub async fn find_by_ids(&self, operator: &Operator, ids: &[AssetId]) -> CmsResult<Vec<Option<Asset>>> {
        self.assets_for(operator).find_by_ids(ids).await
    }

    /// Unreadable projects produce an empty page, not an error.
    pub async fn search(&self, operator: &Operator, project: ProjectId, query: &AssetSearch) -> CmsResult<Page<Asset>> {
        self.assets_for(operator).search(project, query).await
    }

    pub async fn find_file_by_asset(&self, operator: &Operator, id: AssetId) -> CmsResult<File> {
        let asset = self.find_by_id(operator, id).await?;
        self.repos.files.find_by_id(asset.id()).await
    }

    /// Trees of the readable assets among `ids`; others are left out.
    pub async fn find_files_by_assets(&self, operator: &Operator, ids: &[AssetId]) -> CmsResult<HashMap<AssetId, File>> {
        let readable: Vec<AssetId> = self
            .find_by_ids(operator, ids)
            .await?
            .into_iter()
            .flatten()
            .map(|a| a.id())
            .collect();
        self.repos.files.find_by_ids(&readable).await
    }

    #[instrument(skip(self, operator, headers), fields(asset = %id))]
    pub async fn download(&self, operator: &Operator, id: AssetId, headers: &ReadHeaders) -> CmsResult<ReadResponse> {
        let asset = self.find_by_id(operator, id).await?;
        Ok(self
            .gateways
            .blob
            .read_asset(asset.uuid(), asset.file_name(), headers)
            .await?)
    }

    // ---- create ----

    /// Store a new asset from an inline file or a finished upload ticket.
    #[instrument(skip(self, operator, param), fields(project = %param.project))]
    pub async fn create(&self, operator: &Operator, param: CreateAssetParam) -> CmsResult<(Asset, File)> {
        let workspace = self.writable_workspace(operator, param.project).await?;

        let (uuid, file, inline) = match (param.file, param.token) {
            (Some(mut upload), _) => {
                let mut name = upload.name.rsplit('/').next().unwrap_or_default().trim().to_string();
                let encoding = upload.content_encoding.clone().unwrap_or_default();
                if encoding == "gzip" {
                    if let Some(stripped) = name.strip_suffix(".gz") {
                        name = stripped.to_string();
                    }
                }
                let content_type = resolve_content_type(upload.content_type.as_deref(), &name);
                upload.name = name.clone();
                upload.content_type = Some(content_type.clone());

                let (uuid, size) = self.gateways.blob.upload_asset(upload).await?;
                let file = File::new(name.clone(), name, size)
                    .with_content_type(content_type)
                    .with_content_encoding(encoding);
                (uuid, file, true)
            }
            (None, Some(token)) => {
                let ticket = self.repos.uploads.find_by_id(&token).await?;
                if ticket.project != param.project {
                    return Err(CmsError::invalid_input(format!(
                        "upload {} belongs to another project",
                        ticket.uuid
                    )));
                }
                if ticket.expired(Utc::now()) {
                    return Err(CmsError::ticket_expired(format!("upload {} has expired", ticket.uuid)));
                }
                let file = self.gateways.blob.uploaded_asset(&ticket).await?;
                (ticket.uuid, file, false)
            }
            (None, None) => return Err(CmsError::file_not_included("either a file or an upload token is required")),
        };

        let status = ArchiveExtractionStatus::initial(&file.name, param.skip_decompression);
        let mut builder = Asset::builder()
            .new_id()
            .project(param.project)
            .workspace(workspace)
            .file_name(file.name.clone())
            .size(file.size)
            .content_type(file.content_type.clone())
            .content_encoding(file.content_encoding.clone())
            .preview_type(PreviewType::detect(&file.name, &file.content_type))
            .uuid(uuid.clone())
            .archive_extraction_status(status);
        builder = match operator.actor {
            Actor::User(user) => builder.created_by_user(user),
            Actor::Integration(integration) => builder.created_by_integration(integration),
            Actor::Machine => builder.created_by_machine(),
        };

        let asset = match builder.build() {
            Ok(asset) => asset,
            Err(err) => {
                if inline {
                    self.discard_blob(&uuid, &file.name).await;
                }
                return Err(err);
            }
        };

        match self.persist_new(operator, workspace, &asset, &file).await {
            Ok((asset, event)) => {
                info!(asset = %asset.id(), uuid = %asset.uuid(), status = %asset.archive_extraction_status(), "asset created");
                self.publish(&event).await;
                Ok((asset, file))
            }
            Err(err) if err.is(ErrorKind::PolicyViolation) => {
                let url = self.gateways.blob.access_info(&asset).url;
                if let Err(cleanup) = self.gateways.blob.remove_asset(&url).await {
                    warn!(url = %url, error = %cleanup, "failed to remove blob after quota breach");
                }
                Err(err)
            }
            Err(err) => {
                if inline {
                    self.discard_blob(&uuid, &file.name).await;
                }
                Err(err)
            }
        }
    }

    async fn discard_blob(&self, uuid: &str, file_name: &str) {
        if let Err(cleanup) = self.gateways.blob.delete_asset(uuid, file_name).await {
            warn!(uuid = %uuid, error = %cleanup, "failed to remove blob of aborted asset");
        }
    }

    /// Save a new asset, its file and its create event.
    ///
    /// The comment thread and the decompress job are created at most once,
    /// however many times the transaction is retried.
    async fn persist_new(
        &self,
        operator: &Operator,
        workspace: WorkspaceId,
        asset: &Asset,
        file: &File,
    ) -> CmsResult<(Asset, Event)> {
        let quota = self.gateways.policies.asset_storage_quota(workspace).await?;

        let repo = self.assets_for(operator);
        let repo = &repo;
        let thread: OnceCell<ThreadId> = OnceCell::new();
        let job: OnceCell<JobId> = OnceCell::new();
        let (thread, job) = (&thread, &job);
        self.transaction(move || async move {
            if let Some(quota) = quota {
                self.check_quota(workspace, quota, asset.size()).await?;
            }

            let mut asset = asset.clone();
            let thread = *thread
                .get_or_try_init(|| self.gateways.threads.create_thread(workspace))
                .await?;
            asset.set_thread(thread);
            repo.save(&asset).await?;
            self.repos.files.save(asset.id(), file).await?;

            if asset.archive_extraction_status() == ArchiveExtractionStatus::Pending {
                self.enqueue_decompress(job, &asset).await?;
                asset.transition_extraction(ArchiveExtractionStatus::InProgress)?;
                repo.save(&asset).await?;
            }

            let event = Event::for_asset(EventType::AssetCreate, operator, &asset);
            self.events.save(&event).await?;
            Ok((asset, event))
        })
        .await
    }

    /// Enqueue the decompress job unless `job` already holds one.
    async fn enqueue_decompress(&self, job: &OnceCell<JobId>, asset: &Asset) -> CmsResult<()> {
        let id = asset.id();
        let payload = TaskPayload::decompress(id, asset.root_path());
        job.get_or_try_init(|| async move {
            self.gateways
                .dispatcher
                .run(payload)
                .await
                .map_err(|e| CmsError::from(e).with_context(format!("asset {}", id)))
        })
        .await?;
        Ok(())
    }

    /// Reject an upload of `size` bytes that would push the workspace past
    /// `quota`. Runs inside the create transaction.
    async fn check_quota(&self, workspace: WorkspaceId, quota: u64, size: u64) -> CmsResult<()> {
        let current = self.repos.assets.total_size_by_workspace(workspace).await?;
        let total = current.saturating_add(size);
        if total <= quota {
            return Ok(());
        }
        Err(CmsError::policy_violation(format!(
            "workspace {} would use {} of {} bytes",
            workspace, total, quota
        )))
    }

    // ---- extraction ----

    /// Record the outcome of an extraction job.
    ///
    /// A no-op when the asset is already `done` or already in `status`.
    #[instrument(skip(self, operator), fields(asset = %id, status = %status))]
    pub async fn update_files(&self, operator: &Operator, id: AssetId, status: ArchiveExtractionStatus) -> CmsResult<Asset> {
        let current = self.find_by_id(operator, id).await?;
        Self::ensure_update(operator, &current)?;

        let updated = self
            .transaction(move || async move {
                let mut asset = self.repos.assets.find_by_id(id).await?;
                let from = asset.archive_extraction_status();
                if from == ArchiveExtractionStatus::Done || from == status {
                    return Ok((asset, None));
                }
                asset.transition_extraction(status)?;

                if status == ArchiveExtractionStatus::Done {
                    self.index_extracted(&mut asset).await?;
                }
                self.repos.assets.save(&asset).await?;

                let event = Event::for_asset(EventType::AssetDecompress, operator, &asset);
                self.events.save(&event).await?;
                Ok((asset, Some(event)))
            })
            .await?;

        let (asset, event) = updated;
        if let Some(event) = event {
            info!(preview = %asset.preview_type(), "extraction status updated");
            self.publish(&event).await;
        }
        Ok(asset)
    }

    /// List extracted entries into a flat tree and refresh the preview type.
    async fn index_extracted(&self, asset: &mut Asset) -> CmsResult<()> {
        let entries = self.gateways.blob.get_asset_files(asset.uuid()).await?;
        let archive = asset.file_name().trim_start_matches('/').to_string();

        let files: Vec<File> = entries
            .iter()
            .filter(|entry| entry.name.trim_start_matches('/') != archive)
            .map(|entry| {
                let name = entry.name.rsplit('/').next().unwrap_or(&entry.name).to_string();
                File::new(name, entry.name.clone(), entry.size).with_content_type(entry.content_type.clone())
            })
            .collect();

        if let Some(preview) = PreviewType::from_entries(files.iter().map(|f| f.path.as_str())) {
            asset.set_preview_type(preview);
        }

        let parent = File::new(asset.file_name(), asset.file_name(), asset.size())
            .with_content_type(asset.content_type())
            .with_content_encoding(asset.content_encoding());
        self.repos.files.save_flat(asset.id(), &parent, &files).await?;
        asset.set_flat_files(true);
        debug!(entries = files.len(), "indexed extracted files");
        Ok(())
    }

    /// Send a failed extraction back through the queue.
    #[instrument(skip(self, operator), fields(asset = %id))]
    pub async fn retry_decompression(&self, operator: &Operator, id: AssetId) -> CmsResult<Asset> {
        let current = self.find_by_id(operator, id).await?;
        Self::ensure_update(operator, &current)?;

        let job: OnceCell<JobId> = OnceCell::new();
        let job = &job;
        let asset = self
            .transaction(move || async move {
                let mut asset = self.repos.assets.find_by_id(id).await?;
                asset.transition_extraction(ArchiveExtractionStatus::Pending)?;
                self.enqueue_decompress(job, &asset).await?;
                asset.transition_extraction(ArchiveExtractionStatus::InProgress)?;
                self.repos.assets.save(&asset).await?;
                Ok(asset)
            })
            .await?;

        info!("decompression re-enqueued");
        Ok(asset)
    }

    // ---- updates ----

    #[instrument(skip(self, operator, param), fields(asset = %param.id))]
    pub async fn update(&self, operator: &Operator, param: UpdateAssetParam) -> CmsResult<Asset> {
        let current = self.find_by_id(operator, param.id).await?;
        Self::ensure_update(operator, &current)?;

        let (id, preview_type) = (param.id, param.preview_type);
        self.transaction(move || async move {
            let mut asset = self.repos.assets.find_by_id(id).await?;
            if let Some(preview) = preview_type {
                asset.set_preview_type(preview);
            }
            self.repos.assets.save(&asset).await?;
            Ok(asset)
        })
        .await
    }

    #[instrument(skip(self, operator), fields(asset = %id))]
    pub async fn publish_asset(&self, operator: &Operator, id: AssetId) -> CmsResult<Asset> {
        self.set_visibility(operator, id, true).await
    }

    #[instrument(skip(self, operator), fields(asset = %id))]
    pub async fn unpublish_asset(&self, operator: &Operator, id: AssetId) -> CmsResult<Asset> {
        self.set_visibility(operator, id, false).await
    }

    async fn set_visibility(&self, operator: &Operator, id: AssetId, public: bool) -> CmsResult<Asset> {
        let current = self.find_by_id(operator, id).await?;
        Self::ensure_update(operator, &current)?;

        if public {
            self.gateways.blob.publish_asset(current.uuid(), current.file_name()).await?;
        } else {
            self.gateways.blob.unpublish_asset(current.uuid(), current.file_name()).await?;
        }

        let asset = self
            .transaction(move || async move {
                let mut asset = self.repos.assets.find_by_id(id).await?;
                asset.set_public(public);
                self.repos.assets.save(&asset).await?;
                Ok(asset)
            })
            .await?;

        info!(public, "asset visibility changed");
        Ok(asset)
    }

    // ---- deletes ----

    #[instrument(skip(self, operator), fields(asset = %id))]
    pub async fn delete(&self, operator: &Operator, id: AssetId) -> CmsResult<AssetId> {
        let asset = self.find_by_id(operator, id).await?;
        Self::ensure_update(operator, &asset)?;

        if !asset.uuid().is_empty() && !asset.file_name().is_empty() {
            self.gateways
                .blob
                .delete_asset(asset.uuid(), asset.file_name())
                .await
                .map_err(|e| CmsError::from(e).with_context(format!("asset {}", id)))?;
        }

        let repo = self.assets_for(operator);
        let (repo, asset) = (&repo, &asset);
        let event = self
            .transaction(move || async move {
                repo.delete(id).await?;
                self.repos.files.delete(id).await?;
                let event = Event::for_asset(EventType::AssetDelete, operator, asset);
                self.events.save(&event).await?;
                Ok(event)
            })
            .await?;

        info!("asset deleted");
        self.publish(&event).await;
        Ok(id)
    }

    /// Delete several assets with one blob call. Every id must exist and be
    /// writable; no per-asset events are emitted.
    #[instrument(skip(self, operator, ids), fields(count = ids.len()))]
    pub async fn batch_delete(&self, operator: &Operator, ids: &[AssetId]) -> CmsResult<Vec<AssetId>> {
        let mut unique: Vec<AssetId> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }

        let found = self.find_by_ids(operator, &unique).await?;
        let found: Vec<Asset> = found.into_iter().flatten().collect();
        if found.len() != unique.len() {
            return Err(CmsError::partial_not_found(format!(
                "found {} of {} requested assets",
                found.len(),
                unique.len()
            )));
        }
        for asset in &found {
            Self::ensure_update(operator, asset)?;
        }

        let mut uuids: Vec<String> = Vec::with_capacity(found.len());
        for asset in &found {
            let uuid = asset.uuid().to_string();
            if !uuid.is_empty() && !uuids.contains(&uuid) {
                uuids.push(uuid);
            }
        }
        if !uuids.is_empty() {
            self.gateways.blob.delete_assets(&uuids).await?;
        }

        let repo = self.assets_for(operator);
        let (repo, unique) = (&repo, &unique);
        let deleted = self
            .transaction(move || async move {
                let deleted = repo.batch_delete(unique).await.into_result()?;
                for id in &deleted {
                    self.repos.files.delete(*id).await?;
                }
                Ok(deleted)
            })
            .await?;

        info!(deleted = deleted.len(), "assets deleted");
        Ok(deleted)
    }

    /// Remove every asset of `project` and its blobs. Returns how many went.
    #[instrument(skip(self, operator), fields(project = %project))]
    pub async fn delete_project_assets(&self, operator: &Operator, project: ProjectId) -> CmsResult<usize> {
        self.writable_workspace(operator, project).await?;

        let removed = self
            .transaction(move || async move {
                self.repos
                    .assets
                    .remove_by_project_with_file(project, self.gateways.blob.as_ref())
                    .await
            })
            .await?;

        info!(removed, "project assets removed");
        Ok(removed)
    }

    // ---- uploads ----

    /// Start or continue a resumable upload.
    #[instrument(skip(self, operator, param), fields(project = %param.project))]
    pub async fn create_upload(&self, operator: &Operator, param: CreateUploadParam) -> CmsResult<UploadInfo> {
        self.writable_workspace(operator, param.project).await?;

        if param.cursor.is_empty() {
            return self.start_upload(param).await;
        }

        let (uuid, cursor) = split_cursor(&param.cursor)
            .ok_or_else(|| CmsError::invalid_input(format!("malformed upload cursor {:?}", param.cursor)))?;
        let ticket = self.repos.uploads.find_by_id(uuid).await?;
        if ticket.project != param.project {
            return Err(CmsError::invalid_input(format!("upload {} belongs to another project", uuid)));
        }
        if ticket.expired(Utc::now()) {
            return Err(CmsError::ticket_expired(format!("upload {} has expired", uuid)));
        }

        let link = self
            .gateways
            .blob
            .issue_upload_link(UploadLinkParams {
                uuid: ticket.uuid.clone(),
                file_name: ticket.file_name.clone(),
                content_type: ticket.content_type.clone(),
                content_encoding: ticket.content_encoding.clone(),
                content_length: ticket.content_length,
                expires_at: Some(ticket.expires_at),
                cursor: cursor.to_string(),
            })
            .await?;

        Ok(UploadInfo {
            next: wrap_cursor(&ticket.uuid, &link.next),
            uuid: ticket.uuid,
            url: link.url,
            content_type: link.content_type,
            content_encoding: link.content_encoding,
            content_length: link.content_length,
        })
    }

    async fn start_upload(&self, param: CreateUploadParam) -> CmsResult<UploadInfo> {
        let ttl = chrono::Duration::from_std(self.settings.upload_ttl)
            .map_err(|e| CmsError::internal(format!("upload ttl out of range: {}", e)))?;
        let ticket = UploadTicket::new(new_blob_uuid(), param.project, param.file_name, ttl)
            .with_content_encoding(param.content_encoding)
            .with_content_length(param.content_length);

        let link = self
            .gateways
            .blob
            .issue_upload_link(UploadLinkParams {
                uuid: ticket.uuid.clone(),
                file_name: ticket.file_name.clone(),
                content_type: param.content_type,
                content_encoding: ticket.content_encoding.clone(),
                content_length: ticket.content_length,
                expires_at: Some(ticket.expires_at),
                cursor: String::new(),
            })
            .await?;

        let ticket = ticket.with_content_type(link.content_type.clone());
        let ticket = &ticket;
        self.transaction(move || async move { self.repos.uploads.save(ticket).await })
            .await?;
        info!(uuid = %ticket.uuid, "upload started");

        Ok(UploadInfo {
            uuid: ticket.uuid.clone(),
            url: link.url,
            content_type: link.content_type,
            content_encoding: link.content_encoding,
            content_length: link.content_length,
            next: wrap_cursor(&ticket.uuid, &link.next),
        })
    }
}
