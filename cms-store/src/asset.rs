use std::sync::Arc;

use async_trait::async_trait;
use cms_blob::BlobGateway;
use cms_core::{Asset, AssetId, CmsError, CmsResult, ProjectFilter, ProjectId, WorkspaceId};
use tracing::{debug, warn};

use crate::database::MemoryDatabase;
use crate::search::{AssetSearch, Page};

/// Result of a batch delete: records removed before the first failure plus that failure.
#[derive(Debug, Default)]
pub struct BatchDeleteOutcome {
    pub deleted: Vec<AssetId>,
    pub first_error: Option<CmsError>,
}

impl BatchDeleteOutcome {
    pub fn is_ok(&self) -> bool {
        self.first_error.is_none()
    }

    pub fn into_result(self) -> CmsResult<Vec<AssetId>> {
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(self.deleted),
        }
    }
}

/// Persistent index of asset records.
///
/// Reads apply the repository's readable projects as a predicate and writes
/// check the writable projects, failing with `OperationDenied`. Every value
/// returned is an owned copy.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    /// Narrow this repository to `filter`.
    fn filtered(&self, filter: &ProjectFilter) -> Arc<dyn AssetRepository>;

    async fn find_by_id(&self, id: AssetId) -> CmsResult<Asset>;

    async fn find_by_uuid(&self, uuid: &str) -> CmsResult<Asset>;

    /// One slot per requested id, in request order; `None` for misses.
    async fn find_by_ids(&self, ids: &[AssetId]) -> CmsResult<Vec<Option<Asset>>>;

    /// Paged search inside one project. Unreadable projects yield an empty page.
    async fn search(&self, project: ProjectId, query: &AssetSearch) -> CmsResult<Page<Asset>>;

    async fn find_by_workspace(&self, workspace: WorkspaceId, query: &AssetSearch) -> CmsResult<Page<Asset>>;

    async fn find_by_workspace_project(
        &self,
        workspace: WorkspaceId,
        project: Option<ProjectId>,
        query: &AssetSearch,
    ) -> CmsResult<Page<Asset>>;

    async fn total_size_by_workspace(&self, workspace: WorkspaceId) -> CmsResult<u64>;

    /// Upsert by id.
    async fn save(&self, asset: &Asset) -> CmsResult<()>;

    async fn delete(&self, id: AssetId) -> CmsResult<()>;

    async fn batch_delete(&self, ids: &[AssetId]) -> BatchDeleteOutcome;

    /// Tear down every asset of a project, blob first. Per-asset failures are
    /// logged and skipped; returns the number of records removed.
    async fn remove_by_project_with_file(&self, project: ProjectId, gateway: &dyn BlobGateway) -> CmsResult<usize>;
}

/// [`AssetRepository`] over a [`MemoryDatabase`].
#[derive(Clone)]
pub struct MemoryAssetRepository {
    db: MemoryDatabase,
    filter: ProjectFilter,
}

impl MemoryAssetRepository {
    pub fn new(db: MemoryDatabase) -> Self {
        Self {
            db,
            filter: ProjectFilter::unrestricted(),
        }
    }

    pub fn filter(&self) -> &ProjectFilter {
        &self.filter
    }

    fn readable(&self, asset: &Asset) -> bool {
        self.filter.can_read(&asset.project())
    }

    fn ensure_writable(&self, project: &ProjectId) -> CmsResult<()> {
        if self.filter.can_write(project) {
            Ok(())
        } else {
            Err(CmsError::operation_denied(format!("project {} is not writable", project)))
        }
    }

    fn collect<F>(&self, predicate: F) -> Vec<Asset>
    where
        F: Fn(&Asset) -> bool,
    {
        self.db.read(|state| {
            state
                .assets
                .values()
                .filter(|a| self.readable(a) && predicate(a))
                .cloned()
                .collect()
        })
    }

    async fn delete_one(&self, id: AssetId) -> CmsResult<()> {
        self.db
            .write(|state| {
                let project = state
                    .assets
                    .get(&id)
                    .map(|a| a.project())
                    .ok_or_else(|| CmsError::not_found(format!("asset {} not found", id)))?;
                self.ensure_writable(&project)?;
                state.assets.remove(&id);
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl AssetRepository for MemoryAssetRepository {
    fn filtered(&self, filter: &ProjectFilter) -> Arc<dyn AssetRepository> {
        let filter = if self.filter.is_unrestricted() {
            filter.clone()
        } else {
            self.filter.merge(filter)
        };
        Arc::new(Self {
            db: self.db.clone(),
            filter,
        })
    }

    async fn find_by_id(&self, id: AssetId) -> CmsResult<Asset> {
        self.db
            .read(|state| state.assets.get(&id).filter(|a| self.readable(a)).cloned())
            .ok_or_else(|| CmsError::not_found(format!("asset {} not found", id)))
    }

    async fn find_by_uuid(&self, uuid: &str) -> CmsResult<Asset> {
        self.db
            .read(|state| {
                state
                    .assets
                    .values()
                    .find(|a| a.uuid() == uuid && self.readable(a))
                    .cloned()
            })
            .ok_or_else(|| CmsError::not_found(format!("asset with uuid {} not found", uuid)))
    }

    async fn find_by_ids(&self, ids: &[AssetId]) -> CmsResult<Vec<Option<Asset>>> {
        Ok(self.db.read(|state| {
            ids.iter()
                .map(|id| state.assets.get(id).filter(|a| self.readable(a)).cloned())
                .collect()
        }))
    }

    async fn search(&self, project: ProjectId, query: &AssetSearch) -> CmsResult<Page<Asset>> {
        if !self.filter.can_read(&project) {
            debug!(%project, "search on unreadable project");
            return Ok(Page::empty());
        }
        query.apply(self.collect(|a| a.project() == project))
    }

    async fn find_by_workspace(&self, workspace: WorkspaceId, query: &AssetSearch) -> CmsResult<Page<Asset>> {
        query.apply(self.collect(|a| a.workspace() == workspace))
    }

    async fn find_by_workspace_project(
        &self,
        workspace: WorkspaceId,
        project: Option<ProjectId>,
        query: &AssetSearch,
    ) -> CmsResult<Page<Asset>> {
        if let Some(project) = project.filter(|p| !self.filter.can_read(p)) {
            debug!(%project, "workspace search on unreadable project");
            return Ok(Page::empty());
        }
        query.apply(self.collect(|a| a.workspace() == workspace && project.map_or(true, |p| a.project() == p)))
    }

    async fn total_size_by_workspace(&self, workspace: WorkspaceId) -> CmsResult<u64> {
        Ok(self.db.read(|state| {
            state
                .assets
                .values()
                .filter(|a| a.workspace() == workspace)
                .map(|a| a.size())
                .sum()
        }))
    }

    async fn save(&self, asset: &Asset) -> CmsResult<()> {
        self.ensure_writable(&asset.project())?;
        self.db
            .write(|state| {
                if let Some(other) = state
                    .assets
                    .values()
                    .find(|a| a.uuid() == asset.uuid() && a.id() != asset.id())
                {
                    return Err(CmsError::already_exists(format!(
                        "uuid {} is already used by asset {}",
                        asset.uuid(),
                        other.id()
                    )));
                }
                state.assets.insert(asset.id(), asset.clone());
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: AssetId) -> CmsResult<()> {
        self.delete_one(id).await
    }

    async fn batch_delete(&self, ids: &[AssetId]) -> BatchDeleteOutcome {
        let mut outcome = BatchDeleteOutcome::default();
        for id in ids {
            match self.delete_one(*id).await {
                Ok(()) => outcome.deleted.push(*id),
                Err(err) => {
                    outcome.first_error = Some(err);
                    break;
                }
            }
        }
        outcome
    }

    async fn remove_by_project_with_file(&self, project: ProjectId, gateway: &dyn BlobGateway) -> CmsResult<usize> {
        self.ensure_writable(&project)?;
        let assets = self.collect(|a| a.project() == project);

        let mut removed = 0;
        for asset in assets {
            if !asset.uuid().is_empty() && !asset.file_name().is_empty() {
                if let Err(err) = gateway.delete_asset(asset.uuid(), asset.file_name()).await {
                    warn!(asset = %asset.id(), uuid = asset.uuid(), error = %err, "failed to delete asset blob");
                    continue;
                }
            }
            match self.delete_one(asset.id()).await {
                Ok(()) => removed += 1,
                Err(err) => warn!(asset = %asset.id(), error = %err, "failed to delete asset record"),
            }
        }
        Ok(removed)
    }
}
