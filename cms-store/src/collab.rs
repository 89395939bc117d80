//! Contracts the asset engine needs from neighbouring subsystems, with
//! in-memory stand-ins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cms_core::{CmsError, CmsResult, ProjectId, ThreadId, WorkspaceId};
use parking_lot::RwLock;

/// Maps a project to the workspace that owns it.
#[async_trait]
pub trait ProjectResolver: Send + Sync {
    async fn workspace_of(&self, project: ProjectId) -> CmsResult<WorkspaceId>;
}

/// Workspace policies relevant to uploads.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Storage quota in bytes; `None` when the workspace has no policy.
    async fn asset_storage_quota(&self, workspace: WorkspaceId) -> CmsResult<Option<u64>>;
}

/// Comment threads attached to new assets.
#[async_trait]
pub trait ThreadGateway: Send + Sync {
    async fn create_thread(&self, workspace: WorkspaceId) -> CmsResult<ThreadId>;
}

#[derive(Clone, Default)]
pub struct MemoryProjects {
    projects: Arc<RwLock<HashMap<ProjectId, WorkspaceId>>>,
}

impl MemoryProjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, project: ProjectId, workspace: WorkspaceId) {
        self.projects.write().insert(project, workspace);
    }
}

#[async_trait]
impl ProjectResolver for MemoryProjects {
    async fn workspace_of(&self, project: ProjectId) -> CmsResult<WorkspaceId> {
        self.projects
            .read()
            .get(&project)
            .copied()
            .ok_or_else(|| CmsError::not_found(format!("project {} not found", project)))
    }
}

#[derive(Clone, Default)]
pub struct MemoryPolicies {
    quotas: Arc<RwLock<HashMap<WorkspaceId, u64>>>,
}

impl MemoryPolicies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_quota(&self, workspace: WorkspaceId, bytes: u64) {
        self.quotas.write().insert(workspace, bytes);
    }
}

#[async_trait]
impl PolicySource for MemoryPolicies {
    async fn asset_storage_quota(&self, workspace: WorkspaceId) -> CmsResult<Option<u64>> {
        Ok(self.quotas.read().get(&workspace).copied())
    }
}

/// Hands out fresh thread ids and remembers which workspace asked.
#[derive(Clone, Default)]
pub struct MemoryThreads {
    threads: Arc<RwLock<Vec<(ThreadId, WorkspaceId)>>>,
}

impl MemoryThreads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> Vec<(ThreadId, WorkspaceId)> {
        self.threads.read().clone()
    }
}

#[async_trait]
impl ThreadGateway for MemoryThreads {
    async fn create_thread(&self, workspace: WorkspaceId) -> CmsResult<ThreadId> {
        let id = ThreadId::new();
        self.threads.write().push((id, workspace));
        Ok(id)
    }
}
