use std::collections::HashMap;

use async_trait::async_trait;
use cms_core::{AssetId, CmsError, CmsResult, File};

use crate::database::{MemoryDatabase, State};

pub const DEFAULT_FLAT_PAGE_SIZE: usize = 1000;

/// Per-asset file trees, nested or flat.
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Top-level file of an asset. Flat trees come back with every page joined
    /// in write order.
    async fn find_by_id(&self, id: AssetId) -> CmsResult<File>;

    /// Files of the requested assets that have one indexed.
    async fn find_by_ids(&self, ids: &[AssetId]) -> CmsResult<HashMap<AssetId, File>>;

    /// Store a nested tree, replacing any previous one.
    async fn save(&self, id: AssetId, file: &File) -> CmsResult<()>;

    /// Store a flat listing under `parent`: prior pages are cleared and new
    /// pages written in one step.
    async fn save_flat(&self, id: AssetId, parent: &File, files: &[File]) -> CmsResult<()>;

    async fn delete(&self, id: AssetId) -> CmsResult<()>;
}

#[derive(Clone)]
pub struct MemoryFileRepository {
    db: MemoryDatabase,
    page_size: usize,
}

impl MemoryFileRepository {
    pub fn new(db: MemoryDatabase) -> Self {
        Self {
            db,
            page_size: DEFAULT_FLAT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Number of flat pages stored for an asset.
    pub fn page_count(&self, id: AssetId) -> usize {
        self.db.read(|state| state.flat_pages.keys().filter(|(a, _)| *a == id).count())
    }

    fn load(state: &State, id: AssetId) -> Option<File> {
        let parent = state.files.get(&id)?;
        if !parent.is_flat() {
            return Some(parent.clone());
        }
        let files = state
            .flat_pages
            .range((id, 0)..=(id, usize::MAX))
            .flat_map(|(_, page)| page.iter().cloned())
            .collect();
        Some(parent.clone().with_flat_files(files))
    }

    fn clear(state: &mut State, id: AssetId) {
        state.files.remove(&id);
        state.flat_pages.retain(|(a, _), _| *a != id);
    }
}

#[async_trait]
impl FileRepository for MemoryFileRepository {
    async fn find_by_id(&self, id: AssetId) -> CmsResult<File> {
        self.db
            .read(|state| Self::load(state, id))
            .ok_or_else(|| CmsError::not_found(format!("no files indexed for asset {}", id)))
    }

    async fn find_by_ids(&self, ids: &[AssetId]) -> CmsResult<HashMap<AssetId, File>> {
        Ok(self.db.read(|state| {
            ids.iter()
                .filter_map(|id| Self::load(state, *id).map(|f| (*id, f)))
                .collect()
        }))
    }

    async fn save(&self, id: AssetId, file: &File) -> CmsResult<()> {
        self.db
            .write(|state| {
                Self::clear(state, id);
                state.files.insert(id, file.clone());
            })
            .await;
        Ok(())
    }

    async fn save_flat(&self, id: AssetId, parent: &File, files: &[File]) -> CmsResult<()> {
        let page_size = self.page_size;
        self.db
            .write(|state| {
                Self::clear(state, id);
                state.files.insert(id, parent.clone().with_flat_files(Vec::new()));
                for (index, page) in files.chunks(page_size).enumerate() {
                    state.flat_pages.insert((id, index), page.to_vec());
                }
            })
            .await;
        Ok(())
    }

    async fn delete(&self, id: AssetId) -> CmsResult<()> {
        self.db.write(|state| Self::clear(state, id)).await;
        Ok(())
    }
}
