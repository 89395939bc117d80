use std::sync::Arc;

use async_trait::async_trait;
use cms_core::{ArchiveExtractionStatus, CmsResult, Operator};
use cms_queue::{JobError, JobId, TaskHandler, TaskPayload};
use tracing::{error, info, instrument, warn};

use crate::AssetInteractor;

/// Unpacks the archive at a blob key next to it, under the same asset prefix.
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    async fn extract(&self, path: &str) -> CmsResult<()>;
}

/// Worker side of decompression jobs: runs the extractor and reports the
/// outcome back through [`AssetInteractor::update_files`] as the machine
/// operator.
pub struct DecompressHandler {
    interactor: AssetInteractor,
    extractor: Arc<dyn ArchiveExtractor>,
}

impl DecompressHandler {
    pub fn new(interactor: AssetInteractor, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        Self { interactor, extractor }
    }
}

#[async_trait]
impl TaskHandler for DecompressHandler {
    #[instrument(skip(self, payload), fields(job_id = %job_id))]
    async fn handle(&self, job_id: &JobId, payload: TaskPayload) -> Result<(), JobError> {
        let Some(task) = payload.as_decompress() else {
            return Err(JobError::permanent(format!("unsupported task {}", payload.job_type())));
        };
        let machine = Operator::machine();

        if let Err(err) = self.extractor.extract(&task.path).await {
            error!(asset = %task.asset_id, error = %err, "extraction failed");
            if let Err(report) = self
                .interactor
                .update_files(&machine, task.asset_id, ArchiveExtractionStatus::Failed)
                .await
            {
                warn!(asset = %task.asset_id, error = %report, "could not record extraction failure");
            }
            return Err(JobError::permanent(err.to_string()));
        }

        // the status write may lose a race; let the queue try again
        self.interactor
            .update_files(&machine, task.asset_id, ArchiveExtractionStatus::Done)
            .await
            .map_err(|e| JobError::retryable(e.to_string()))?;
        info!(asset = %task.asset_id, "archive extracted");
        Ok(())
    }
}
