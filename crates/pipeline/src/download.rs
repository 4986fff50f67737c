//! Bulk scene acquisition into staging.

use std::path::{Path, PathBuf};

use ndvimap_cloud::Scene;

use crate::catalog::SceneCatalog;
use crate::error::{PipelineError, Result};

/// Downloads the run's distinct scenes.
#[derive(Debug, Clone)]
pub struct DownloadOrchestrator {
    staging: PathBuf,
}

impl DownloadOrchestrator {
    pub fn new(staging: impl Into<PathBuf>) -> Self {
        Self {
            staging: staging.into(),
        }
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// Fetch one archive per scene. Any failure is fatal for the run.
    pub fn acquire(&self, catalog: &dyn SceneCatalog, scenes: &[Scene]) -> Result<Vec<PathBuf>> {
        if scenes.is_empty() {
            tracing::info!("nothing to download");
            return Ok(Vec::new());
        }

        tracing::info!(count = scenes.len(), dest = %self.staging.display(), "downloading scenes");
        let archives = catalog
            .download(scenes, &self.staging)
            .map_err(|e| PipelineError::AcquisitionFailed(e.to_string()))?;

        for path in &archives {
            tracing::debug!(path = %path.display(), "archive ready");
        }
        Ok(archives)
    }
}
