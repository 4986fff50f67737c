//! Scene archive extraction.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::{PipelineError, Result};

/// Unpacks every `.zip` directly under staging and deletes it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract all archives in `staging` into `staging`.
    ///
    /// Returns the archives that were processed. Other entries are left
    /// alone. The first failure aborts with
    /// [`PipelineError::ExtractionFailed`].
    pub fn extract_all(&self, staging: &Path) -> Result<Vec<PathBuf>> {
        let mut archives: Vec<PathBuf> = fs::read_dir(staging)
            .map_err(|e| failed(staging, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_zip(p))
            .collect();
        archives.sort();

        for archive in &archives {
            self.extract_one(archive, staging)?;
        }
        Ok(archives)
    }

    fn extract_one(&self, archive: &Path, dest: &Path) -> Result<()> {
        tracing::info!(archive = %archive.display(), "extracting");
        let file = File::open(archive).map_err(|e| failed(archive, e))?;
        let mut zip = ZipArchive::new(file).map_err(|e| failed(archive, e))?;
        zip.extract(dest).map_err(|e| failed(archive, e))?;
        drop(zip);

        fs::remove_file(archive).map_err(|e| failed(archive, e))?;
        tracing::debug!(archive = %archive.display(), "archive removed");
        Ok(())
    }
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

fn failed(path: &Path, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::ExtractionFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
