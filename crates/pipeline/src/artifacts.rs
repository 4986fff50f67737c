//! Per-field artifact paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::ArtifactPolicy;
use crate::error::{PipelineError, Result};

pub const INDEX_FILE: &str = "NDVI.tif";
pub const MASKED_FILE: &str = "NDVI_masked.tif";
pub const PREVIEW_FILE: &str = "NDVI_colored.png";

/// Deterministic layout of `<root>/<field id>/...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn field_dir(&self, id: i64) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Full-extent index raster
    pub fn index_path(&self, id: i64) -> PathBuf {
        self.field_dir(id).join(INDEX_FILE)
    }

    /// Boundary snapshot
    pub fn boundary_path(&self, id: i64) -> PathBuf {
        self.field_dir(id).join(format!("{id}.geojson"))
    }

    pub fn masked_path(&self, id: i64) -> PathBuf {
        self.field_dir(id).join(MASKED_FILE)
    }

    pub fn preview_file(&self, id: i64) -> PathBuf {
        self.field_dir(id).join(PREVIEW_FILE)
    }

    /// The four files a finished field must have.
    pub fn required(&self, id: i64) -> [PathBuf; 4] {
        [
            self.index_path(id),
            self.boundary_path(id),
            self.masked_path(id),
            self.preview_file(id),
        ]
    }

    /// Required artifacts that are not regular files on disk.
    pub fn missing(&self, id: i64) -> Vec<PathBuf> {
        self.required(id)
            .into_iter()
            .filter(|p| !p.is_file())
            .collect()
    }

    /// The colorized preview, if the field has been processed.
    pub fn preview_path(&self, id: i64) -> Option<PathBuf> {
        let path = self.preview_file(id);
        path.is_file().then_some(path)
    }

    /// Create the field's directory, applying `policy` to a leftover one.
    pub fn prepare(&self, id: i64, policy: ArtifactPolicy) -> Result<PathBuf> {
        let dir = self.field_dir(id);
        if dir.exists() {
            match policy {
                ArtifactPolicy::Fail => {
                    return Err(PipelineError::ArtifactConflict {
                        path: dir,
                        within_run: false,
                    })
                }
                ArtifactPolicy::Replace => {
                    tracing::debug!(path = %dir.display(), "removing stale artifact directory");
                    fs::remove_dir_all(&dir)?;
                }
            }
        }
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Delete the field's directory. Succeeds if it was never created.
    pub fn remove(&self, id: i64) -> io::Result<()> {
        match fs::remove_dir_all(self.field_dir(id)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn paths_are_keyed_by_id() {
        let layout = ArtifactLayout::new("/srv/map_data");
        assert_eq!(layout.index_path(7), PathBuf::from("/srv/map_data/7/NDVI.tif"));
        assert_eq!(layout.boundary_path(7), PathBuf::from("/srv/map_data/7/7.geojson"));
        assert_eq!(layout.masked_path(7), PathBuf::from("/srv/map_data/7/NDVI_masked.tif"));
        assert_eq!(layout.preview_file(7), PathBuf::from("/srv/map_data/7/NDVI_colored.png"));
    }

    #[test]
    fn preview_only_when_present() {
        let tmp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(tmp.path());
        assert!(layout.preview_path(3).is_none());

        fs::create_dir_all(layout.field_dir(3)).unwrap();
        fs::write(layout.preview_file(3), b"png").unwrap();
        assert_eq!(layout.preview_path(3), Some(layout.preview_file(3)));
    }

    #[test]
    fn replace_policy_clears_leftovers() {
        let tmp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(tmp.path());
        fs::create_dir_all(layout.field_dir(1)).unwrap();
        fs::write(layout.index_path(1), b"stale").unwrap();

        layout.prepare(1, ArtifactPolicy::Replace).unwrap();
        assert!(layout.field_dir(1).is_dir());
        assert!(!layout.index_path(1).exists());
    }

    #[test]
    fn fail_policy_leaves_directory_untouched() {
        let tmp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(tmp.path());
        fs::create_dir_all(layout.field_dir(1)).unwrap();
        fs::write(layout.index_path(1), b"stale").unwrap();

        let err = layout.prepare(1, ArtifactPolicy::Fail).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactConflict { within_run: false, .. }));
        assert!(layout.index_path(1).exists());
    }

    #[test]
    fn missing_lists_absent_files() {
        let tmp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(tmp.path());
        layout.prepare(2, ArtifactPolicy::Replace).unwrap();
        fs::write(layout.index_path(2), b"x").unwrap();
        assert_eq!(layout.missing(2).len(), 3);
        layout.remove(2).unwrap();
        layout.remove(2).unwrap();
    }
}
