//! Scratch space for one run.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Removes everything under a staging directory.
///
/// Failures are logged and never returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct StagingCleaner;

impl StagingCleaner {
    /// Delete every entry under `dir`, returning how many were removed.
    pub fn clean(dir: &Path) -> usize {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::error!(dir = %dir.display(), error = %e, "cannot list staging");
                }
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    tracing::error!(error = %e, "cannot read staging entry");
                    continue;
                }
            };
            let result = if path.is_dir() && !path.is_symlink() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => tracing::error!(path = %path.display(), error = %e, "failed to remove"),
            }
        }
        tracing::debug!(dir = %dir.display(), removed, "staging cleaned");
        removed
    }
}

/// Staging directory held for the duration of a run.
///
/// Contents are removed on [`release`](Self::release) or, if the run bails
/// out early, when the guard is dropped.
#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
    released: bool,
}

impl StagingArea {
    /// Create `dir` if needed and clear anything a crashed run left in it.
    pub fn acquire(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let stale = StagingCleaner::clean(&dir);
        if stale > 0 {
            tracing::warn!(dir = %dir.display(), stale, "removed leftovers from an earlier run");
        }
        Ok(Self {
            dir,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Clean up now.
    pub fn release(mut self) -> usize {
        self.released = true;
        StagingCleaner::clean(&self.dir)
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(dir = %self.dir.display(), "run ended early, cleaning staging");
            StagingCleaner::clean(&self.dir);
        }
    }
}
