//! Locating the red and near-infrared band files of an extracted scene.
//!
//! Expected layout:
//!
//! ```text
//! <staging>/<scene>.SAFE/GRANULE/<granule>/IMG_DATA/*_B04.jp2
//!                                                  /*_B08.jp2
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Band file pair for one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandPaths {
    pub red: PathBuf,
    pub nir: PathBuf,
}

/// Finds band files by name suffix.
#[derive(Debug, Clone)]
pub struct BandLocator {
    red_suffix: String,
    nir_suffix: String,
}

impl BandLocator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_suffixes(&config.red_suffix, &config.nir_suffix)
    }

    pub fn with_suffixes(red: &str, nir: &str) -> Self {
        Self {
            red_suffix: red.to_string(),
            nir_suffix: nir.to_string(),
        }
    }

    /// Band files of `scene` (the extracted directory name) under `staging`.
    pub fn locate(&self, staging: &Path, scene: &str) -> Result<BandPaths> {
        let granules = staging.join(scene).join("GRANULE");
        let not_found = |detail: String| PipelineError::BandNotFound {
            scene: scene.to_string(),
            detail,
        };

        let entries = fs::read_dir(&granules)
            .map_err(|e| not_found(format!("{}: {}", granules.display(), e)))?;
        let mut subdirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();

        let granule = match subdirs.len() {
            0 => return Err(not_found(format!("{} has no granule", granules.display()))),
            1 => subdirs.remove(0),
            count => {
                return Err(PipelineError::MultipleGranulesUnsupported {
                    scene: scene.to_string(),
                    count,
                })
            }
        };

        let img_data = granule.join("IMG_DATA");
        let files: Vec<PathBuf> = fs::read_dir(&img_data)
            .map_err(|e| not_found(format!("{}: {}", img_data.display(), e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();

        let red = single_match(&files, &self.red_suffix).map_err(&not_found)?;
        let nir = single_match(&files, &self.nir_suffix).map_err(&not_found)?;
        tracing::debug!(red = %red.display(), nir = %nir.display(), "bands located");
        Ok(BandPaths { red, nir })
    }
}

fn single_match(files: &[PathBuf], suffix: &str) -> std::result::Result<PathBuf, String> {
    let mut hits = files.iter().filter(|p| {
        p.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(suffix))
            .unwrap_or(false)
    });
    match (hits.next(), hits.next()) {
        (Some(hit), None) => Ok(hit.clone()),
        (None, _) => Err(format!("no file ending in {suffix}")),
        (Some(_), Some(_)) => Err(format!("several files end in {suffix}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCENE: &str = "S2B_MSIL1C_20240611T095559_N0510_R122_T33TWM_20240611T115210.SAFE";

    fn scene_with(granules: &[&str], files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for g in granules {
            let img = tmp.path().join(SCENE).join("GRANULE").join(g).join("IMG_DATA");
            fs::create_dir_all(&img).unwrap();
            for f in files {
                fs::write(img.join(f), b"").unwrap();
            }
        }
        tmp
    }

    fn locator() -> BandLocator {
        BandLocator::with_suffixes("B04.jp2", "B08.jp2")
    }

    #[test]
    fn finds_both_bands() {
        let tmp = scene_with(
            &["L1C_T33TWM_A037683_20240611T095553"],
            &["T33TWM_20240611T095559_B04.jp2", "T33TWM_20240611T095559_B08.jp2", "T33TWM_20240611T095559_B8A.jp2"],
        );
        let bands = locator().locate(tmp.path(), SCENE).unwrap();
        assert!(bands.red.ends_with("T33TWM_20240611T095559_B04.jp2"));
        assert!(bands.nir.ends_with("T33TWM_20240611T095559_B08.jp2"));
    }

    #[test]
    fn missing_band_is_reported() {
        let tmp = scene_with(&["L1C_A"], &["T_B04.jp2"]);
        let err = locator().locate(tmp.path(), SCENE).unwrap_err();
        assert!(matches!(err, PipelineError::BandNotFound { .. }));
    }

    #[test]
    fn missing_scene_directory_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = locator().locate(tmp.path(), SCENE).unwrap_err();
        assert!(matches!(err, PipelineError::BandNotFound { .. }));
    }

    #[test]
    fn several_granules_are_rejected() {
        let tmp = scene_with(&["L1C_A", "L1C_B"], &["T_B04.jp2", "T_B08.jp2"]);
        let err = locator().locate(tmp.path(), SCENE).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MultipleGranulesUnsupported { count: 2, .. }
        ));
        assert!(!err.is_fatal());
    }
}
