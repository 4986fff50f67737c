//! NDVI computation for one field.

use std::collections::HashSet;
use std::path::PathBuf;

use ndvimap_algorithms::imagery::ndvi;
use ndvimap_core::io::{read_geotiff, write_geotiff};
use ndvimap_core::Raster;

use crate::artifacts::ArtifactLayout;
use crate::bands::BandPaths;
use crate::config::ArtifactPolicy;
use crate::error::{PipelineError, Result};

/// Reads a band pair, computes NDVI and writes the full-extent raster into
/// the field's artifact directory.
#[derive(Debug)]
pub struct IndexComputer {
    layout: ArtifactLayout,
    policy: ArtifactPolicy,
    /// Field directories created during this run
    created: HashSet<i64>,
}

impl IndexComputer {
    pub fn new(layout: ArtifactLayout, policy: ArtifactPolicy) -> Self {
        Self {
            layout,
            policy,
            created: HashSet::new(),
        }
    }

    /// Compute NDVI for `field_id` from `bands`.
    ///
    /// Creates the artifact directory first. Doing so twice for one field in
    /// the same run is a fatal [`PipelineError::ArtifactConflict`].
    pub fn compute(&mut self, field_id: i64, bands: &BandPaths) -> Result<(Raster<f32>, PathBuf)> {
        if !self.created.insert(field_id) {
            return Err(PipelineError::ArtifactConflict {
                path: self.layout.field_dir(field_id),
                within_run: true,
            });
        }
        self.layout.prepare(field_id, self.policy)?;

        let red: Raster<f32> = read_geotiff(&bands.red, None)?;
        let nir: Raster<f32> = read_geotiff(&bands.nir, None)?;
        let index = ndvi(&nir, &red)?;

        let path = self.layout.index_path(field_id);
        write_geotiff(&index, &path, None)?;
        tracing::info!(
            field = field_id,
            rows = index.rows(),
            cols = index.cols(),
            path = %path.display(),
            "NDVI written"
        );
        Ok((index, path))
    }
}
