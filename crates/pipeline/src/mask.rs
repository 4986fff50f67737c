//! Cropping the index raster to a field and rendering its preview.

use std::fs;

use ndvimap_algorithms::vector::mask_to_geometry;
use ndvimap_colormap::{render_png, ColorScheme};
use ndvimap_core::crs::reproject_geometry;
use ndvimap_core::io::write_geotiff;
use ndvimap_core::{Boundary, Error as CoreError, Raster, CRS};

use crate::artifacts::ArtifactLayout;
use crate::error::{PipelineError, Result};

/// Writes the boundary snapshot, the masked raster and the PNG preview.
#[derive(Debug, Clone)]
pub struct BoundaryMasker {
    layout: ArtifactLayout,
    scheme: ColorScheme,
}

impl BoundaryMasker {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self {
            layout,
            scheme: ColorScheme::Viridis,
        }
    }

    pub fn with_scheme(mut self, scheme: ColorScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Crop `index` to `boundary` and write the remaining field artifacts.
    ///
    /// Reprojection or crop failures come back as
    /// [`PipelineError::BoundaryDoesNotIntersect`].
    pub fn mask(&self, field_id: i64, boundary: &Boundary, index: &Raster<f32>) -> Result<Raster<f32>> {
        fs::write(self.layout.boundary_path(field_id), boundary.to_geojson_string()?)?;

        let no_intersection = |reason: String| PipelineError::BoundaryDoesNotIntersect { field_id, reason };

        let target = index
            .crs()
            .cloned()
            .ok_or_else(|| no_intersection(CoreError::MissingCrs.to_string()))?;
        let geometry = reproject_geometry(boundary.geometry(), &CRS::wgs84(), &target)
            .map_err(|e| no_intersection(e.to_string()))?;

        let masked = mask_to_geometry(index, &geometry).map_err(|e| match e {
            CoreError::NoOverlap => no_intersection("boundary lies outside the scene".into()),
            other => no_intersection(other.to_string()),
        })?;

        let masked_path = self.layout.masked_path(field_id);
        write_geotiff(&masked, &masked_path, None)?;

        let preview = self.layout.preview_file(field_id);
        render_png(&masked, self.scheme, &preview)?;

        tracing::info!(
            field = field_id,
            rows = masked.rows(),
            cols = masked.cols(),
            preview = %preview.display(),
            "field masked"
        );
        Ok(masked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArtifactPolicy;
    use ndvimap_core::GeoTransform;
    use tempfile::TempDir;

    /// 4x4 WGS84 raster over lon 10..14, lat 46..50.
    fn index() -> Raster<f32> {
        let mut r = Raster::from_vec((0..16).map(|v| v as f32 / 16.0).collect(), 4, 4).unwrap();
        r.set_transform(GeoTransform::new(10.0, 50.0, 1.0, -1.0));
        r.set_crs(Some(CRS::wgs84()));
        r.set_nodata(Some(f32::NAN));
        r
    }

    fn boundary(coords: &str) -> Boundary {
        format!(r#"{{"type":"Polygon","coordinates":[{coords}]}}"#)
            .parse()
            .unwrap()
    }

    #[test]
    fn writes_masked_raster_and_preview() {
        let tmp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(tmp.path());
        layout.prepare(9, ArtifactPolicy::Replace).unwrap();

        let field = boundary("[[11.0,47.0],[13.0,47.0],[13.0,49.0],[11.0,49.0],[11.0,47.0]]");
        let masked = BoundaryMasker::new(layout.clone()).mask(9, &field, &index()).unwrap();

        assert_eq!(masked.shape(), (2, 2));
        assert!(layout.boundary_path(9).is_file());
        assert!(layout.masked_path(9).is_file());
        assert!(layout.preview_file(9).is_file());

        let snapshot: Boundary = fs::read_to_string(layout.boundary_path(9)).unwrap().parse().unwrap();
        assert_eq!(snapshot, field);
    }

    #[test]
    fn boundary_outside_raster_does_not_intersect() {
        let tmp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(tmp.path());
        layout.prepare(3, ArtifactPolicy::Replace).unwrap();

        let far = boundary("[[-60.0,-30.0],[-59.0,-30.0],[-59.0,-29.0],[-60.0,-30.0]]");
        let err = BoundaryMasker::new(layout.clone()).mask(3, &far, &index()).unwrap_err();

        assert!(matches!(err, PipelineError::BoundaryDoesNotIntersect { field_id: 3, .. }));
        assert!(!layout.masked_path(3).exists());
        assert!(!layout.preview_file(3).exists());
    }

    #[test]
    fn raster_without_crs_does_not_intersect() {
        let tmp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(tmp.path());
        layout.prepare(4, ArtifactPolicy::Replace).unwrap();

        let mut bare = index();
        bare.set_crs(None);
        let field = boundary("[[11.0,47.0],[13.0,47.0],[13.0,49.0],[11.0,47.0]]");
        let err = BoundaryMasker::new(layout).mask(4, &field, &bare).unwrap_err();
        assert!(matches!(err, PipelineError::BoundaryDoesNotIntersect { .. }));
    }
}
