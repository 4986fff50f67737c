//! Crop a raster to a polygon and blank everything outside it.

use geo::{BoundingRect, Contains};
use geo_types::{MultiPolygon, Point};
use ndvimap_core::raster::{Raster, RasterElement};
use ndvimap_core::{Error, Result};

/// Crop `raster` to the extent of `geometry` and set cells whose centers
/// fall outside it to no-data.
///
/// `geometry` must already be in the raster's CRS. The crop window covers
/// every pixel touched by the geometry's bounding box (offsets floored, far
/// edges ceiled) intersected with the raster. The output keeps the CRS,
/// uses the shifted transform, and declares the raster's no-data value or
/// the type default when it has none.
///
/// Returns [`Error::NoOverlap`] when the bounding box misses the raster.
pub fn mask_to_geometry<T: RasterElement>(
    raster: &Raster<T>,
    geometry: &MultiPolygon<f64>,
) -> Result<Raster<T>> {
    let rect = geometry
        .bounding_rect()
        .ok_or_else(|| Error::InvalidGeometry("empty geometry".into()))?;
    let bounds = (rect.min().x, rect.min().y, rect.max().x, rect.max().y);

    let window = raster
        .transform()
        .window_for_bounds(bounds, raster.cols(), raster.rows())
        .ok_or(Error::NoOverlap)?;

    let mut cropped = raster.window(window)?;
    let nodata = raster.nodata().unwrap_or_else(T::default_nodata);
    let transform = *cropped.transform();

    for ((row, col), cell) in cropped.data_mut().indexed_iter_mut() {
        let (x, y) = transform.pixel_to_geo(col, row);
        if !geometry.contains(&Point::new(x, y)) {
            *cell = nodata;
        }
    }

    cropped.set_nodata(Some(nodata));
    Ok(cropped)
}
