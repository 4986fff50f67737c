//! PNG preview output

use crate::render::{auto_params, raster_to_rgba};
use crate::scheme::ColorScheme;
use image::{ColorType, ImageFormat};
use ndvimap_core::raster::{Raster, RasterElement};
use ndvimap_core::{Error, Result};
use std::path::Path;

/// Write an RGBA buffer as PNG.
pub fn write_png<P: AsRef<Path>>(rgba: &[u8], width: usize, height: usize, path: P) -> Result<()> {
    if rgba.len() != width * height * 4 || width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    let (w, h) = (
        u32::try_from(width).map_err(|e| Error::Encode(e.to_string()))?,
        u32::try_from(height).map_err(|e| Error::Encode(e.to_string()))?,
    );

    image::save_buffer_with_format(path.as_ref(), rgba, w, h, ColorType::Rgba8, ImageFormat::Png)
        .map_err(|e| Error::Encode(format!("PNG {}: {}", path.as_ref().display(), e)))
}

/// Render `raster` with `scheme`, auto-scaled to its valid range, into a PNG.
pub fn render_png<T, P>(raster: &Raster<T>, scheme: ColorScheme, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let params = auto_params(raster, scheme);
    let rgba = raster_to_rgba(raster, &params);
    write_png(&rgba, raster.cols(), raster.rows(), path)
}
