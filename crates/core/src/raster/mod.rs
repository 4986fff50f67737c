//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;

pub use element::RasterElement;
pub use geotransform::{GeoTransform, PixelWindow};
pub use grid::Raster;
