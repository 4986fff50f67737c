//! Raster operations driven by vector geometry

mod mask;

pub use mask::mask_to_geometry;
