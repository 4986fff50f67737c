//! Spectral indices computed from single-band rasters

mod indices;

pub use indices::{ndvi, normalized_difference};
