//! # ndvimap Algorithms
//!
//! Raster algorithms used to turn satellite bands into field products.
//!
//! - **imagery**: normalized difference indices (NDVI)
//! - **vector**: crop and mask a raster to a polygon boundary

pub mod imagery;
pub mod vector;

mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::imagery::{ndvi, normalized_difference};
    pub use crate::vector::mask_to_geometry;
    pub use ndvimap_core::prelude::*;
}
