//! Raster file I/O
//!
//! Without the `gdal` feature only (Geo)TIFF is readable. With it, any
//! GDAL-supported format including JPEG2000.

#[cfg(feature = "gdal")]
mod gdal_io;
mod native;

#[cfg(feature = "gdal")]
pub use gdal_io::{read_geotiff, write_geotiff, GeoTiffOptions};

#[cfg(not(feature = "gdal"))]
pub use native::{read_geotiff, write_geotiff, GeoTiffOptions};

pub use native::{read_geotiff_from_buffer, write_geotiff_to_buffer};
