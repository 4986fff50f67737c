//! Normalized difference indices
//!
//! Bands are read as `f32` and the arithmetic is carried out in `f64`.

use crate::maybe_rayon::*;
use ndarray::Array2;
use ndvimap_core::raster::Raster;
use ndvimap_core::{Error, Result};

/// Compute the normalized difference between two bands:
///
/// `(band_a - band_b) / (band_a + band_b)`
///
/// Where `band_a + band_b == 0` the result is exactly `0.0`, checked
/// before no-data, so zero-filled borders come out as 0 and never NaN.
/// Otherwise a no-data cell in either band yields NaN.
///
/// The output takes transform and CRS from `band_a`, and declares NaN as
/// its no-data value.
pub fn normalized_difference(band_a: &Raster<f32>, band_b: &Raster<f32>) -> Result<Raster<f32>> {
    check_dimensions(band_a, band_b)?;

    let (rows, cols) = band_a.shape();
    let a_data = band_a.data();
    let b_data = band_b.data();

    let data: Vec<f32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0.0f32; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let a = a_data[[row, col]];
                let b = b_data[[row, col]];
                *out = normalized_pixel(a, b, band_a.is_nodata(a) || band_b.is_nodata(b));
            }
            row_data
        })
        .collect();

    let array =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    let mut output = band_a.with_data(array)?;
    output.set_nodata(Some(f32::NAN));
    Ok(output)
}

fn normalized_pixel(a: f32, b: f32, nodata: bool) -> f32 {
    let (a, b) = (a as f64, b as f64);
    let sum = a + b;
    if sum == 0.0 {
        return 0.0;
    }
    if nodata {
        return f32::NAN;
    }
    ((a - b) / sum) as f32
}

/// Normalized Difference Vegetation Index
///
/// `NDVI = (NIR - Red) / (NIR + Red)`
///
/// The result follows the NIR band's georeferencing. Dense vegetation
/// sits around 0.6 to 0.9, bare soil near 0.1, water below 0.
///
/// This is not the plain formula at every pixel. Where either band holds
/// its declared no-data value and `NIR + Red != 0`, the output is NaN
/// instead of the ratio of the raw no-data numbers. Zero sums stay 0
/// regardless. Bands without a declared no-data value follow the formula
/// everywhere.
pub fn ndvi(nir: &Raster<f32>, red: &Raster<f32>) -> Result<Raster<f32>> {
    normalized_difference(nir, red)
}

fn check_dimensions(a: &Raster<f32>, b: &Raster<f32>) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(Error::SizeMismatch {
            er: a.rows(),
            ec: a.cols(),
            ar: b.rows(),
            ac: b.cols(),
        });
    }
    Ok(())
}
