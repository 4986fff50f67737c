//! Raster-to-RGBA rendering using color schemes.

use crate::scheme::{evaluate, ColorScheme, Rgb};
use ndvimap_core::raster::{Raster, RasterElement};

/// Parameters for colormap rendering.
#[derive(Debug, Clone)]
pub struct ColormapParams {
    pub scheme: ColorScheme,
    /// Values below this are clamped.
    pub min: f64,
    /// Values above this are clamped.
    pub max: f64,
    /// RGBA used for nodata pixels, fully transparent by default.
    pub nodata_color: [u8; 4],
}

impl ColormapParams {
    /// Params over [0, 1]; use [`auto_params`] to fit the data instead.
    pub fn new(scheme: ColorScheme) -> Self {
        Self::with_range(scheme, 0.0, 1.0)
    }

    pub fn with_range(scheme: ColorScheme, min: f64, max: f64) -> Self {
        Self {
            scheme,
            min,
            max,
            nodata_color: [0, 0, 0, 0],
        }
    }
}

/// Stretch the scheme over the valid (non-nodata, finite) range of `raster`.
///
/// An all-nodata raster gets [0, 1]; a constant one gets [v, v + 1].
pub fn auto_params<T: RasterElement>(raster: &Raster<T>, scheme: ColorScheme) -> ColormapParams {
    let (min, max) = match raster.valid_range() {
        None => (0.0, 1.0),
        Some((lo, hi, _)) if (hi - lo).abs() < f64::EPSILON => (lo, lo + 1.0),
        Some((lo, hi, _)) => (lo, hi),
    };
    ColormapParams::with_range(scheme, min, max)
}

/// Convert a raster to a row-major RGBA buffer of `rows * cols * 4` bytes.
///
/// Nodata and non-finite cells take `params.nodata_color`.
pub fn raster_to_rgba<T: RasterElement>(raster: &Raster<T>, params: &ColormapParams) -> Vec<u8> {
    let range = params.max - params.min;
    let inv_range = if range.abs() > f64::EPSILON {
        1.0 / range
    } else {
        1.0
    };

    let mut rgba = Vec::with_capacity(raster.len() * 4);

    for &val in raster.data().iter() {
        let value = if raster.is_nodata(val) {
            None
        } else {
            val.to_f64().filter(|v| v.is_finite())
        };

        match value {
            Some(v) => {
                let Rgb { r, g, b } = evaluate(params.scheme, (v - params.min) * inv_range);
                rgba.extend_from_slice(&[r, g, b, 255]);
            }
            None => rgba.extend_from_slice(&params.nodata_color),
        }
    }

    rgba
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raster_to_rgba_basic() {
        let mut r = Raster::from_vec(vec![0.0f32, 0.5, 1.0, f32::NAN], 2, 2).unwrap();
        r.set_nodata(Some(f32::NAN));

        let params = ColormapParams::with_range(ColorScheme::Grayscale, 0.0, 1.0);
        let rgba = raster_to_rgba(&r, &params);

        assert_eq!(rgba.len(), 16);
        assert_eq!(&rgba[0..4], &[0, 0, 0, 255]);
        assert_eq!(&rgba[4..8], &[128, 128, 128, 255]);
        assert_eq!(&rgba[8..12], &[255, 255, 255, 255]);
        assert_eq!(&rgba[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn auto_params_range() {
        let mut r = Raster::from_vec(vec![-0.2f32, 0.4, 0.8, f32::NAN], 1, 4).unwrap();
        r.set_nodata(Some(f32::NAN));

        let params = auto_params(&r, ColorScheme::Viridis);
        assert!((params.min - (-0.2f32) as f64).abs() < 1e-9);
        assert!((params.max - 0.8f32 as f64).abs() < 1e-9);
    }

    #[test]
    fn auto_params_all_nodata() {
        let mut r = Raster::filled(1, 2, f32::NAN);
        r.set_nodata(Some(f32::NAN));

        let params = auto_params(&r, ColorScheme::Viridis);
        assert_eq!((params.min, params.max), (0.0, 1.0));
    }

    #[test]
    fn auto_params_constant_raster() {
        let r = Raster::<f64>::filled(2, 2, 42.0);
        let params = auto_params(&r, ColorScheme::Viridis);
        assert_eq!((params.min, params.max), (42.0, 43.0));
    }
}
