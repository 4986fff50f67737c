//! # ndvimap Colormap
//!
//! Color mapping and PNG preview rendering for index rasters.
//!
//! ```ignore
//! use ndvimap_colormap::{render_png, ColorScheme};
//!
//! render_png(&masked, ColorScheme::Viridis, "NDVI_colored.png")?;
//! ```

mod png;
mod render;
mod scheme;

pub use png::{render_png, write_png};
pub use render::{auto_params, raster_to_rgba, ColormapParams};
pub use scheme::{evaluate, ColorScheme, ColorStop, Rgb};
