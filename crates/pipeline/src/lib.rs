//! # ndvimap Pipeline
//!
//! Turns pending field boundaries into NDVI map products.
//!
//! A run searches the catalog for the clearest recent scene over each
//! pending field, downloads the distinct scenes once, extracts them,
//! computes NDVI from the red and near-infrared bands, crops it to each
//! field and marks the field done when its artifacts are on disk:
//!
//! ```text
//! <artifact_dir>/<id>/NDVI.tif
//!                    /<id>.geojson
//!                    /NDVI_masked.tif
//!                    /NDVI_colored.png
//! ```
//!
//! ```ignore
//! use std::sync::Arc;
//! use ndvimap_pipeline::{CdseCatalog, JsonFieldStore, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::from_env()?;
//! let catalog = CdseCatalog::from_config(&config)?;
//! let store = Arc::new(JsonFieldStore::open(&config.fields_file));
//! let report = Pipeline::new(config, Box::new(catalog), store)?.run()?;
//! println!("{report}");
//! ```

pub mod artifacts;
pub mod bands;
pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod index;
pub mod job;
pub mod mask;
pub mod report;
pub mod runner;
pub mod search;
pub mod staging;
pub mod status;
pub mod store;
pub mod work;

pub use artifacts::ArtifactLayout;
pub use catalog::{CdseCatalog, SceneCatalog};
pub use config::{ArtifactPolicy, PipelineConfig};
pub use error::{PipelineError, Result};
pub use job::{CancelToken, JobGate, Submission};
pub use report::RunReport;
pub use runner::Pipeline;
pub use store::{Field, FieldStore, JsonFieldStore, MemoryFieldStore, StoreError};
