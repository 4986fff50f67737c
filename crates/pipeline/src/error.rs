//! Error types for the field pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while processing fields.
///
/// Variants are either fatal for the whole run or scoped to one field or
/// scene; see [`PipelineError::is_fatal`].
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("boundary of field {field_id} encodes to a {length}-character query (limit {max})")]
    BoundaryTooComplex {
        field_id: i64,
        length: usize,
        max: usize,
    },

    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("scene acquisition failed: {0}")]
    AcquisitionFailed(String),

    #[error("extracting {path}: {reason}")]
    ExtractionFailed { path: PathBuf, reason: String },

    #[error("band not found in {scene}: {detail}")]
    BandNotFound { scene: String, detail: String },

    #[error("scene {scene} has {count} granules, only single-granule scenes are supported")]
    MultipleGranulesUnsupported { scene: String, count: usize },

    #[error("boundary of field {field_id} does not intersect the scene: {reason}")]
    BoundaryDoesNotIntersect { field_id: i64, reason: String },

    #[error("field {field_id} is missing artifacts: {missing:?}")]
    IncompleteArtifacts { field_id: i64, missing: Vec<PathBuf> },

    #[error("persisting status of field {field_id}: {reason}")]
    PersistenceFailure { field_id: i64, reason: String },

    #[error("artifact directory {path} already exists")]
    ArtifactConflict {
        path: PathBuf,
        /// Created earlier in this same run, which is a logic error
        within_run: bool,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("raster error: {0}")]
    Raster(#[from] ndvimap_core::Error),

    #[error("field store: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether this error aborts the remaining run.
    ///
    /// Everything else only skips the field (or the fields sharing a scene).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CatalogUnavailable(_)
                | Self::AcquisitionFailed(_)
                | Self::ExtractionFailed { .. }
                | Self::Cancelled
                | Self::Config(_)
                | Self::Store(_)
                | Self::ArtifactConflict {
                    within_run: true,
                    ..
                }
        )
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality() {
        assert!(PipelineError::CatalogUnavailable("down".into()).is_fatal());
        assert!(PipelineError::Cancelled.is_fatal());
        assert!(!PipelineError::BandNotFound {
            scene: "S2A.SAFE".into(),
            detail: "no B04".into()
        }
        .is_fatal());
        assert!(!PipelineError::PersistenceFailure {
            field_id: 1,
            reason: "disk full".into()
        }
        .is_fatal());

        let stale = PipelineError::ArtifactConflict {
            path: PathBuf::from("map_data/7"),
            within_run: false,
        };
        assert!(!stale.is_fatal());
        let duplicate = PipelineError::ArtifactConflict {
            path: PathBuf::from("map_data/7"),
            within_run: true,
        };
        assert!(duplicate.is_fatal());
    }
}
