//! Marking fields done.

use crate::artifacts::ArtifactLayout;
use crate::error::{PipelineError, Result};
use crate::store::FieldStore;

/// Flips a field to done once its artifact bundle is complete.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    layout: ArtifactLayout,
}

impl StatusTracker {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }

    /// Mark `field_id` done in `store`.
    ///
    /// Refuses with [`PipelineError::IncompleteArtifacts`] while any of the
    /// four artifacts is missing. Store failures surface as
    /// [`PipelineError::PersistenceFailure`].
    pub fn mark_done(&self, store: &dyn FieldStore, field_id: i64) -> Result<()> {
        let missing = self.layout.missing(field_id);
        if !missing.is_empty() {
            return Err(PipelineError::IncompleteArtifacts { field_id, missing });
        }

        store
            .mark_field_done(field_id)
            .map_err(|e| PipelineError::PersistenceFailure {
                field_id,
                reason: e.to_string(),
            })?;
        tracing::info!(field = field_id, "field done");
        Ok(())
    }
}
