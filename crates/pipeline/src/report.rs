//! Outcome of a pipeline run.

use std::fmt;

use serde::Serialize;

/// What happened to each pending field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// Fields pending when the run started
    pub pending: usize,
    /// Distinct scenes downloaded
    pub scenes_downloaded: usize,
    /// Fields marked done
    pub completed: Vec<i64>,
    /// Fields left pending, with the reason
    pub skipped: Vec<(i64, String)>,
}

impl RunReport {
    pub fn skip(&mut self, field_id: i64, reason: impl Into<String>) {
        self.skipped.push((field_id, reason.into()));
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pending, {} scenes downloaded, {} completed, {} skipped",
            self.pending,
            self.scenes_downloaded,
            self.completed.len(),
            self.skipped.len()
        )
    }
}
