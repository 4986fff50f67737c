//! The end-to-end field run.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::artifacts::ArtifactLayout;
use crate::bands::BandLocator;
use crate::catalog::SceneCatalog;
use crate::config::PipelineConfig;
use crate::download::DownloadOrchestrator;
use crate::error::{PipelineError, Result};
use crate::extract::ArchiveExtractor;
use crate::index::IndexComputer;
use crate::job::CancelToken;
use crate::mask::BoundaryMasker;
use crate::report::RunReport;
use crate::search::CatalogSearcher;
use crate::staging::StagingArea;
use crate::status::StatusTracker;
use crate::store::FieldStore;
use crate::work::{WorkItem, WorkSet};

/// One configured pipeline: catalog, field store and settings.
///
/// [`run`](Self::run) processes every pending field once. It is not
/// re-entrant; use [`JobGate`](crate::JobGate) to serialize runs.
pub struct Pipeline {
    config: PipelineConfig,
    catalog: Box<dyn SceneCatalog>,
    store: Arc<dyn FieldStore>,
    cancel: CancelToken,
    clock: fn() -> DateTime<Utc>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        catalog: Box<dyn SceneCatalog>,
        store: Arc<dyn FieldStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            catalog,
            store,
            cancel: CancelToken::new(),
            clock: Utc::now,
        })
    }

    /// Fix "now" for the catalog date window.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token checked between stages and between fields.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Process all pending fields.
    ///
    /// Per-field failures are recorded in the report and the run moves on.
    /// Fatal ones (catalog down, failed download or extraction, cancellation)
    /// abort the run. Staging is emptied on every exit path.
    pub fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::default();

        let pending = self.store.list_pending_fields()?;
        report.pending = pending.len();
        tracing::info!(pending = pending.len(), "run started");
        if pending.is_empty() {
            return Ok(report);
        }

        let staging = StagingArea::acquire(&self.config.staging_dir)?;

        // Scene selection
        let searcher = CatalogSearcher::new(&self.config);
        let now = (self.clock)();
        let mut work = WorkSet::new();
        for field in pending {
            self.cancel.check()?;
            match searcher.search(self.catalog.as_ref(), &field, now) {
                Ok(Some(scene)) => work.insert(WorkItem {
                    field_id: field.id,
                    scene,
                    boundary: field.boundary,
                }),
                Ok(None) => report.skip(field.id, "no qualifying scene"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(field = field.id, error = %e, "field skipped");
                    report.skip(field.id, e.to_string());
                }
            }
        }

        if work.is_empty() {
            tracing::info!("no field has a scene, nothing to process");
            staging.release();
            return Ok(report);
        }

        // Acquisition
        self.cancel.check()?;
        let scenes = work.download_set();
        DownloadOrchestrator::new(staging.path()).acquire(self.catalog.as_ref(), &scenes)?;
        report.scenes_downloaded = scenes.len();

        self.cancel.check()?;
        ArchiveExtractor::new().extract_all(staging.path())?;

        // Per-field products
        let layout = ArtifactLayout::new(&self.config.artifact_dir);
        let locator = BandLocator::new(&self.config);
        let mut indexer = IndexComputer::new(layout.clone(), self.config.artifact_policy);
        let masker = BoundaryMasker::new(layout.clone());
        let tracker = StatusTracker::new(layout);

        for item in work.items() {
            self.cancel.check()?;
            let outcome = self.process(item, &staging, &locator, &mut indexer, &masker, &tracker);
            match outcome {
                Ok(()) => report.completed.push(item.field_id),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e @ PipelineError::PersistenceFailure { .. }) => {
                    tracing::error!(field = item.field_id, error = %e, "status not saved");
                    report.skip(item.field_id, e.to_string());
                }
                Err(e) => {
                    tracing::warn!(field = item.field_id, scene = %item.scene.filename, error = %e, "field skipped");
                    report.skip(item.field_id, e.to_string());
                }
            }
        }

        staging.release();
        tracing::info!(%report, "run finished");
        Ok(report)
    }

    fn process(
        &self,
        item: &WorkItem,
        staging: &StagingArea,
        locator: &BandLocator,
        indexer: &mut IndexComputer,
        masker: &BoundaryMasker,
        tracker: &StatusTracker,
    ) -> Result<()> {
        let bands = locator.locate(staging.path(), &item.scene.filename)?;
        let (index, _) = indexer.compute(item.field_id, &bands)?;
        masker.mask(item.field_id, &item.boundary, &index)?;
        tracker.mark_done(self.store.as_ref(), item.field_id)
    }
}
