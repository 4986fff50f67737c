//! Scene selection per field.

use chrono::{DateTime, Utc};
use ndvimap_cloud::odata_models::sort_by_cloud_cover;
use ndvimap_cloud::{CloudError, Scene, SceneQuery};

use crate::catalog::SceneCatalog;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::store::Field;

/// Decimal places of boundary coordinates in catalog queries.
pub const WKT_DECIMALS: usize = 4;

/// Picks the clearest recent scene covering a field.
#[derive(Debug, Clone)]
pub struct CatalogSearcher {
    collection: String,
    product_type: String,
    window_days: u32,
    max_cloud_cover: f64,
}

impl CatalogSearcher {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            collection: config.collection.clone(),
            product_type: config.product_type.clone(),
            window_days: config.date_window_days,
            max_cloud_cover: config.max_cloud_cover,
        }
    }

    /// The catalog query for `field` over the window ending at `now`.
    pub fn query(&self, field: &Field, now: DateTime<Utc>) -> SceneQuery {
        SceneQuery::new(field.boundary.to_wkt(WKT_DECIMALS), now, self.window_days)
            .collection(&self.collection)
            .product_type(&self.product_type)
            .cloud_cover(0.0, self.max_cloud_cover)
    }

    /// Best scene for `field`, or `None` when nothing qualifies.
    ///
    /// A boundary whose query would be too long fails with
    /// [`PipelineError::BoundaryTooComplex`] before the catalog is contacted.
    pub fn search(
        &self,
        catalog: &dyn SceneCatalog,
        field: &Field,
        now: DateTime<Utc>,
    ) -> Result<Option<Scene>> {
        let query = self.query(field, now);
        let max = catalog.max_query_length();
        let length = catalog
            .query_length(&query)
            .map_err(|e| PipelineError::CatalogUnavailable(e.to_string()))?;
        if length > max {
            return Err(PipelineError::BoundaryTooComplex {
                field_id: field.id,
                length,
                max,
            });
        }

        let mut scenes = catalog.search(&query).map_err(|e| match e {
            CloudError::QueryTooLong { length, max } => PipelineError::BoundaryTooComplex {
                field_id: field.id,
                length,
                max,
            },
            other => PipelineError::CatalogUnavailable(other.to_string()),
        })?;
        sort_by_cloud_cover(&mut scenes);

        let best = scenes.into_iter().next();
        match &best {
            Some(scene) => tracing::info!(
                field = field.id,
                scene = %scene.filename,
                cloud_cover = scene.cloud_cover,
                "scene selected"
            ),
            None => tracing::info!(field = field.id, "no qualifying scene"),
        }
        Ok(best)
    }
}
