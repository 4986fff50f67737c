//! Blocking (synchronous) API for native platforms.
//!
//! Wraps the async [`CatalogClient`] with a Tokio runtime so callers don't
//! need to manage their own async runtime.

use std::path::{Path, PathBuf};

use crate::auth::Credentials;
use crate::catalog_client::{CatalogClient, CatalogClientOptions, CatalogEndpoints};
use crate::error::{CloudError, Result};
use crate::odata_models::{Scene, SceneQuery};

/// Blocking wrapper around [`CatalogClient`].
///
/// Uses an internal single-threaded Tokio runtime.
pub struct CatalogClientBlocking {
    rt: tokio::runtime::Runtime,
    inner: CatalogClient,
}

impl CatalogClientBlocking {
    pub fn new(endpoints: CatalogEndpoints, options: CatalogClientOptions) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CloudError::Network(e.to_string()))?;

        let inner = CatalogClient::new(endpoints, options)?;
        Ok(Self { rt, inner })
    }

    pub fn client(&self) -> &CatalogClient {
        &self.inner
    }

    /// Encoded query length (no request is made).
    pub fn query_length(&self, query: &SceneQuery) -> Result<usize> {
        self.inner.query_length(query)
    }

    pub fn max_query_length(&self) -> usize {
        self.inner.options().max_query_length
    }

    /// Search with pagination (blocking).
    pub fn search(&self, query: &SceneQuery) -> Result<Vec<Scene>> {
        self.rt.block_on(self.inner.search(query))
    }

    /// Download scene archives into `dest_dir` (blocking).
    pub fn download_all(
        &self,
        scenes: &[Scene],
        dest_dir: &Path,
        credentials: &Credentials,
    ) -> Result<Vec<PathBuf>> {
        self.rt
            .block_on(self.inner.download_all(scenes, dest_dir, credentials))
    }
}
