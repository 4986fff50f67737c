//! The imagery catalog as seen by the pipeline.

use std::path::{Path, PathBuf};

use ndvimap_cloud::blocking::CatalogClientBlocking;
use ndvimap_cloud::{CloudError, Credentials, Scene, SceneQuery};

use crate::config::PipelineConfig;

/// Search and bulk download, blocking.
pub trait SceneCatalog: Send {
    /// Encoded length of `query`, checked before it is sent.
    fn query_length(&self, query: &SceneQuery) -> Result<usize, CloudError>;

    /// Longest query the catalog accepts.
    fn max_query_length(&self) -> usize;

    /// Matching scenes, ordered by cloud cover ascending.
    fn search(&self, query: &SceneQuery) -> Result<Vec<Scene>, CloudError>;

    /// Fetch one archive per scene into `dest`.
    fn download(&self, scenes: &[Scene], dest: &Path) -> Result<Vec<PathBuf>, CloudError>;
}

/// Copernicus Data Space catalog.
pub struct CdseCatalog {
    client: CatalogClientBlocking,
    credentials: Option<Credentials>,
}

impl CdseCatalog {
    pub fn new(client: CatalogClientBlocking, credentials: Option<Credentials>) -> Self {
        Self { client, credentials }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, CloudError> {
        let client = CatalogClientBlocking::new(config.endpoints(), config.client_options())?;
        Ok(Self::new(client, config.credentials.clone()))
    }
}

impl SceneCatalog for CdseCatalog {
    fn query_length(&self, query: &SceneQuery) -> Result<usize, CloudError> {
        self.client.query_length(query)
    }

    fn max_query_length(&self) -> usize {
        self.client.max_query_length()
    }

    fn search(&self, query: &SceneQuery) -> Result<Vec<Scene>, CloudError> {
        self.client.search(query)
    }

    fn download(&self, scenes: &[Scene], dest: &Path) -> Result<Vec<PathBuf>, CloudError> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            CloudError::Auth("downloads need NDVIMAP_USERNAME and NDVIMAP_PASSWORD".into())
        })?;
        self.client.download_all(scenes, dest, credentials)
    }
}
