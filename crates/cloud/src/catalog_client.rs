//! Async client for the Copernicus Data Space OData product catalog.
//!
//! Search is anonymous; downloads need a bearer token obtained from account
//! [`Credentials`]. The token is checked before every archive and exchanged
//! again when it is about to expire.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::auth::token::DEFAULT_REFRESH_MARGIN;
use crate::auth::{Credentials, NoAuth, TokenSource};
use crate::error::{CloudError, Result};
use crate::http::HttpClient;
use crate::odata_models::{sort_by_cloud_cover, ProductPage, Scene, SceneQuery};

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// Catalog, download and identity URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEndpoints {
    /// `Products` collection URL used for search
    pub search_url: String,
    /// `Products` collection URL on the download host
    pub download_url: String,
    /// OpenID Connect token endpoint
    pub token_url: String,
}

impl Default for CatalogEndpoints {
    fn default() -> Self {
        Self {
            search_url: "https://catalogue.dataspace.copernicus.eu/odata/v1/Products".to_string(),
            download_url: "https://zipper.dataspace.copernicus.eu/odata/v1/Products".to_string(),
            token_url: "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token"
                .to_string(),
        }
    }
}

impl CatalogEndpoints {
    /// URL streaming the archive of product `id`.
    pub fn product_value_url(&self, id: &str) -> String {
        format!("{}({})/$value", self.download_url.trim_end_matches('/'), id)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`CatalogClient`].
#[derive(Debug, Clone)]
pub struct CatalogClientOptions {
    /// Per-request timeout for search (default 30 s).
    pub request_timeout: Duration,
    /// Per-request timeout for archive downloads (default 1 h).
    pub download_timeout: Duration,
    /// Maximum retries on transient failures (default 3).
    pub max_retries: u32,
    /// Longest encoded query string the catalog accepts (default 3938).
    pub max_query_length: usize,
    /// Products requested per page (default 100).
    pub page_size: usize,
    /// Maximum total products fetched across pages (default 1000).
    pub max_items: usize,
    /// Archives downloaded at the same time (default 2).
    pub download_concurrency: usize,
    /// Remaining token lifetime below which a new token is fetched before
    /// starting a download (default 60 s).
    pub token_refresh_margin: Duration,
}

impl Default for CatalogClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(3600),
            max_retries: 3,
            max_query_length: 3938,
            page_size: 100,
            max_items: 1000,
            download_concurrency: 2,
            token_refresh_margin: DEFAULT_REFRESH_MARGIN,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async catalog client.
pub struct CatalogClient {
    endpoints: CatalogEndpoints,
    http: HttpClient,
    options: CatalogClientOptions,
}

impl CatalogClient {
    pub fn new(endpoints: CatalogEndpoints, options: CatalogClientOptions) -> Result<Self> {
        let http = HttpClient::new(
            options.request_timeout,
            options.download_timeout,
            options.max_retries,
        )?;
        Ok(Self {
            endpoints,
            http,
            options,
        })
    }

    pub fn endpoints(&self) -> &CatalogEndpoints {
        &self.endpoints
    }

    pub fn options(&self) -> &CatalogClientOptions {
        &self.options
    }

    // ── Query construction ──────────────────────────────────────────

    /// Query parameters sent with the first search page.
    pub fn query_params(&self, query: &SceneQuery) -> Vec<(&'static str, String)> {
        vec![
            ("$filter", query.filter()),
            ("$expand", "Attributes".to_string()),
            ("$top", self.options.page_size.to_string()),
        ]
    }

    /// Fully encoded search URL.
    pub fn query_url(&self, query: &SceneQuery) -> Result<reqwest::Url> {
        reqwest::Url::parse_with_params(&self.endpoints.search_url, self.query_params(query))
            .map_err(|e| CloudError::Parse(format!("invalid search URL: {e}")))
    }

    /// Length of the encoded query string, as the server will see it.
    pub fn query_length(&self, query: &SceneQuery) -> Result<usize> {
        let url = self.query_url(query)?;
        Ok(url.query().map_or(0, str::len))
    }

    // ── Search ──────────────────────────────────────────────────────

    /// Fetch one page of products.
    pub async fn search_page(&self, query: &SceneQuery) -> Result<ProductPage> {
        let url = self.checked_url(query)?;
        self.http.get_json(url.as_str(), &NoAuth).await
    }

    /// Search with automatic pagination, returning scenes ordered by cloud
    /// cover ascending.
    ///
    /// Fails with [`CloudError::QueryTooLong`] before any request is made if
    /// the encoded query exceeds `max_query_length`.
    pub async fn search(&self, query: &SceneQuery) -> Result<Vec<Scene>> {
        let url = self.checked_url(query)?;
        let max = self.options.max_items;

        let mut scenes = Vec::new();
        let mut next = Some(url.to_string());

        while let Some(link) = next.take() {
            let page: ProductPage = self.http.get_json(&link, &NoAuth).await?;
            if page.is_empty() {
                break;
            }
            next = page.next_link;

            for product in page.value {
                let name = product.name.clone();
                match Scene::try_from(product) {
                    Ok(scene) => scenes.push(scene),
                    Err(reason) => tracing::warn!(product = %name, %reason, "skipping product"),
                }
            }

            if scenes.len() >= max {
                tracing::debug!(max, "item limit reached, not following further pages");
                break;
            }
        }

        scenes.truncate(max);
        sort_by_cloud_cover(&mut scenes);
        tracing::info!(count = scenes.len(), "catalog search finished");
        Ok(scenes)
    }

    // ── Download ────────────────────────────────────────────────────

    /// Download the archive of every scene into `dest_dir`.
    ///
    /// Every archive starts with a token that has at least
    /// `token_refresh_margin` left, so long batches outlive a single token.
    /// Returns archive paths in the
    /// order of `scenes`. The first failing product aborts the batch with
    /// [`CloudError::Download`].
    pub async fn download_all(
        &self,
        scenes: &[Scene],
        dest_dir: &Path,
        credentials: &Credentials,
    ) -> Result<Vec<PathBuf>> {
        if scenes.is_empty() {
            return Ok(Vec::new());
        }
        tokio::fs::create_dir_all(dest_dir).await?;

        let tokens = TokenSource::new(credentials.clone(), self.endpoints.token_url.as_str())
            .with_margin(self.options.token_refresh_margin);
        let tokens = &tokens;

        stream::iter(scenes)
            .map(|scene| async move {
                let token = tokens.token(self.http.inner()).await?;
                let url = self.endpoints.product_value_url(&scene.scene_id);
                let dest = dest_dir.join(scene.archive_name());
                tracing::info!(scene = %scene.filename, "downloading");

                match self.http.download_to_file(&url, &dest, &token).await {
                    Ok(bytes) => {
                        tracing::info!(scene = %scene.filename, bytes, "downloaded");
                        Ok(dest)
                    }
                    Err(CloudError::Auth(reason)) => Err(CloudError::Auth(reason)),
                    Err(e) => Err(CloudError::Download {
                        product: scene.filename.clone(),
                        reason: e.to_string(),
                    }),
                }
            })
            .buffered(self.options.download_concurrency.max(1))
            .try_collect()
            .await
    }

    // ── Private helpers ─────────────────────────────────────────────

    fn checked_url(&self, query: &SceneQuery) -> Result<reqwest::Url> {
        let url = self.query_url(query)?;
        let length = url.query().map_or(0, str::len);
        if length > self.options.max_query_length {
            return Err(CloudError::QueryTooLong {
                length,
                max: self.options.max_query_length,
            });
        }
        Ok(url)
    }
}
