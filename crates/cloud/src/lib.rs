//! # ndvimap Cloud
//!
//! Scene search and archive download against the Copernicus Data Space
//! OData catalog.
//!
//! Search is anonymous and paginated; results come back ordered by cloud
//! cover. Downloads authenticate with a bearer token exchanged from account
//! credentials and stream archives to disk with retry on transient failures.
//!
//! ## Features
//!
//! - `native` (default): blocking API via a private Tokio runtime

pub mod auth;
pub mod catalog_client;
pub mod error;
pub mod http;
pub mod odata_models;

#[cfg(feature = "native")]
pub mod sync_api;

pub use auth::{BearerToken, Credentials, TokenSource};
pub use catalog_client::{CatalogClient, CatalogClientOptions, CatalogEndpoints};
pub use error::{CloudError, Result};
pub use odata_models::{Scene, SceneQuery};

/// Blocking API re-exported as `blocking` module.
#[cfg(feature = "native")]
pub mod blocking {
    pub use crate::sync_api::*;
}
