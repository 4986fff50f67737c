//! Error types for the catalog client.

use thiserror::Error;

/// Errors produced while searching or downloading from the catalog.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("query is {length} characters, catalog accepts at most {max}")]
    QueryTooLong { length: usize, max: usize },

    #[error("invalid catalog response: {0}")]
    Parse(String),

    #[error("download of {product} failed: {reason}")]
    Download { product: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for catalog operations.
pub type Result<T> = std::result::Result<T, CloudError>;
