//! Request signing for catalog endpoints.

mod none;
pub mod token;

pub use none::NoAuth;
pub use token::{BearerToken, Credentials, TokenSource};

use crate::error::Result;

/// Trait for signing HTTP requests to the catalog.
///
/// Implementations push authentication headers for `url` onto `headers`
/// before the request is sent. Signing happens again on every redirect hop.
pub trait CloudAuth: Send + Sync {
    fn sign_request(
        &self,
        url: &str,
        method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()>;
}
