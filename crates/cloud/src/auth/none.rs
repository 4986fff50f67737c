//! No-op authentication for anonymous catalog search.

use crate::auth::CloudAuth;
use crate::error::Result;

/// No authentication. Product search on the catalog is public.
pub struct NoAuth;

impl CloudAuth for NoAuth {
    fn sign_request(
        &self,
        _url: &str,
        _method: &str,
        _headers: &mut Vec<(String, String)>,
    ) -> Result<()> {
        Ok(())
    }
}
