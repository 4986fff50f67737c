//! OpenID Connect password-grant tokens for product downloads.
//!
//! Credentials come from explicit values or the environment:
//! - `NDVIMAP_USERNAME`
//! - `NDVIMAP_PASSWORD`
//!
//! Tokens are exchanged at the identity endpoint and sent as
//! `Authorization: Bearer <token>`. Identity servers issue short-lived
//! tokens (about ten minutes on CDSE), so a [`TokenSource`] hands out the
//! cached one and exchanges the credentials again shortly before expiry.

use std::fmt;
use std::time::{Duration, Instant};

use futures::lock::Mutex;
use serde::Deserialize;

use crate::auth::CloudAuth;
use crate::error::{CloudError, Result};

/// Tokens closer than this to expiry are replaced before a new download.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Public OIDC client id used by the Copernicus Data Space identity server.
pub const DEFAULT_CLIENT_ID: &str = "cdse-public";

/// Account credentials for the identity endpoint.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
    pub client_id: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }

    /// Load credentials from `NDVIMAP_USERNAME` / `NDVIMAP_PASSWORD`.
    pub fn from_env() -> Result<Self> {
        let username = std::env::var("NDVIMAP_USERNAME")
            .map_err(|_| CloudError::Auth("NDVIMAP_USERNAME not set".into()))?;
        let password = std::env::var("NDVIMAP_PASSWORD")
            .map_err(|_| CloudError::Auth("NDVIMAP_PASSWORD not set".into()))?;
        Ok(Self::new(username, password))
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Exchange the credentials for an access token.
    pub async fn fetch_token(&self, client: &reqwest::Client, token_url: &str) -> Result<BearerToken> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "password"),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];

        let resp = client
            .post(token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CloudError::Auth(format!("token request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Auth(format!(
                "token endpoint returned HTTP {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| CloudError::Auth(format!("parsing token response: {e}")))?;

        Ok(BearerToken {
            access_token: body.access_token,
            expires_at: body
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// A bearer access token.
#[derive(Clone)]
pub struct BearerToken {
    access_token: String,
    expires_at: Option<Instant>,
}

impl BearerToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::ZERO)
    }

    /// Whether the token expires in less than `margin` from now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at.map_or(false, |t| Instant::now() + margin >= t)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl CloudAuth for BearerToken {
    fn sign_request(
        &self,
        _url: &str,
        _method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()> {
        if self.is_expired() {
            return Err(CloudError::Auth("access token expired".into()));
        }
        headers.push((
            "Authorization".to_string(),
            format!("Bearer {}", self.access_token),
        ));
        Ok(())
    }
}

/// Cached access token for one account, refreshed on demand.
pub struct TokenSource {
    credentials: Credentials,
    token_url: String,
    margin: Duration,
    cached: Mutex<Option<BearerToken>>,
}

impl TokenSource {
    pub fn new(credentials: Credentials, token_url: impl Into<String>) -> Self {
        Self {
            credentials,
            token_url: token_url.into(),
            margin: DEFAULT_REFRESH_MARGIN,
            cached: Mutex::new(None),
        }
    }

    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    /// A token valid for at least the refresh margin.
    ///
    /// Concurrent callers share one exchange: the lock is held while a new
    /// token is fetched.
    pub async fn token(&self, client: &reqwest::Client) -> Result<BearerToken> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| !t.expires_within(self.margin)) {
            return Ok(token.clone());
        }
        if cached.is_some() {
            tracing::debug!(user = %self.credentials.username, "access token near expiry, refreshing");
        }
        let fresh = self.credentials.fetch_token(client, &self.token_url).await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSource")
            .field("credentials", &self.credentials)
            .field("token_url", &self.token_url)
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header() {
        let token = BearerToken::new("abc");
        let mut headers = Vec::new();
        token.sign_request("https://x", "GET", &mut headers).unwrap();
        assert_eq!(headers, vec![("Authorization".into(), "Bearer abc".into())]);
    }

    #[test]
    fn expired_token_refuses_to_sign() {
        let token = BearerToken {
            access_token: "abc".into(),
            expires_at: Some(Instant::now() - Duration::from_secs(1)),
        };
        let mut headers = Vec::new();
        assert!(matches!(
            token.sign_request("https://x", "GET", &mut headers),
            Err(CloudError::Auth(_))
        ));
        assert!(headers.is_empty());
    }

    #[test]
    fn expiry_margin() {
        let token = BearerToken {
            access_token: "abc".into(),
            expires_at: Some(Instant::now() + Duration::from_secs(30)),
        };
        assert!(!token.is_expired());
        assert!(token.expires_within(Duration::from_secs(60)));
        assert!(!token.expires_within(Duration::from_secs(5)));
        assert!(!BearerToken::new("abc").expires_within(Duration::from_secs(3600)));
    }

    #[test]
    fn debug_hides_secrets() {
        let creds = Credentials::new("farmer", "hunter2");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("farmer"));
        assert!(!printed.contains("hunter2"));
        assert!(!format!("{:?}", BearerToken::new("secret-token")).contains("secret-token"));
    }
}
