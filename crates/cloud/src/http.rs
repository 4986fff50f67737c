//! HTTP client wrapper with retry logic and streaming downloads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::LOCATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use crate::auth::CloudAuth;
use crate::error::{CloudError, Result};

const MAX_REDIRECTS: usize = 5;

/// HTTP client for catalog queries and product downloads.
pub struct HttpClient {
    client: Client,
    /// Redirects are followed by hand so the auth header survives host changes
    download_client: Client,
    max_retries: u32,
    retry_base: Duration,
}

impl HttpClient {
    /// Create a new HTTP client.
    ///
    /// `request_timeout` bounds JSON requests; downloads are bounded by
    /// `download_timeout` since product archives run to hundreds of MB.
    pub fn new(request_timeout: Duration, download_timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        let download_client = Client::builder()
            .timeout(download_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            download_client,
            max_retries,
            retry_base: Duration::from_millis(500),
        })
    }

    /// Underlying client, for requests that need no retry (token exchange).
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Override the first backoff delay (doubles on every retry).
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// GET `url` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, auth: &dyn CloudAuth) -> Result<T> {
        let req = signed(self.client.get(url), url, "GET", auth)?;
        let resp = self.execute_with_retry(req).await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Network(format!(
                "HTTP {} from {}: {}",
                status,
                url,
                body.chars().take(500).collect::<String>()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| CloudError::Network(format!("reading response body: {e}")))?;
        serde_json::from_str(&body).map_err(|e| CloudError::Parse(e.to_string()))
    }

    /// Stream `url` into `dest`, re-signing on each redirect hop.
    ///
    /// Data lands in a `.part` sibling first and is renamed into place once
    /// complete, so `dest` never holds a truncated file. Returns the number
    /// of bytes written.
    pub async fn download_to_file(&self, url: &str, dest: &Path, auth: &dyn CloudAuth) -> Result<u64> {
        let resp = self.follow_redirects(url, auth).await?;

        let partial = part_path(dest);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written = 0u64;
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, dest).await?;
        tracing::debug!(url, path = %dest.display(), bytes = written, "download complete");
        Ok(written)
    }

    async fn follow_redirects(&self, url: &str, auth: &dyn CloudAuth) -> Result<Response> {
        let mut current = url.to_string();

        for _ in 0..=MAX_REDIRECTS {
            let req = signed(self.download_client.get(&current), &current, "GET", auth)?;
            let resp = self.execute_with_retry(req).await?;
            let status = resp.status();

            if status.is_redirection() {
                let location = resp
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| CloudError::Network(format!("HTTP {} without Location", status)))?;
                current = resp
                    .url()
                    .join(location)
                    .map_err(|e| CloudError::Network(format!("bad redirect target: {e}")))?
                    .to_string();
                tracing::debug!(to = %current, "following redirect");
                continue;
            }

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(CloudError::Auth(format!("HTTP {} downloading {}", status, current)));
            }
            if !status.is_success() {
                return Err(CloudError::Network(format!("HTTP {} downloading {}", status, current)));
            }
            return Ok(resp);
        }

        Err(CloudError::Network(format!("too many redirects from {}", url)))
    }

    /// Execute a request with exponential backoff retry.
    ///
    /// Timeouts, connection failures and 5xx responses are retried; 4xx
    /// responses are returned to the caller as-is.
    async fn execute_with_retry(&self, request: RequestBuilder) -> Result<Response> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.retry_base * 2u32.pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }

            let Some(cloned) = request.try_clone() else {
                return Ok(request.send().await?);
            };

            match cloned.send().await {
                Ok(resp) if resp.status().is_server_error() => {
                    tracing::debug!(status = %resp.status(), attempt, "server error, retrying");
                    last_err = Some(CloudError::Network(format!("HTTP {} from {}", resp.status(), resp.url())));
                }
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_timeout() || e.is_connect() => {
                    tracing::debug!(error = %e, attempt, "transient failure, retrying");
                    last_err = Some(CloudError::Http(e));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_err.unwrap_or_else(|| CloudError::Network("request failed".into())))
    }
}

fn signed(mut req: RequestBuilder, url: &str, method: &str, auth: &dyn CloudAuth) -> Result<RequestBuilder> {
    let mut headers = Vec::new();
    auth.sign_request(url, method, &mut headers)?;
    for (key, value) in &headers {
        req = req.header(key.as_str(), value.as_str());
    }
    Ok(req)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
