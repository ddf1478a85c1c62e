//! HTTP client wrapper for fetching page images.
//!
//! This module provides the [`PageFetcher`] seam used by chapter acquisition
//! and [`HttpClient`], its reqwest-backed implementation. Page bodies are
//! streamed into memory with a hard size cap.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_PAGE_CONTENT_TYPE, MAX_PAGE_BYTES, READ_TIMEOUT_SECS,
};
use super::error::DownloadError;
use crate::user_agent;

/// Bytes and declared MIME type of one fetched image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Transport used to fetch page and cover images.
///
/// Implementations must not apply rate limiting themselves; callers gate
/// every fetch on the shared [`RateLimiter`](super::RateLimiter).
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches the image at `url`.
    async fn fetch(&self, url: &str) -> Result<FetchedImage, DownloadError>;
}

/// HTTP client for page images.
///
/// This client is designed to be created once and reused for every page,
/// taking advantage of connection pooling.
///
/// # Example
///
/// ```no_run
/// use mangas_core::download::{HttpClient, PageFetcher};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// let page = client.fetch("https://example.com/data/hash/1.png").await?;
/// println!("{} bytes of {}", page.bytes.len(), page.content_type);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    max_body_bytes: usize,
}

impl HttpClient {
    /// Creates a client with the default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, DownloadError> {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit connect/read timeouts in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend cannot be initialized.
    #[instrument(level = "debug")]
    pub fn new_with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(user_agent::default_user_agent())
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .build()
            .map_err(DownloadError::ClientBuild)?;

        Ok(Self {
            client,
            max_body_bytes: MAX_PAGE_BYTES,
        })
    }

    /// Overrides the per-page body size limit.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Returns the inner reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &str) -> Result<FetchedImage, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(media_type)
            .unwrap_or_else(|| DEFAULT_PAGE_CONTENT_TYPE.to_string());

        let mut bytes = Vec::with_capacity(
            response
                .content_length()
                .and_then(|len| usize::try_from(len).ok())
                .unwrap_or(0)
                .min(self.max_body_bytes),
        );
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::network(url, e))?;
            if bytes.len() + chunk.len() > self.max_body_bytes {
                return Err(DownloadError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_body_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(DownloadError::EmptyBody {
                url: url.to_string(),
            });
        }

        debug!(bytes = bytes.len(), content_type = %content_type, "page fetched");
        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}

/// Strips parameters from a Content-Type header value and lowercases it.
fn media_type(header: &str) -> Option<String> {
    let media = header.split(';').next()?.trim();
    if media.is_empty() {
        None
    } else {
        Some(media.to_ascii_lowercase())
    }
}
