//! Error types for page transport.
//!
//! These are the transient fetch failures of the pipeline: they end the
//! chapter they occur in and are never retried automatically.

use thiserror::Error;

/// Errors that can occur while fetching a page image.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The server answered with an empty body.
    #[error("empty response body from {url}")]
    EmptyBody {
        /// The URL that returned no bytes.
        url: String,
    },

    /// The body exceeded the per-page size limit.
    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge {
        /// The URL whose body was too large.
        url: String,
        /// The enforced limit in bytes.
        limit: usize,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl DownloadError {
    /// Creates a network error from a reqwest error, classifying timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns the URL the error relates to, if any.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Network { url, .. }
            | Self::Timeout { url }
            | Self::HttpStatus { url, .. }
            | Self::InvalidUrl { url }
            | Self::EmptyBody { url }
            | Self::TooLarge { url, .. } => Some(url),
            Self::ClientBuild(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_error_message() {
        let err = DownloadError::http_status("https://example.com/p1.jpg", 404);
        assert_eq!(
            err.to_string(),
            "HTTP 404 downloading https://example.com/p1.jpg"
        );
    }

    #[test]
    fn test_timeout_error_message() {
        let err = DownloadError::timeout("https://example.com/slow.jpg");
        assert!(err.to_string().contains("timeout"));
        assert_eq!(err.url(), Some("https://example.com/slow.jpg"));
    }

    #[test]
    fn test_invalid_url_error_message() {
        let err = DownloadError::invalid_url("not-a-url");
        assert_eq!(err.to_string(), "invalid URL: not-a-url");
    }

    #[test]
    fn test_too_large_error_message() {
        let err = DownloadError::TooLarge {
            url: "https://example.com/huge.png".to_string(),
            limit: 10,
        };
        assert!(err.to_string().contains("exceeds 10 bytes"));
    }
}
