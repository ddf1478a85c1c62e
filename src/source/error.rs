//! Error types for source clients.

use thiserror::Error;

/// Errors returned by a [`Source`](super::Source).
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level failure talking to the source API.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status.
    #[error("source API returned HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// The response body did not have the expected shape.
    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// A requested record or asset does not exist on the source.
    #[error("{what} not found on source")]
    NotFound { what: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build source HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// A URL could not be built from the configured base and parameters.
    #[error("invalid source URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl SourceError {
    /// Creates a request error.
    pub fn request(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.into(),
            source,
        }
    }

    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_http_status_message() {
        let err = SourceError::HttpStatus {
            url: "https://api.example/manga".to_string(),
            status: 503,
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("api.example"));
    }

    #[test]
    fn test_source_error_not_found_message() {
        assert_eq!(
            SourceError::not_found("cover for volume 3").to_string(),
            "cover for volume 3 not found on source"
        );
    }
}
