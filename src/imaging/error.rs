//! Error types for image optimization.

use thiserror::Error;

/// Errors from [`ImageTransformPipeline`](super::ImageTransformPipeline).
///
/// Every variant is scoped to one page: callers processing many pages
/// report the failing page and carry on with its siblings.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The input bytes are not a decodable image.
    #[error("failed to decode image: {source}")]
    Decode {
        #[source]
        source: image::ImageError,
    },

    /// The transformed image could not be encoded.
    #[error("failed to encode image as {format}: {source}")]
    Encode {
        format: &'static str,
        #[source]
        source: image::ImageError,
    },

    /// Settings that cannot produce an image.
    #[error("invalid optimization settings: {0}")]
    InvalidSettings(String),
}

impl ImageError {
    /// Returns true when the settings, not the input, were at fault.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::InvalidSettings(_))
    }
}
