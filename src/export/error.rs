//! Error types for device export and external conversion.

use std::path::PathBuf;

use thiserror::Error;

use crate::document::DocumentError;

/// Failure of one external converter attempt.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The tool is not on `PATH`.
    #[error("{tool} not found on PATH")]
    NotInstalled { tool: &'static str },

    /// The tool cannot produce the requested format.
    #[error("{tool} cannot produce {format}")]
    Unsupported {
        tool: &'static str,
        format: &'static str,
    },

    /// The tool ran and exited unsuccessfully.
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: &'static str,
        status: String,
        stderr: String,
    },

    /// The tool could not be started or its output could not be moved.
    #[error("{tool} I/O error: {source}")]
    Io {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from [`DeviceExporter::convert`](super::DeviceExporter::convert).
#[derive(Debug, Error)]
pub enum ExportError {
    /// The input list was empty.
    #[error("no containers to export")]
    NoContainers,

    /// The device id is not in the catalogue.
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// A chapter holds more pages than the global ordinal can encode.
    #[error("chapter {chapter} has page {page}, exports support at most 1000 pages per chapter")]
    TooManyPages { chapter: usize, page: usize },

    /// An input container could not be opened or read.
    #[error("failed to read container {path}: {source}")]
    Container {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// Assembling the combined container failed.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// A blocking task panicked or was cancelled.
    #[error("export task failed: {0}")]
    Task(String),

    /// Every converter in the cascade failed. The combined container is
    /// still available at `fallback`.
    #[error(
        "no conversion tool available (tried {}), combined container kept at {}",
        attempts.join("; "),
        fallback.display()
    )]
    NoConverterAvailable {
        fallback: PathBuf,
        attempts: Vec<String>,
    },
}

impl ExportError {
    /// Returns the combined container path when conversion was the only
    /// failing step.
    #[must_use]
    pub fn fallback_path(&self) -> Option<&std::path::Path> {
        match self {
            Self::NoConverterAvailable { fallback, .. } => Some(fallback),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        match self {
            Self::NoContainers | Self::UnknownDevice(_) | Self::TooManyPages { .. } => true,
            Self::Document(e) => e.is_usage_error(),
            _ => false,
        }
    }
}
