//! Error types for document assembly.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by [`DocumentBuilder`](super::DocumentBuilder).
///
/// Variants up to [`NoPages`](Self::NoPages) are usage errors: the builder
/// was driven out of sequence or given invalid input, and retrying the same
/// call cannot succeed. The rest are assembly failures of one `done` call.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// `next`, a cover setter or `done` was called before `init`.
    #[error("document builder not initialized, call init first")]
    NotInitialized,

    /// `init` was called while a session is open.
    #[error("document builder already initialized, call done first")]
    AlreadyInitialized,

    /// A required argument was absent.
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    /// Image content was empty.
    #[error("{what} content is empty")]
    EmptyContent { what: &'static str },

    /// A page carried no content type.
    #[error("page {index} has no content type")]
    MissingContentType { index: u32 },

    /// Two pages used the same ordinal within one session.
    #[error("page {index} was already added to this document")]
    DuplicatePage { index: u32 },

    /// `done` was called with zero pages.
    #[error("no pages added to document")]
    NoPages,

    /// Filesystem failure while spooling or writing the container.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The container library rejected the content.
    #[error("failed to assemble container: {0}")]
    Epub(String),
}

impl DocumentError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true when the error reflects caller misuse rather than a
    /// failure of the environment.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        !matches!(self, Self::Io { .. } | Self::Epub(_))
    }
}
