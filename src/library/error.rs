//! Error types for library persistence.

use std::fmt;

use thiserror::Error;

/// Structured classification for library/database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryDbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure (unique/foreign-key/check/not-null).
    ConstraintViolation,
    /// Connection pool timed out or is closed.
    Pool,
    /// Unclassified database failure.
    Other,
}

impl LibraryDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => Self::Pool,
            sqlx::Error::Database(database_error) => {
                let code = database_error.code();
                if matches!(
                    code.as_deref(),
                    Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
                ) {
                    Self::BusyOrLocked
                } else if database_error.is_unique_violation()
                    || database_error.is_foreign_key_violation()
                    || database_error.is_check_violation()
                    || code.as_deref().is_some_and(|c| c.starts_with("SQLITE_CONSTRAINT"))
                {
                    Self::ConstraintViolation
                } else {
                    Self::Other
                }
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for LibraryDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::Pool => "pool",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

/// Errors that can occur during library operations.
#[derive(Debug, Clone, Error)]
pub enum LibraryError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        kind: LibraryDbErrorKind,
        message: String,
    },

    /// No series with the given id.
    #[error(
        "series not found: {0}\n  Suggestion: Add it first with `mangas add <series-id>`"
    )]
    SeriesNotFound(String),

    /// No chapter with the given id.
    #[error("chapter not found: {0}")]
    ChapterNotFound(String),

    /// A stored row holds a value the model cannot represent.
    #[error("corrupt library row: {0}")]
    CorruptRow(String),
}

impl From<sqlx::Error> for LibraryError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: LibraryDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl LibraryError {
    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<LibraryDbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::SeriesNotFound(_) | Self::ChapterNotFound(_) | Self::CorruptRow(_) => None,
        }
    }
}
