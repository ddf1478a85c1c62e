//! Domain records shared by the library, source and download modules.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a series in the library.
///
/// Transitions only `New -> Downloading -> {Partial, Completed}` within a
/// batch; a later batch starts again from `Downloading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStatus {
    /// Added to the library, never acquired.
    #[default]
    New,
    /// A batch is in flight.
    Downloading,
    /// The last batch finished with at least one failed chapter.
    Partial,
    /// The last batch materialized every requested chapter.
    Completed,
}

impl SeriesStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Downloading => "downloading",
            Self::Partial => "partial",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for SeriesStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SeriesStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "downloading" => Ok(Self::Downloading),
            "partial" => Ok(Self::Partial),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("invalid series status: {s}")),
        }
    }
}

/// A complete work composed of ordered chapters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Series {
    /// Source-assigned identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Synopsis, empty when the source has none.
    pub description: String,
    /// Cover image URL if the source resolved one at lookup time.
    pub cover_url: Option<String>,
    /// Name of the source the series came from (e.g. `mangadex`).
    pub source: String,
    /// Library lifecycle status.
    pub status: SeriesStatus,
}

/// Lightweight search hit returned by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// One downloadable installment of a series.
///
/// `volume` and `number` are free text; sources are not required to use
/// numeric values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChapterUnit {
    pub id: String,
    pub series_id: String,
    pub title: String,
    /// Language tag such as `en`.
    pub language: String,
    pub volume: String,
    pub number: String,
    /// Set together with `container_path` once the container is written.
    pub materialized: bool,
    pub container_path: Option<PathBuf>,
}

/// A fetched page image inside one builder session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub bytes: Vec<u8>,
    /// Declared MIME type, e.g. `image/png`.
    pub content_type: String,
    /// Position within the chapter (or global ordinal for combined exports).
    pub index: u32,
}

impl PageImage {
    #[must_use]
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>, index: u32) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
            index,
        }
    }
}

/// Optional cover image for a series or a chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl CoverImage {
    #[must_use]
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_status_round_trips_through_str() {
        for status in [
            SeriesStatus::New,
            SeriesStatus::Downloading,
            SeriesStatus::Partial,
            SeriesStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<SeriesStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_series_status_rejects_unknown() {
        let err = "paused".parse::<SeriesStatus>().unwrap_err();
        assert!(err.contains("paused"));
    }

    #[test]
    fn test_series_status_default_is_new() {
        assert_eq!(Series::default().status, SeriesStatus::New);
    }
}
