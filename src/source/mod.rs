//! Remote series catalogues.
//!
//! A [`Source`] answers catalogue questions (search, series lookup, chapter
//! feed) and resolves the page image URLs of a chapter. Acquisition treats
//! cover URL failures as non-fatal and page list failures as fatal.
//!
//! - [`Source`] - Async trait implemented by each catalogue client
//! - [`MangaDex`] - Client for the public MangaDex API

mod error;
mod mangadex;

pub use error::SourceError;
pub use mangadex::MangaDex;

use async_trait::async_trait;

use crate::model::{ChapterUnit, Series, SeriesSummary};

/// Catalogue and page resolution contract.
///
/// This trait uses `async_trait` so the pipeline can hold an
/// `Arc<dyn Source>`.
#[async_trait]
pub trait Source: Send + Sync {
    /// Returns the source's name as stored on [`Series::source`].
    fn name(&self) -> &str;

    /// Searches the catalogue by title.
    async fn search(&self, query: &str) -> Result<Vec<SeriesSummary>, SourceError>;

    /// Loads full series metadata.
    async fn get_series(&self, id: &str) -> Result<Series, SourceError>;

    /// Lists every chapter of a series.
    async fn get_chapters(&self, series: &Series) -> Result<Vec<ChapterUnit>, SourceError>;

    /// Resolves the ordered page image URLs of a chapter.
    async fn get_pages(
        &self,
        series: &Series,
        chapter: &ChapterUnit,
    ) -> Result<Vec<String>, SourceError>;

    /// Resolves the series cover image URL.
    async fn series_cover_url(&self, series: &Series) -> Result<String, SourceError>;

    /// Resolves a cover image URL specific to the chapter (typically its volume cover).
    async fn chapter_cover_url(
        &self,
        series: &Series,
        chapter: &ChapterUnit,
    ) -> Result<String, SourceError>;
}
