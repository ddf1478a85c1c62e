//! Repository seam for library persistence operations.
//!
//! Acquisition code depends on this trait rather than on [`Library`]
//! directly, so an explicit repository instance is handed to each
//! orchestrator and tests can substitute their own.
//!
//! [`Library`]: super::Library

use std::path::Path;

use async_trait::async_trait;

use super::Result;
use crate::model::{ChapterUnit, Series, SeriesStatus};

/// Data-access contract for series and chapter records.
#[async_trait]
pub trait LibraryRepository: Send + Sync {
    /// Inserts or replaces a series record.
    async fn save_series(&self, series: &Series) -> Result<()>;

    /// Loads a series by id.
    async fn get_series(&self, id: &str) -> Result<Series>;

    /// Lists every series, ordered by name.
    async fn list_series(&self) -> Result<Vec<Series>>;

    /// Deletes a series and its chapters.
    async fn delete_series(&self, id: &str) -> Result<()>;

    /// Finds a series by display name, ignoring case.
    async fn find_series_by_name(&self, name: &str) -> Result<Option<Series>>;

    /// Overwrites the lifecycle status of a series.
    async fn update_series_status(&self, id: &str, status: SeriesStatus) -> Result<()>;

    /// Lists a series' chapters in numbering order.
    async fn get_chapters(&self, series_id: &str) -> Result<Vec<ChapterUnit>>;

    /// Inserts a chapter, or refreshes its metadata if it already exists.
    async fn save_chapter(&self, chapter: &ChapterUnit) -> Result<()>;

    /// Sets the materialized flag and container path of a chapter in one write.
    async fn update_chapter_materialized(
        &self,
        id: &str,
        materialized: bool,
        container_path: Option<&Path>,
    ) -> Result<()>;
}

#[async_trait]
impl LibraryRepository for super::Library {
    async fn save_series(&self, series: &Series) -> Result<()> {
        super::Library::save_series(self, series).await
    }

    async fn get_series(&self, id: &str) -> Result<Series> {
        super::Library::get_series(self, id).await
    }

    async fn list_series(&self) -> Result<Vec<Series>> {
        super::Library::list_series(self).await
    }

    async fn delete_series(&self, id: &str) -> Result<()> {
        super::Library::delete_series(self, id).await
    }

    async fn find_series_by_name(&self, name: &str) -> Result<Option<Series>> {
        super::Library::find_series_by_name(self, name).await
    }

    async fn update_series_status(&self, id: &str, status: SeriesStatus) -> Result<()> {
        super::Library::update_series_status(self, id, status).await
    }

    async fn get_chapters(&self, series_id: &str) -> Result<Vec<ChapterUnit>> {
        super::Library::get_chapters(self, series_id).await
    }

    async fn save_chapter(&self, chapter: &ChapterUnit) -> Result<()> {
        super::Library::save_chapter(self, chapter).await
    }

    async fn update_chapter_materialized(
        &self,
        id: &str,
        materialized: bool,
        container_path: Option<&Path>,
    ) -> Result<()> {
        super::Library::update_chapter_materialized(self, id, materialized, container_path).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::library::Library;

    async fn status_of(repo: &dyn LibraryRepository, id: &str) -> SeriesStatus {
        repo.get_series(id).await.unwrap().status
    }

    #[tokio::test]
    async fn test_library_repository_trait_object_delegates() {
        let db = Database::new_in_memory().await.unwrap();
        let library = Library::new(db);
        let repo: &dyn LibraryRepository = &library;

        let series = Series {
            id: "s1".to_string(),
            name: "Seam".to_string(),
            source: "mangadex".to_string(),
            ..Series::default()
        };
        repo.save_series(&series).await.unwrap();
        assert_eq!(status_of(repo, "s1").await, SeriesStatus::New);

        repo.update_series_status("s1", SeriesStatus::Downloading)
            .await
            .unwrap();
        assert_eq!(status_of(repo, "s1").await, SeriesStatus::Downloading);
    }
}
