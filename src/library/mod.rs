//! Library module for persisted series and chapter state.
//!
//! This module provides the `SQLite`-backed [`Library`] plus the
//! [`LibraryRepository`] seam used by the acquisition pipeline.
//!
//! # Example
//!
//! ```ignore
//! use mangas_core::library::Library;
//! use mangas_core::Database;
//! use std::path::Path;
//!
//! let db = Database::new(Path::new("library.db")).await?;
//! let library = Library::new(db);
//!
//! for series in library.list_series().await? {
//!     println!("{} [{}]", series.name, series.status);
//! }
//! ```

mod error;
mod repository;

pub use error::{LibraryDbErrorKind, LibraryError};
pub use repository::LibraryRepository;

use std::path::{Path, PathBuf};

use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::model::{ChapterUnit, Series, SeriesStatus};

/// Result type for library operations.
pub type Result<T> = std::result::Result<T, LibraryError>;

const SERIES_COLUMNS: &str = "id, name, description, cover_url, source, status";
const CHAPTER_COLUMNS: &str =
    "id, series_id, title, language, volume, number, materialized, container_path";

/// SQLite-backed store of series and chapters.
#[derive(Debug, Clone)]
pub struct Library {
    db: Database,
}

impl Library {
    /// Creates a library over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a series, replacing name, description, cover, source and
    /// status if it already exists. Existing chapters are kept.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the upsert fails.
    #[instrument(skip(self, series), fields(series_id = %series.id))]
    pub async fn save_series(&self, series: &Series) -> Result<()> {
        sqlx::query(
            r"INSERT INTO series (id, name, description, cover_url, source, status)
              VALUES (?, ?, ?, ?, ?, ?)
              ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                cover_url = excluded.cover_url,
                source = excluded.source,
                status = excluded.status,
                updated_at = datetime('now')",
        )
        .bind(&series.id)
        .bind(&series.name)
        .bind(&series.description)
        .bind(series.cover_url.as_deref())
        .bind(&series.source)
        .bind(series.status.as_str())
        .execute(self.db.pool())
        .await?;

        debug!(status = %series.status, "series saved");
        Ok(())
    }

    /// Loads a series by id.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::SeriesNotFound`] if no series has this id.
    #[instrument(skip(self))]
    pub async fn get_series(&self, id: &str) -> Result<Series> {
        let row = sqlx::query(&format!("SELECT {SERIES_COLUMNS} FROM series WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        match row {
            Some(row) => series_from_row(&row),
            None => Err(LibraryError::SeriesNotFound(id.to_string())),
        }
    }

    /// Lists every series ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_series(&self) -> Result<Vec<Series>> {
        let rows = sqlx::query(&format!(
            "SELECT {SERIES_COLUMNS} FROM series ORDER BY name COLLATE NOCASE, id"
        ))
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(series_from_row).collect()
    }

    /// Deletes a series together with its chapters.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::SeriesNotFound`] if no series has this id.
    #[instrument(skip(self))]
    pub async fn delete_series(&self, id: &str) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query("DELETE FROM chapters WHERE series_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM series WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::SeriesNotFound(id.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Finds a series whose name matches `name` ignoring ASCII case.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn find_series_by_name(&self, name: &str) -> Result<Option<Series>> {
        let row = sqlx::query(&format!(
            "SELECT {SERIES_COLUMNS} FROM series WHERE name = ? COLLATE NOCASE ORDER BY id LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(series_from_row).transpose()
    }

    /// Overwrites the status of a series.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::SeriesNotFound`] if no series has this id.
    #[instrument(skip(self))]
    pub async fn update_series_status(&self, id: &str, status: SeriesStatus) -> Result<()> {
        let result = sqlx::query(
            "UPDATE series SET status = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::SeriesNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Lists chapters of a series, ordered by volume then chapter number.
    ///
    /// Numbering is free text; rows that do not parse as numbers sort by
    /// their text after the numeric ones.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_chapters(&self, series_id: &str) -> Result<Vec<ChapterUnit>> {
        let rows = sqlx::query(&format!(
            r"SELECT {CHAPTER_COLUMNS} FROM chapters
              WHERE series_id = ?
              ORDER BY CAST(volume AS REAL), CAST(number AS REAL), number, id"
        ))
        .bind(series_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(chapter_from_row).collect()
    }

    /// Inserts a chapter. An existing row keeps its materialized state and
    /// only has its descriptive fields refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the parent series is missing
    /// or the upsert fails.
    #[instrument(skip(self, chapter), fields(chapter_id = %chapter.id, series_id = %chapter.series_id))]
    pub async fn save_chapter(&self, chapter: &ChapterUnit) -> Result<()> {
        let container_path = chapter
            .container_path
            .as_deref()
            .map(|p| p.to_string_lossy().into_owned());

        sqlx::query(
            r"INSERT INTO chapters (id, series_id, title, language, volume, number, materialized, container_path)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?)
              ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                language = excluded.language,
                volume = excluded.volume,
                number = excluded.number,
                updated_at = datetime('now')",
        )
        .bind(&chapter.id)
        .bind(&chapter.series_id)
        .bind(&chapter.title)
        .bind(&chapter.language)
        .bind(&chapter.volume)
        .bind(&chapter.number)
        .bind(chapter.materialized)
        .bind(container_path)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Sets a chapter's materialized flag and container path in a single
    /// statement, so readers never observe one without the other.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::ChapterNotFound`] if no chapter has this id.
    #[instrument(skip(self, container_path), fields(path = ?container_path))]
    pub async fn update_chapter_materialized(
        &self,
        id: &str,
        materialized: bool,
        container_path: Option<&Path>,
    ) -> Result<()> {
        let container_path = container_path.map(|p| p.to_string_lossy().into_owned());
        let result = sqlx::query(
            r"UPDATE chapters
              SET materialized = ?, container_path = ?, updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(materialized)
        .bind(container_path)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::ChapterNotFound(id.to_string()));
        }
        Ok(())
    }
}

fn series_from_row(row: &SqliteRow) -> Result<Series> {
    let status: String = row.try_get("status")?;
    let status = status.parse::<SeriesStatus>().map_err(LibraryError::CorruptRow)?;

    Ok(Series {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        cover_url: row.try_get("cover_url")?,
        source: row.try_get("source")?,
        status,
    })
}

fn chapter_from_row(row: &SqliteRow) -> Result<ChapterUnit> {
    let container_path: Option<String> = row.try_get("container_path")?;

    Ok(ChapterUnit {
        id: row.try_get("id")?,
        series_id: row.try_get("series_id")?,
        title: row.try_get("title")?,
        language: row.try_get("language")?,
        volume: row.try_get("volume")?,
        number: row.try_get("number")?,
        materialized: row.try_get("materialized")?,
        container_path: container_path.map(PathBuf::from),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn library() -> Library {
        Library::new(Database::new_in_memory().await.unwrap())
    }

    fn series(id: &str, name: &str) -> Series {
        Series {
            id: id.to_string(),
            name: name.to_string(),
            description: "synopsis".to_string(),
            cover_url: None,
            source: "mangadex".to_string(),
            status: SeriesStatus::New,
        }
    }

    fn chapter(id: &str, series_id: &str, number: &str) -> ChapterUnit {
        ChapterUnit {
            id: id.to_string(),
            series_id: series_id.to_string(),
            number: number.to_string(),
            language: "en".to_string(),
            ..ChapterUnit::default()
        }
    }

    // ==================== Series Tests ====================

    #[tokio::test]
    async fn test_save_and_get_series() {
        let library = library().await;
        library.save_series(&series("s1", "One Piece")).await.unwrap();

        let loaded = library.get_series("s1").await.unwrap();
        assert_eq!(loaded, series("s1", "One Piece"));
    }

    #[tokio::test]
    async fn test_save_series_upserts() {
        let library = library().await;
        library.save_series(&series("s1", "Old")).await.unwrap();

        let mut updated = series("s1", "New Name");
        updated.status = SeriesStatus::Completed;
        library.save_series(&updated).await.unwrap();

        let loaded = library.get_series("s1").await.unwrap();
        assert_eq!(loaded.name, "New Name");
        assert_eq!(loaded.status, SeriesStatus::Completed);
        assert_eq!(library.list_series().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_series_missing_returns_not_found() {
        let library = library().await;
        let err = library.get_series("nope").await.unwrap_err();
        assert!(matches!(err, LibraryError::SeriesNotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_find_series_by_name_ignores_case() {
        let library = library().await;
        library.save_series(&series("s1", "Berserk")).await.unwrap();

        let found = library.find_series_by_name("bErSeRk").await.unwrap();
        assert_eq!(found.map(|s| s.id), Some("s1".to_string()));
        assert!(library.find_series_by_name("Other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_series_removes_chapters() {
        let library = library().await;
        library.save_series(&series("s1", "A")).await.unwrap();
        library.save_chapter(&chapter("c1", "s1", "1")).await.unwrap();

        library.delete_series("s1").await.unwrap();

        assert!(library.get_chapters("s1").await.unwrap().is_empty());
        assert!(matches!(
            library.delete_series("s1").await,
            Err(LibraryError::SeriesNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_series_status_missing_series() {
        let library = library().await;
        let err = library
            .update_series_status("ghost", SeriesStatus::Partial)
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::SeriesNotFound(_)));
    }

    // ==================== Chapter Tests ====================

    #[tokio::test]
    async fn test_get_chapters_orders_numerically() {
        let library = library().await;
        library.save_series(&series("s1", "A")).await.unwrap();
        for (id, number) in [("c10", "10"), ("c2", "2"), ("c1", "1.5")] {
            library.save_chapter(&chapter(id, "s1", number)).await.unwrap();
        }

        let numbers: Vec<String> = library
            .get_chapters("s1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.number)
            .collect();
        assert_eq!(numbers, vec!["1.5", "2", "10"]);
    }

    #[tokio::test]
    async fn test_update_chapter_materialized_sets_flag_and_path() {
        let library = library().await;
        library.save_series(&series("s1", "A")).await.unwrap();
        library.save_chapter(&chapter("c1", "s1", "1")).await.unwrap();

        library
            .update_chapter_materialized("c1", true, Some(Path::new("/tmp/A_ch_1.epub")))
            .await
            .unwrap();

        let stored = &library.get_chapters("s1").await.unwrap()[0];
        assert!(stored.materialized);
        assert_eq!(
            stored.container_path.as_deref(),
            Some(Path::new("/tmp/A_ch_1.epub"))
        );
    }

    #[tokio::test]
    async fn test_save_chapter_keeps_materialized_state() {
        let library = library().await;
        library.save_series(&series("s1", "A")).await.unwrap();
        library.save_chapter(&chapter("c1", "s1", "1")).await.unwrap();
        library
            .update_chapter_materialized("c1", true, Some(Path::new("out.epub")))
            .await
            .unwrap();

        let mut refreshed = chapter("c1", "s1", "1");
        refreshed.title = "Renamed".to_string();
        library.save_chapter(&refreshed).await.unwrap();

        let stored = &library.get_chapters("s1").await.unwrap()[0];
        assert_eq!(stored.title, "Renamed");
        assert!(stored.materialized);
    }

    #[tokio::test]
    async fn test_update_chapter_materialized_missing_chapter() {
        let library = library().await;
        let err = library
            .update_chapter_materialized("missing", true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::ChapterNotFound(_)));
    }
}
