//! Series-level batch acquisition over a bounded worker pool.
//!
//! The [`SeriesOrchestrator`] fans a series' chapters out to
//! [`ChapterAcquirer`] tasks using a semaphore-based concurrency ceiling.
//! Chapters are independent: one failing chapter never cancels its
//! siblings. The series status is written once when the batch starts
//! (`downloading`) and once when it ends (`partial` or `completed`).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mangas_core::download::{
//!     ChapterAcquirer, HttpClient, ProgressReporter, RateLimiter, SeriesOrchestrator,
//! };
//! use mangas_core::library::Library;
//! use mangas_core::source::{MangaDex, Source};
//! use mangas_core::Database;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let library = Arc::new(Library::new(Database::new_in_memory().await?));
//! let source = Arc::new(MangaDex::new()?);
//! let series = source.get_series("some-series-id").await?;
//! let acquirer = ChapterAcquirer::new(
//!     source,
//!     Arc::new(HttpClient::new()?),
//!     library,
//!     Arc::new(RateLimiter::new(Duration::from_millis(500))),
//!     ProgressReporter::disabled(),
//!     "./downloads",
//! );
//! let orchestrator = SeriesOrchestrator::new(acquirer, 3)?;
//! let report = orchestrator.acquire_all(&series, None).await?;
//! println!("{} ok, {} failed", report.completed.len(), report.failures.len());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::acquirer::{AcquireError, ChapterAcquirer};
use super::progress::{ProgressEvent, ProgressStatus};
use crate::library::LibraryError;
use crate::model::{ChapterUnit, Series, SeriesStatus};
use crate::source::SourceError;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 16;

/// Errors that prevent a batch from running or from being recorded.
///
/// Per-chapter failures are not errors of the batch; they are reported in
/// [`BatchReport::failures`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency { value: usize },

    /// A required record was absent (empty id).
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    /// Reading or writing library state failed.
    #[error("library error: {0}")]
    Library(#[from] LibraryError),

    /// The chapter list could not be resolved.
    #[error("failed to list chapters: {0}")]
    Source(#[from] SourceError),

    /// The batch finished with failed chapters. Produced only by
    /// [`BatchReport::into_result`].
    #[error("{failed} of {total} chapters failed")]
    ChaptersFailed { failed: usize, total: usize },
}

impl OrchestratorError {
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConcurrency { .. } | Self::MissingArgument(_)
        )
    }
}

/// One chapter that did not materialize.
#[derive(Debug)]
pub struct ChapterFailure {
    pub chapter_id: String,
    pub chapter_number: String,
    pub error: AcquireError,
}

/// Outcome of one [`SeriesOrchestrator::acquire_all`] batch.
#[derive(Debug)]
pub struct BatchReport {
    pub series_id: String,
    /// Status persisted at the end of the batch.
    pub status: SeriesStatus,
    /// Chapter id and container path of every materialized chapter.
    pub completed: Vec<(String, PathBuf)>,
    pub failures: Vec<ChapterFailure>,
}

impl BatchReport {
    /// Total chapters in the batch.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed.len() + self.failures.len()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Converts the report into a strict result for callers that treat any
    /// failed chapter as an error.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::ChaptersFailed`] if any chapter failed.
    pub fn into_result(self) -> Result<Self, OrchestratorError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(OrchestratorError::ChaptersFailed {
                failed: self.failures.len(),
                total: self.total(),
            })
        }
    }
}

/// Bounded-concurrency batch driver for one series at a time.
///
/// # Concurrency Model
///
/// - Each chapter runs in its own Tokio task
/// - A semaphore permit is acquired before spawning each task
/// - Permits are released automatically when the chapter ends (RAII)
/// - All tasks share one rate limiter, so aggregate request rate stays
///   bounded no matter how many workers run
#[derive(Debug)]
pub struct SeriesOrchestrator {
    acquirer: Arc<ChapterAcquirer>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
}

impl SeriesOrchestrator {
    /// Creates an orchestrator running at most `concurrency` chapters at once.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidConcurrency`] outside 1-16.
    #[instrument(level = "debug", skip(acquirer))]
    pub fn new(acquirer: ChapterAcquirer, concurrency: usize) -> Result<Self, OrchestratorError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(OrchestratorError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            rate_limit_ms = acquirer.rate_limiter().interval().as_millis(),
            rate_limit_disabled = acquirer.rate_limiter().is_disabled(),
            "creating series orchestrator"
        );

        Ok(Self {
            acquirer: Arc::new(acquirer),
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        })
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn acquirer(&self) -> &ChapterAcquirer {
        &self.acquirer
    }

    /// Stops accepting new chapters and releases every rate-limiter waiter.
    ///
    /// Chapters already past their last permit run to completion; the rest
    /// fail with [`AcquireError::Shutdown`].
    pub fn shutdown(&self) {
        info!("shutting down series orchestrator");
        self.semaphore.close();
        self.acquirer.rate_limiter().close();
    }

    /// Acquires `chapters` of `series`, or every chapter the source lists
    /// when `chapters` is `None`.
    ///
    /// The series and each chapter are saved to the library before work
    /// starts. Chapter failures do not fail the call; they are collected in
    /// the returned [`BatchReport`] and reflected in the persisted status.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::MissingArgument`] if the series has no id
    /// - [`OrchestratorError::Source`] if the chapter list cannot be resolved
    ///   (the series is then marked `partial`)
    /// - [`OrchestratorError::Library`] if status bookkeeping fails
    #[instrument(skip(self, series, chapters), fields(series_id = %series.id))]
    pub async fn acquire_all(
        &self,
        series: &Series,
        chapters: Option<Vec<ChapterUnit>>,
    ) -> Result<BatchReport, OrchestratorError> {
        if series.id.is_empty() {
            return Err(OrchestratorError::MissingArgument("series"));
        }

        let repository = self.acquirer.repository();
        let series = Series {
            status: SeriesStatus::Downloading,
            ..series.clone()
        };
        repository.save_series(&series).await?;

        let chapters = match chapters {
            Some(chapters) => chapters,
            None => match self.acquirer.source().get_chapters(&series).await {
                Ok(chapters) => chapters,
                Err(e) => {
                    warn!(error = %e, "failed to resolve chapter list");
                    repository
                        .update_series_status(&series.id, SeriesStatus::Partial)
                        .await?;
                    return Err(e.into());
                }
            },
        };

        let mut queued = Vec::with_capacity(chapters.len());
        for mut chapter in chapters {
            if chapter.series_id.is_empty() {
                chapter.series_id.clone_from(&series.id);
            }
            if let Err(e) = repository.save_chapter(&chapter).await {
                warn!(chapter_id = %chapter.id, error = %e, "failed to record chapter");
                repository
                    .update_series_status(&series.id, SeriesStatus::Partial)
                    .await?;
                return Err(e.into());
            }
            self.acquirer
                .progress()
                .emit(ProgressEvent::new(&series, &chapter, ProgressStatus::Queued));
            queued.push(chapter);
        }

        info!(chapters = queued.len(), concurrency = self.concurrency, "starting batch");

        let series = Arc::new(series);
        let mut handles = Vec::with_capacity(queued.len());
        let mut failures = Vec::new();
        let mut pending = queued.into_iter();

        for chapter in pending.by_ref() {
            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                debug!("worker pool closed, not starting remaining chapters");
                failures.push(ChapterFailure {
                    chapter_id: chapter.id.clone(),
                    chapter_number: chapter.number.clone(),
                    error: AcquireError::Shutdown,
                });
                break;
            };

            let acquirer = Arc::clone(&self.acquirer);
            let series = Arc::clone(&series);
            let id = chapter.id.clone();
            let number = chapter.number.clone();
            let handle = tokio::spawn(async move {
                // Permit is dropped when this block exits (RAII)
                let _permit = permit;
                acquirer.acquire(&series, &chapter).await
            });
            handles.push((id, number, handle));
        }

        failures.extend(pending.map(|chapter| ChapterFailure {
            chapter_id: chapter.id,
            chapter_number: chapter.number,
            error: AcquireError::Shutdown,
        }));

        debug!(task_count = handles.len(), "waiting for chapters to complete");

        let mut completed = Vec::with_capacity(handles.len());
        for (chapter_id, chapter_number, handle) in handles {
            match handle.await {
                Ok(Ok(path)) => completed.push((chapter_id, path)),
                Ok(Err(error)) => failures.push(ChapterFailure {
                    chapter_id,
                    chapter_number,
                    error,
                }),
                Err(e) => {
                    warn!(chapter_id = %chapter_id, error = %e, "chapter task panicked");
                    failures.push(ChapterFailure {
                        chapter_id,
                        chapter_number,
                        error: AcquireError::Task(e.to_string()),
                    });
                }
            }
        }

        let status = if failures.is_empty() {
            SeriesStatus::Completed
        } else {
            SeriesStatus::Partial
        };
        repository.update_series_status(&series.id, status).await?;

        info!(
            completed = completed.len(),
            failed = failures.len(),
            status = %status,
            "batch complete"
        );

        Ok(BatchReport {
            series_id: series.id.clone(),
            status,
            completed,
            failures,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::db::Database;
    use crate::download::client::{FetchedImage, PageFetcher};
    use crate::download::error::DownloadError;
    use crate::download::progress::{ProgressReporter, progress_channel};
    use crate::download::rate_limiter::RateLimiter;
    use crate::library::Library;
    use crate::model::SeriesSummary;
    use crate::source::Source;

    struct StubSource {
        chapters: Vec<ChapterUnit>,
        pages: HashMap<String, Vec<String>>,
        fail_listing: bool,
    }

    #[async_trait]
    impl Source for StubSource {
        fn name(&self) -> &str {
            "stub"
        }

        async fn search(&self, _query: &str) -> Result<Vec<SeriesSummary>, SourceError> {
            Ok(Vec::new())
        }

        async fn get_series(&self, id: &str) -> Result<Series, SourceError> {
            Err(SourceError::not_found(id))
        }

        async fn get_chapters(&self, _series: &Series) -> Result<Vec<ChapterUnit>, SourceError> {
            if self.fail_listing {
                return Err(SourceError::not_found("feed"));
            }
            Ok(self.chapters.clone())
        }

        async fn get_pages(
            &self,
            _series: &Series,
            chapter: &ChapterUnit,
        ) -> Result<Vec<String>, SourceError> {
            self.pages
                .get(&chapter.id)
                .cloned()
                .ok_or_else(|| SourceError::not_found(chapter.id.clone()))
        }

        async fn series_cover_url(&self, _series: &Series) -> Result<String, SourceError> {
            Err(SourceError::not_found("cover"))
        }

        async fn chapter_cover_url(
            &self,
            _series: &Series,
            _chapter: &ChapterUnit,
        ) -> Result<String, SourceError> {
            Err(SourceError::not_found("cover"))
        }
    }

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageFetcher for CountingFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedImage, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.contains("missing") {
                return Err(DownloadError::http_status(url, 404));
            }
            Ok(FetchedImage {
                bytes: url.as_bytes().to_vec(),
                content_type: "image/jpeg".to_string(),
            })
        }
    }

    fn series() -> Series {
        Series {
            id: "s1".to_string(),
            name: "Batch Series".to_string(),
            source: "stub".to_string(),
            ..Series::default()
        }
    }

    fn chapter(id: &str, number: &str) -> ChapterUnit {
        ChapterUnit {
            id: id.to_string(),
            number: number.to_string(),
            ..ChapterUnit::default()
        }
    }

    fn stub_source(broken: Option<&str>) -> StubSource {
        let chapters = vec![chapter("c1", "1"), chapter("c2", "2"), chapter("c3", "3")];
        let pages = chapters
            .iter()
            .map(|c| {
                let prefix = if Some(c.id.as_str()) == broken {
                    "missing"
                } else {
                    "page"
                };
                let urls = (1..=2)
                    .map(|p| format!("https://pages.test/{}/{prefix}{p}.jpg", c.id))
                    .collect();
                (c.id.clone(), urls)
            })
            .collect();
        StubSource {
            chapters,
            pages,
            fail_listing: false,
        }
    }

    async fn orchestrator(
        source: StubSource,
        progress: ProgressReporter,
        dir: &TempDir,
    ) -> (SeriesOrchestrator, Arc<Library>, Arc<CountingFetcher>) {
        let library = Arc::new(Library::new(Database::new_in_memory().await.unwrap()));
        let fetcher = Arc::new(CountingFetcher::default());
        let acquirer = ChapterAcquirer::new(
            Arc::new(source),
            Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
            Arc::clone(&library) as Arc<dyn crate::library::LibraryRepository>,
            Arc::new(RateLimiter::disabled()),
            progress,
            dir.path(),
        );
        (SeriesOrchestrator::new(acquirer, 2).unwrap(), library, fetcher)
    }

    // ==================== Construction Tests ====================

    #[tokio::test]
    async fn test_new_rejects_out_of_range_concurrency() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, _, _) =
            orchestrator(stub_source(None), ProgressReporter::disabled(), &dir).await;
        let acquirer = orchestrator.acquirer().clone();

        for value in [0, 17] {
            let err = SeriesOrchestrator::new(acquirer.clone(), value).unwrap_err();
            assert!(matches!(err, OrchestratorError::InvalidConcurrency { .. }));
            assert!(err.is_usage_error());
        }
    }

    // ==================== Batch Tests ====================

    #[tokio::test]
    async fn test_acquire_all_resolves_chapters_and_completes() {
        let dir = TempDir::new().unwrap();
        let (reporter, mut rx) = progress_channel(256);
        let (orchestrator, library, fetcher) =
            orchestrator(stub_source(None), reporter, &dir).await;

        let report = orchestrator.acquire_all(&series(), None).await.unwrap();

        assert_eq!(report.status, SeriesStatus::Completed);
        assert_eq!(report.completed.len(), 3);
        assert!(report.is_complete());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 6);

        let stored = library.get_series("s1").await.unwrap();
        assert_eq!(stored.status, SeriesStatus::Completed);
        let chapters = library.get_chapters("s1").await.unwrap();
        assert!(chapters.iter().all(|c| c.materialized && c.container_path.is_some()));

        let mut queued = 0;
        let mut complete = 0;
        while let Ok(event) = rx.try_recv() {
            match event.status {
                ProgressStatus::Queued => queued += 1,
                ProgressStatus::Complete => complete += 1,
                _ => {}
            }
        }
        assert_eq!((queued, complete), (3, 3));
    }

    #[tokio::test]
    async fn test_acquire_all_isolates_failed_chapter() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, library, _) =
            orchestrator(stub_source(Some("c2")), ProgressReporter::disabled(), &dir).await;

        let report = orchestrator.acquire_all(&series(), None).await.unwrap();

        assert_eq!(report.status, SeriesStatus::Partial);
        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].chapter_id, "c2");
        assert!(matches!(
            report.failures[0].error,
            AcquireError::PageFetch { page: 1, .. }
        ));

        let chapters = library.get_chapters("s1").await.unwrap();
        let c2 = chapters.iter().find(|c| c.id == "c2").unwrap();
        assert!(!c2.materialized);
        assert_eq!(
            library.get_series("s1").await.unwrap().status,
            SeriesStatus::Partial
        );

        let err = report.into_result().unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::ChaptersFailed { failed: 1, total: 3 }
        ));
    }

    #[tokio::test]
    async fn test_acquire_all_explicit_subset() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, library, fetcher) =
            orchestrator(stub_source(None), ProgressReporter::disabled(), &dir).await;

        let report = orchestrator
            .acquire_all(&series(), Some(vec![chapter("c3", "3")]))
            .await
            .unwrap();

        assert_eq!(report.total(), 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        let chapters = library.get_chapters("s1").await.unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].series_id, "s1");
    }

    #[tokio::test]
    async fn test_acquire_all_listing_failure_marks_partial() {
        let dir = TempDir::new().unwrap();
        let mut source = stub_source(None);
        source.fail_listing = true;
        let (orchestrator, library, _) =
            orchestrator(source, ProgressReporter::disabled(), &dir).await;

        let err = orchestrator.acquire_all(&series(), None).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::Source(_)));
        assert_eq!(
            library.get_series("s1").await.unwrap().status,
            SeriesStatus::Partial
        );
    }

    #[tokio::test]
    async fn test_acquire_all_chapter_record_failure_marks_partial() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, library, fetcher) =
            orchestrator(stub_source(None), ProgressReporter::disabled(), &dir).await;
        // The chapter row references a series that was never stored.
        let orphan = ChapterUnit {
            series_id: "not-in-library".to_string(),
            ..chapter("c1", "1")
        };

        let err = orchestrator
            .acquire_all(&series(), Some(vec![orphan]))
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Library(_)));
        assert_eq!(
            library.get_series("s1").await.unwrap().status,
            SeriesStatus::Partial
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_acquire_all_rejects_missing_series() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, _, _) =
            orchestrator(stub_source(None), ProgressReporter::disabled(), &dir).await;
        let err = orchestrator
            .acquire_all(&Series::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingArgument("series")));
    }

    #[tokio::test]
    async fn test_shutdown_fails_unstarted_chapters() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, library, fetcher) =
            orchestrator(stub_source(None), ProgressReporter::disabled(), &dir).await;
        orchestrator.shutdown();

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.acquire_all(&series(), None),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.failures.len(), 3);
        assert!(
            report
                .failures
                .iter()
                .all(|f| matches!(f.error, AcquireError::Shutdown))
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            library.get_series("s1").await.unwrap().status,
            SeriesStatus::Partial
        );
    }
}
