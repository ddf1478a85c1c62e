//! Single-chapter acquisition: page list, rate-limited fetches, assembly.
//!
//! [`ChapterAcquirer::acquire`] runs one chapter start to finish:
//!
//! 1. Wait for a rate-limiter permit and report `fetching`
//! 2. Resolve the page URL list from the [`Source`]
//! 3. Open a [`DocumentBuilder`] session and attach covers when available
//! 4. Fetch every page in order, one permit per request
//! 5. Write the container and record it in the library
//!
//! A failing page ends the chapter; no partial container is written.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::client::PageFetcher;
use super::error::DownloadError;
use super::progress::{ProgressEvent, ProgressReporter, ProgressStatus};
use super::rate_limiter::{LimiterClosed, RateLimiter};
use crate::document::{DocumentBuilder, DocumentError};
use crate::library::{LibraryError, LibraryRepository};
use crate::model::{ChapterUnit, CoverImage, PageImage, Series};
use crate::source::{Source, SourceError};

/// Errors that end the acquisition of one chapter.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// A required record was absent (empty id).
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    /// Shutdown closed the rate limiter or the worker pool before the
    /// chapter could finish.
    #[error("acquisition shut down before the chapter finished")]
    Shutdown,

    /// The source could not list the chapter's pages.
    #[error("failed to resolve pages for chapter {chapter_id}: {source}")]
    PageList {
        chapter_id: String,
        #[source]
        source: SourceError,
    },

    /// The source returned an empty page list.
    #[error("chapter {chapter_id} has no pages")]
    NoPages { chapter_id: String },

    /// One page could not be fetched.
    #[error("failed to fetch page {page} ({url}): {source}")]
    PageFetch {
        /// 1-based page position.
        page: usize,
        url: String,
        #[source]
        source: DownloadError,
    },

    /// Building or writing the container failed.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// The container was written but the library could not record it.
    #[error("failed to record chapter {chapter_id}: {source}")]
    Persist {
        chapter_id: String,
        #[source]
        source: LibraryError,
    },

    /// The blocking assembly task panicked or was cancelled.
    #[error("assembly task failed: {0}")]
    Task(String),
}

impl From<LimiterClosed> for AcquireError {
    fn from(_: LimiterClosed) -> Self {
        Self::Shutdown
    }
}

impl AcquireError {
    /// Returns true for caller mistakes rather than transient failures.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        match self {
            Self::MissingArgument(_) => true,
            Self::Document(e) => e.is_usage_error(),
            _ => false,
        }
    }
}

/// Downloads one chapter into a finished container.
///
/// Cheap to clone: every collaborator is shared behind an `Arc`, so one
/// acquirer can be handed to each worker task.
#[derive(Clone)]
pub struct ChapterAcquirer {
    source: Arc<dyn Source>,
    fetcher: Arc<dyn PageFetcher>,
    repository: Arc<dyn LibraryRepository>,
    rate_limiter: Arc<RateLimiter>,
    progress: ProgressReporter,
    output_dir: PathBuf,
}

impl std::fmt::Debug for ChapterAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChapterAcquirer")
            .field("source", &self.source.name())
            .field("rate_limiter", &self.rate_limiter)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl ChapterAcquirer {
    #[must_use]
    pub fn new(
        source: Arc<dyn Source>,
        fetcher: Arc<dyn PageFetcher>,
        repository: Arc<dyn LibraryRepository>,
        rate_limiter: Arc<RateLimiter>,
        progress: ProgressReporter,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            fetcher,
            repository,
            rate_limiter,
            progress,
            output_dir: output_dir.into(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    #[must_use]
    pub fn repository(&self) -> &Arc<dyn LibraryRepository> {
        &self.repository
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    #[must_use]
    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    /// Acquires `chapter` of `series` and returns the container path.
    ///
    /// A terminal `complete` or `error` progress event is always attempted,
    /// except for argument errors which are returned before any event.
    ///
    /// # Errors
    ///
    /// See [`AcquireError`]. On any error the chapter stays unmaterialized.
    #[instrument(skip(self, series, chapter), fields(series_id = %series.id, chapter_id = %chapter.id))]
    pub async fn acquire(
        &self,
        series: &Series,
        chapter: &ChapterUnit,
    ) -> Result<PathBuf, AcquireError> {
        if series.id.is_empty() {
            return Err(AcquireError::MissingArgument("series"));
        }
        if chapter.id.is_empty() {
            return Err(AcquireError::MissingArgument("chapter"));
        }

        let mut counts = (0, 0);
        match self.run(series, chapter, &mut counts).await {
            Ok(path) => {
                info!(path = %path.display(), pages = counts.1, "chapter materialized");
                self.progress.emit(
                    ProgressEvent::new(series, chapter, ProgressStatus::Complete)
                        .with_counts(counts.0, counts.1),
                );
                Ok(path)
            }
            Err(e) => {
                warn!(error = %e, "chapter acquisition failed");
                self.progress.emit(
                    ProgressEvent::new(series, chapter, ProgressStatus::Error)
                        .with_counts(counts.0, counts.1)
                        .with_error(e.to_string()),
                );
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        series: &Series,
        chapter: &ChapterUnit,
        counts: &mut (usize, usize),
    ) -> Result<PathBuf, AcquireError> {
        self.rate_limiter.acquire().await?;
        self.progress
            .emit(ProgressEvent::new(series, chapter, ProgressStatus::Fetching));

        let urls = self
            .source
            .get_pages(series, chapter)
            .await
            .map_err(|source| AcquireError::PageList {
                chapter_id: chapter.id.clone(),
                source,
            })?;
        if urls.is_empty() {
            return Err(AcquireError::NoPages {
                chapter_id: chapter.id.clone(),
            });
        }
        let total = urls.len();
        *counts = (0, total);
        debug!(total, "page list resolved");

        let mut builder = DocumentBuilder::new(&self.output_dir);
        builder.init(series, chapter)?;
        self.attach_covers(&mut builder, series, chapter).await?;

        for (position, url) in urls.iter().enumerate() {
            self.rate_limiter.acquire().await?;
            let fetched =
                self.fetcher
                    .fetch(url)
                    .await
                    .map_err(|source| AcquireError::PageFetch {
                        page: position + 1,
                        url: url.clone(),
                        source,
                    })?;
            let index = u32::try_from(position).unwrap_or(u32::MAX);
            builder.next(PageImage::new(fetched.bytes, fetched.content_type, index))?;

            *counts = (position + 1, total);
            self.progress.emit(
                ProgressEvent::new(series, chapter, ProgressStatus::Fetching)
                    .with_counts(position + 1, total),
            );
        }

        self.progress.emit(
            ProgressEvent::new(series, chapter, ProgressStatus::Assembling)
                .with_counts(total, total),
        );
        let path = tokio::task::spawn_blocking(move || builder.done())
            .await
            .map_err(|e| AcquireError::Task(e.to_string()))??;

        self.repository
            .update_chapter_materialized(&chapter.id, true, Some(&path))
            .await
            .map_err(|source| AcquireError::Persist {
                chapter_id: chapter.id.clone(),
                source,
            })?;

        Ok(path)
    }

    /// Attaches the series cover and, when it differs, the chapter cover.
    ///
    /// Cover failures are logged and skipped. Only shutdown is propagated.
    async fn attach_covers(
        &self,
        builder: &mut DocumentBuilder,
        series: &Series,
        chapter: &ChapterUnit,
    ) -> Result<(), AcquireError> {
        self.rate_limiter.acquire().await?;
        let series_url = match self.source.series_cover_url(series).await {
            Ok(url) => Some(url),
            Err(e) => {
                debug!(error = %e, "no series cover");
                None
            }
        };
        if let Some(url) = &series_url {
            if let Some(cover) = self.fetch_cover(url).await? {
                if let Err(e) = builder.set_series_cover(cover) {
                    debug!(error = %e, "series cover rejected");
                }
            }
        }

        self.rate_limiter.acquire().await?;
        let chapter_url = match self.source.chapter_cover_url(series, chapter).await {
            Ok(url) => url,
            Err(e) => {
                debug!(error = %e, "no chapter cover");
                return Ok(());
            }
        };
        if series_url.as_deref() == Some(chapter_url.as_str()) {
            return Ok(());
        }
        if let Some(cover) = self.fetch_cover(&chapter_url).await? {
            if let Err(e) = builder.set_chapter_cover(cover) {
                debug!(error = %e, "chapter cover rejected");
            }
        }
        Ok(())
    }

    async fn fetch_cover(&self, url: &str) -> Result<Option<CoverImage>, AcquireError> {
        self.rate_limiter.acquire().await?;
        match self.fetcher.fetch(url).await {
            Ok(fetched) => Ok(Some(CoverImage::new(fetched.bytes, fetched.content_type))),
            Err(e) => {
                debug!(url, error = %e, "cover fetch failed");
                Ok(None)
            }
        }
    }
}
