//! Chapter acquisition pipeline.
//!
//! This module turns remote chapters into finished containers on disk:
//! a shared [`RateLimiter`] gates every request, [`ChapterAcquirer`]
//! downloads one chapter and [`SeriesOrchestrator`] runs many of them on a
//! bounded worker pool. Progress is published through a non-blocking
//! [`ProgressReporter`].
//!
//! # Features
//!
//! - One global permit stream shared by all workers
//! - Fixed worker ceiling (3 by default)
//! - Chapter failures contained at the chapter boundary
//! - At-most-once progress delivery that never stalls a worker

mod acquirer;
mod client;
pub mod constants;
mod error;
mod orchestrator;
pub mod progress;
pub mod rate_limiter;
mod selection;

pub use acquirer::{AcquireError, ChapterAcquirer};
pub use client::{FetchedImage, HttpClient, PageFetcher};
pub use constants::{DEFAULT_CONCURRENCY, DEFAULT_PROGRESS_BUFFER, DEFAULT_RATE_LIMIT_MS};
pub use error::DownloadError;
pub use orchestrator::{BatchReport, ChapterFailure, OrchestratorError, SeriesOrchestrator};
pub use progress::{ProgressEvent, ProgressReporter, ProgressStatus, progress_channel};
pub use rate_limiter::{LimiterClosed, RateLimiter};
pub use selection::{ChapterRange, ChapterSelection, EmptySelection};
