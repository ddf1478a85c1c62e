//! Best-effort progress events for chapter acquisition.
//!
//! Workers publish [`ProgressEvent`]s through a [`ProgressReporter`] onto a
//! bounded channel. Publishing never waits: when the buffer is full the event
//! is dropped and counted, so a slow consumer can never stall a download.
//! Consumers must tolerate gaps; only the terminal `Complete`/`Error` event of
//! each chapter is guaranteed to be *attempted*.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::model::{ChapterUnit, Series};

/// Stage a chapter has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    /// Accepted into a batch, waiting for a worker.
    Queued,
    /// Resolving or downloading pages.
    Fetching,
    /// Writing the container.
    Assembling,
    /// Container written and recorded.
    Complete,
    /// The chapter failed; see [`ProgressEvent::error`].
    Error,
}

impl ProgressStatus {
    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Assembling => "assembling",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// Returns true for `Complete` and `Error`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub series_id: String,
    pub chapter_id: String,
    /// Display number of the chapter (free text).
    pub chapter_number: String,
    /// Pages fetched so far.
    pub current: usize,
    /// Total pages, zero until the page list is known.
    pub total: usize,
    pub status: ProgressStatus,
    /// Failure detail for `Error` events.
    pub error: Option<String>,
}

impl ProgressEvent {
    /// Creates an event for `chapter` with zero page counters.
    #[must_use]
    pub fn new(series: &Series, chapter: &ChapterUnit, status: ProgressStatus) -> Self {
        Self {
            series_id: series.id.clone(),
            chapter_id: chapter.id.clone(),
            chapter_number: chapter.number.clone(),
            current: 0,
            total: 0,
            status,
            error: None,
        }
    }

    /// Sets the page counters.
    #[must_use]
    pub fn with_counts(mut self, current: usize, total: usize) -> Self {
        self.current = current;
        self.total = total;
        self
    }

    /// Attaches failure detail.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Cloneable, non-blocking producer handle for progress events.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::Sender<ProgressEvent>,
    dropped: Arc<AtomicU64>,
}

impl ProgressReporter {
    /// Creates a reporter whose events go nowhere.
    #[must_use]
    pub fn disabled() -> Self {
        let (reporter, _rx) = progress_channel(1);
        reporter
    }

    /// Publishes `event` without waiting.
    ///
    /// Returns `false` if the event was dropped because the buffer is full
    /// or every receiver is gone.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    chapter_id = %event.chapter_id,
                    status = %event.status,
                    dropped,
                    "progress buffer full, event dropped"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Returns how many events were dropped on a full buffer.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Creates a progress channel buffering up to `capacity` events (minimum 1).
#[must_use]
pub fn progress_channel(capacity: usize) -> (ProgressReporter, mpsc::Receiver<ProgressEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ProgressReporter {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}
