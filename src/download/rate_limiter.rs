//! Global rate limiting for source and page requests.
//!
//! This module provides the [`RateLimiter`] struct which issues one permit per
//! fixed interval to every caller in the process. All workers contend for the
//! same permit stream, so the limiter bounds the aggregate request rate rather
//! than per-worker throughput: raising the worker count beyond what the
//! interval allows does not make acquisition faster.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mangas_core::download::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_millis(500)));
//!
//! // First permit is immediate
//! limiter.acquire().await.ok();
//!
//! // Every later permit is spaced by the interval, whoever asks for it
//! limiter.acquire().await.ok();
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Returned by [`RateLimiter::acquire`] after [`RateLimiter::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limiter closed")]
pub struct LimiterClosed;

/// Process-wide fixed-interval permit source.
///
/// Designed to be wrapped in `Arc` and shared by every worker. Waiters queue
/// on a fair `tokio::sync::Mutex`, so permits are handed out in arrival order.
///
/// # Shutdown
///
/// [`close`](Self::close) wakes every waiter with [`LimiterClosed`] and makes
/// later calls fail immediately, so shutdown never blocks on a sleeping
/// worker.
#[derive(Debug)]
pub struct RateLimiter {
    /// Time between consecutive permits.
    interval: Duration,

    /// Whether rate limiting is disabled (for `--rate-limit 0`).
    disabled: bool,

    /// Time the previous permit was issued.
    /// `None` until the first permit, which is issued without delay.
    last_permit: Mutex<Option<Instant>>,

    /// Total permits issued, for diagnostics and tests.
    issued: AtomicU64,

    /// Flipped to `true` by `close()`.
    closed: watch::Sender<bool>,
}

impl RateLimiter {
    /// Creates a limiter issuing one permit per `interval`.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use mangas_core::download::RateLimiter;
    ///
    /// let limiter = RateLimiter::new(Duration::from_millis(500));
    /// assert_eq!(limiter.interval(), Duration::from_millis(500));
    /// ```
    #[must_use]
    #[instrument(skip_all, fields(interval_ms = interval.as_millis()))]
    pub fn new(interval: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            interval,
            disabled: interval.is_zero(),
            last_permit: Mutex::new(None),
            issued: AtomicU64::new(0),
            closed: watch::Sender::new(false),
        }
    }

    /// Creates a disabled rate limiter that applies no delays.
    ///
    /// Closing still works, so shutdown semantics are the same.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns whether rate limiting is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the interval between permits.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns how many permits have been issued so far.
    #[must_use]
    pub fn permits_issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Returns whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Blocks until the next permit is available.
    ///
    /// The first permit is issued immediately; each later one no sooner than
    /// `interval` after the previous.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterClosed`] if the limiter is closed before or while
    /// waiting.
    #[instrument(level = "trace", skip(self))]
    pub async fn acquire(&self) -> Result<(), LimiterClosed> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(LimiterClosed);
        }

        if self.disabled {
            self.issued.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        let mut last_permit = tokio::select! {
            guard = self.last_permit.lock() => guard,
            _ = closed.wait_for(|c| *c) => return Err(LimiterClosed),
        };

        if let Some(last) = *last_permit {
            let next = last + self.interval;
            let now = Instant::now();
            if next > now {
                debug!(delay_ms = (next - now).as_millis(), "waiting for permit");
                tokio::select! {
                    () = tokio::time::sleep_until(next) => {}
                    _ = closed.wait_for(|c| *c) => return Err(LimiterClosed),
                }
            }
        }

        *last_permit = Some(Instant::now());
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Releases every waiter and rejects all future acquisitions.
    #[instrument(skip(self))]
    pub fn close(&self) {
        if !self.closed.send_replace(true) {
            debug!(issued = self.permits_issued(), "rate limiter closed");
        }
    }
}
