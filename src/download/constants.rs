//! Constants for the download module (timeouts, rate limiting, worker pool).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (2 minutes per page or API call).
pub const READ_TIMEOUT_SECS: u64 = 120;

/// Default interval between rate-limiter permits, in milliseconds (2 req/sec).
pub const DEFAULT_RATE_LIMIT_MS: u64 = 500;

/// Default number of chapters acquired in parallel.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default progress channel buffer; events beyond it are dropped.
pub const DEFAULT_PROGRESS_BUFFER: usize = 100;

/// Content type assumed when a page response carries none.
pub const DEFAULT_PAGE_CONTENT_TYPE: &str = "image/jpeg";

/// Upper bound on a single page body (64 MiB).
pub const MAX_PAGE_BYTES: usize = 64 * 1024 * 1024;
