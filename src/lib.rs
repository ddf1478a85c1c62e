//! Mangas Core Library
//!
//! This library provides the core functionality for the mangas tool, which
//! archives illustrated serialized works from online catalogues into EPUB
//! containers and re-packages them for e-reader devices.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`library`] - Persisted series and chapter state
//! - [`source`] - Catalogue clients that resolve series, chapters and pages
//! - [`download`] - Rate-limited page fetching and the chapter pipeline
//! - [`document`] - Single-use EPUB builder sessions
//! - [`imaging`] - Device profiles and the image transform pipeline
//! - [`export`] - Device-optimized combination and external conversion
//! - [`config`] - File configuration and resolved settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod document;
pub mod download;
pub mod export;
pub mod imaging;
pub mod library;
pub mod model;
pub mod source;
mod user_agent;

// Re-export commonly used types
pub use db::{Database, DbError};
pub use document::{DocumentBuilder, DocumentError};
pub use download::{
    ChapterAcquirer, ChapterSelection, DEFAULT_CONCURRENCY, HttpClient, PageFetcher,
    ProgressEvent, ProgressStatus, RateLimiter, SeriesOrchestrator,
};
pub use export::{DeviceExporter, ExportError, ExportFormat, ExportOptions};
pub use imaging::{DeviceProfile, ImageTransformPipeline, OptimizationSettings, get_device_profile};
pub use library::{Library, LibraryError, LibraryRepository};
pub use model::{ChapterUnit, CoverImage, PageImage, Series, SeriesStatus, SeriesSummary};
pub use source::{MangaDex, Source, SourceError};
