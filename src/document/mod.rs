//! Container assembly.
//!
//! - [`DocumentBuilder`] - Explicit-state EPUB builder fed one page at a time
//! - [`DocumentError`] - Usage and assembly errors
//! - Naming helpers: [`sanitize_filename`], [`format_chapter_title`],
//!   [`extension_for_mime`], [`container_file_name`]

mod builder;
mod error;
mod filename;

pub use builder::{BuilderPhase, DocumentBuilder, DocumentMetadata};
pub use error::DocumentError;
pub use filename::{
    CONTAINER_EXTENSION, container_file_name, extension_for_mime, format_chapter_title,
    sanitize_filename,
};
