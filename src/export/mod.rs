//! Device export: combine finished chapters into one optimized work.
//!
//! [`DeviceExporter::convert`] re-reads each chapter container, runs its
//! pages through the device's image pipeline, assembles one combined
//! container and, for non-native formats, tries each [`ExternalConverter`]
//! in turn.

mod converter;
mod error;
mod exporter;

pub use converter::{ConversionRequest, EbookConvert, ExportFormat, ExternalConverter, Kindlegen};
pub use error::{ConvertError, ExportError};
pub use exporter::{DeviceExporter, ExportOptions, ExportOutcome, PAGES_PER_CHAPTER, global_ordinal};
