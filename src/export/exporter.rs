//! Combined, device-optimized export of finished chapter containers.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use super::converter::{
    ConversionRequest, EbookConvert, ExportFormat, ExternalConverter, Kindlegen,
};
use super::error::ExportError;
use crate::document::{DocumentBuilder, DocumentMetadata};
use crate::imaging::{
    DeviceProfile, ImageTransformPipeline, OptimizationSettings, get_device_profile,
};
use crate::model::PageImage;

/// Pages per chapter encodable in a global ordinal.
pub const PAGES_PER_CHAPTER: usize = 1000;

const IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".webp"];

const COMBINED_CHAPTER_TITLE: &str = "Complete Volume";

const DEFAULT_LANGUAGE: &str = "en";

#[allow(clippy::expect_used)]
static PAGE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"page_(\d+)\.[A-Za-z0-9]+$").expect("page regex is valid") // Static pattern, safe to panic
});

/// Computes the global ordinal of a page in a combined export.
///
/// ```
/// use mangas_core::export::global_ordinal;
///
/// assert_eq!(global_ordinal(1, 2).unwrap(), 1002);
/// assert!(global_ordinal(0, 1000).is_err());
/// ```
///
/// # Errors
///
/// Returns [`ExportError::TooManyPages`] when `page_index` does not fit in
/// the per-chapter range or the result overflows.
pub fn global_ordinal(chapter_index: usize, page_index: usize) -> Result<u32, ExportError> {
    let too_many = || ExportError::TooManyPages {
        chapter: chapter_index,
        page: page_index,
    };
    if page_index >= PAGES_PER_CHAPTER {
        return Err(too_many());
    }
    chapter_index
        .checked_mul(PAGES_PER_CHAPTER)
        .and_then(|base| base.checked_add(page_index))
        .and_then(|ordinal| u32::try_from(ordinal).ok())
        .ok_or_else(too_many)
}

/// Parameters of one export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Device id from the catalogue, e.g. `kindle-paperwhite3`.
    pub device: String,
    pub format: ExportFormat,
    /// Title of the combined work. Required.
    pub title: String,
    pub author: Option<String>,
    /// Requested output path; the extension is replaced per format.
    pub output: PathBuf,
    /// Re-encode pages for the device. When off, pages are copied as is.
    pub optimize: bool,
    /// Reading direction hint for converters.
    pub right_to_left: bool,
}

impl ExportOptions {
    /// Creates options with optimization and right-to-left reading enabled.
    #[must_use]
    pub fn new(device: impl Into<String>, title: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            format: ExportFormat::Epub,
            title: title.into(),
            author: None,
            output: output.into(),
            optimize: true,
            right_to_left: true,
        }
    }
}

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    /// Final file in the requested format.
    pub path: PathBuf,
    /// The combined container the final file was made from.
    pub container: PathBuf,
    pub format: ExportFormat,
    /// Converter that produced `path`, `None` for native output.
    pub converter: Option<&'static str>,
    pub pages: usize,
}

/// Re-optimizes finished containers for a device and combines them.
pub struct DeviceExporter {
    converters: Vec<Box<dyn ExternalConverter>>,
}

impl std::fmt::Debug for DeviceExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.converters.iter().map(|c| c.name()).collect();
        f.debug_struct("DeviceExporter")
            .field("converters", &names)
            .finish()
    }
}

impl Default for DeviceExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceExporter {
    /// Creates an exporter with the standard cascade: `ebook-convert`, then
    /// `kindlegen`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_converters(vec![Box::new(EbookConvert::new()), Box::new(Kindlegen::new())])
    }

    /// Creates an exporter trying `converters` in order.
    #[must_use]
    pub fn with_converters(converters: Vec<Box<dyn ExternalConverter>>) -> Self {
        Self { converters }
    }

    /// Exports `containers` (in reading order) as one combined work.
    ///
    /// Cover images are left out. Pages that fail to decode are skipped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// - [`ExportError::NoContainers`], [`ExportError::UnknownDevice`]
    /// - [`ExportError::Container`] if an input cannot be read
    /// - [`ExportError::TooManyPages`] past the per-chapter page cap
    /// - [`ExportError::Document`] if the combined container cannot be built
    /// - [`ExportError::NoConverterAvailable`] if conversion was requested and
    ///   every converter failed; the combined container is kept
    #[instrument(skip(self, containers, options), fields(device = %options.device, format = %options.format, inputs = containers.len()))]
    pub async fn convert(
        &self,
        containers: &[PathBuf],
        options: &ExportOptions,
    ) -> Result<ExportOutcome, ExportError> {
        if containers.is_empty() {
            return Err(ExportError::NoContainers);
        }
        let device = get_device_profile(&options.device)
            .ok_or_else(|| ExportError::UnknownDevice(options.device.clone()))?;
        let pipeline = options
            .optimize
            .then(|| ImageTransformPipeline::new(OptimizationSettings::for_profile(device)));

        let mut pages = Vec::new();
        for (chapter_index, path) in containers.iter().enumerate() {
            let path = path.clone();
            let chapter_pages = tokio::task::spawn_blocking(move || {
                extract_chapter(&path, chapter_index, pipeline.as_ref())
            })
            .await
            .map_err(|e| ExportError::Task(e.to_string()))??;
            debug!(chapter_index, pages = chapter_pages.len(), "chapter extracted");
            pages.extend(chapter_pages);
        }

        let page_count = pages.len();
        let container = options.output.with_extension(ExportFormat::Epub.extension());
        let metadata = combined_metadata(options, device);
        let target = container.clone();
        let container = tokio::task::spawn_blocking(move || {
            let mut builder = DocumentBuilder::new(parent_dir(&target));
            builder.init_with_metadata(metadata, COMBINED_CHAPTER_TITLE)?;
            for page in pages {
                builder.next(page)?;
            }
            builder.done_to(&target)
        })
        .await
        .map_err(|e| ExportError::Task(e.to_string()))??;
        info!(path = %container.display(), pages = page_count, "combined container written");

        if !options.format.needs_conversion() {
            return Ok(ExportOutcome {
                path: container.clone(),
                container,
                format: ExportFormat::Epub,
                converter: None,
                pages: page_count,
            });
        }

        let output = options.output.with_extension(options.format.extension());
        let request = ConversionRequest {
            format: options.format,
            title: Some(options.title.clone()),
            author: options.author.clone(),
            right_to_left: options.right_to_left,
        };

        let mut attempts = Vec::with_capacity(self.converters.len());
        for converter in &self.converters {
            match converter.convert(&container, &output, &request).await {
                Ok(()) => {
                    info!(converter = converter.name(), path = %output.display(), "conversion complete");
                    return Ok(ExportOutcome {
                        path: output,
                        container,
                        format: options.format,
                        converter: Some(converter.name()),
                        pages: page_count,
                    });
                }
                Err(e) => {
                    warn!(converter = converter.name(), error = %e, "converter failed, trying next");
                    attempts.push(e.to_string());
                }
            }
        }

        Err(ExportError::NoConverterAvailable {
            fallback: container,
            attempts,
        })
    }
}

fn combined_metadata(options: &ExportOptions, device: &DeviceProfile) -> DocumentMetadata {
    DocumentMetadata {
        title: options.title.clone(),
        author: options
            .author
            .clone()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| "unknown".to_string()),
        description: Some(format!("Optimized for {}", device.name)),
        language: DEFAULT_LANGUAGE.to_string(),
    }
}

/// Reads the non-cover page images of one container in page order.
fn extract_chapter(
    path: &Path,
    chapter_index: usize,
    pipeline: Option<&ImageTransformPipeline>,
) -> Result<Vec<PageImage>, ExportError> {
    let container_error = |source: zip::result::ZipError| ExportError::Container {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|e| container_error(e.into()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(container_error)?;

    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(container_error)?;
        let name = entry.name().to_string();
        if entry.is_dir() || !is_page_entry(&name) {
            continue;
        }
        let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        if let Err(e) = entry.read_to_end(&mut bytes) {
            warn!(entry = %name, error = %e, "skipping unreadable entry");
            continue;
        }
        entries.push((name, bytes));
    }
    entries.sort_by(|(a, _), (b, _)| page_sort_key(a).cmp(&page_sort_key(b)));

    let mut pages = Vec::with_capacity(entries.len());
    for (name, bytes) in entries {
        let (bytes, content_type) = match pipeline {
            Some(pipeline) => match pipeline.process(&bytes) {
                Ok(encoded) => (encoded.bytes, encoded.content_type.to_string()),
                Err(e) => {
                    warn!(entry = %name, error = %e, "skipping page that failed to optimize");
                    continue;
                }
            },
            None => (bytes, mime_for_entry(&name).to_string()),
        };
        let index = global_ordinal(chapter_index, pages.len())?;
        pages.push(PageImage::new(bytes, content_type, index));
    }
    Ok(pages)
}

fn is_page_entry(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) && !lower.contains("cover")
}

/// Orders by the numeric page index when present, then by name.
fn page_sort_key(name: &str) -> (Option<u64>, &str) {
    let number = PAGE_NUMBER
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());
    (number, name)
}

fn mime_for_entry(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_global_ordinal() {
        assert_eq!(global_ordinal(0, 0).unwrap(), 0);
        assert_eq!(global_ordinal(1, 2).unwrap(), 1002);
        assert_eq!(global_ordinal(3, 999).unwrap(), 3999);
        assert!(matches!(
            global_ordinal(2, 1000),
            Err(ExportError::TooManyPages { chapter: 2, page: 1000 })
        ));
    }

    #[test]
    fn test_is_page_entry_filters_covers_and_non_images() {
        assert!(is_page_entry("OEBPS/images/page_0001.jpg"));
        assert!(is_page_entry("OEBPS/images/page_0002.PNG"));
        assert!(is_page_entry("OEBPS/images/page_0003.webp"));
        assert!(!is_page_entry("OEBPS/images/cover.jpg"));
        assert!(!is_page_entry("OEBPS/images/chapter_cover.png"));
        assert!(!is_page_entry("OEBPS/chapter.xhtml"));
    }

    #[test]
    fn test_page_sort_key_is_numeric() {
        let mut names = vec![
            "OEBPS/images/page_10000.jpg",
            "OEBPS/images/page_0002.jpg",
            "OEBPS/images/page_0010.jpg",
        ];
        names.sort_by(|a, b| page_sort_key(a).cmp(&page_sort_key(b)));
        assert_eq!(
            names,
            vec![
                "OEBPS/images/page_0002.jpg",
                "OEBPS/images/page_0010.jpg",
                "OEBPS/images/page_10000.jpg",
            ]
        );
    }

    #[test]
    fn test_mime_for_entry() {
        assert_eq!(mime_for_entry("a/page_1.PNG"), "image/png");
        assert_eq!(mime_for_entry("a/page_1.webp"), "image/webp");
        assert_eq!(mime_for_entry("a/page_1.jpeg"), "image/jpeg");
    }

    #[tokio::test]
    async fn test_convert_rejects_empty_input_and_unknown_device() {
        let exporter = DeviceExporter::with_converters(Vec::new());
        let options = ExportOptions::new("kindle-voyage", "Vol", "/tmp/out.epub");
        let err = exporter.convert(&[], &options).await.unwrap_err();
        assert!(matches!(err, ExportError::NoContainers));

        let options = ExportOptions::new("nook", "Vol", "/tmp/out.epub");
        let err = exporter
            .convert(&[PathBuf::from("/tmp/x.epub")], &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::UnknownDevice(_)));
        assert!(err.is_usage_error());
    }
}
