//! Streaming EPUB assembly for one chapter (or one combined export).
//!
//! [`DocumentBuilder`] is an explicit two-state machine:
//!
//! ```text
//! Uninitialized --init--> Initialized --next/cover*--> Initialized --done--> Uninitialized
//! ```
//!
//! Pages are spooled to a private scratch directory as they arrive, so only
//! page metadata stays in memory until `done` writes the container. The
//! scratch directory is removed when the session ends, successfully or not.

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use epub_builder::{EpubBuilder, EpubContent, EpubVersion, ReferenceType, ZipLibrary};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, instrument};

use super::error::DocumentError;
use super::filename::{container_file_name, extension_for_mime, format_chapter_title};
use crate::model::{ChapterUnit, CoverImage, PageImage, Series};

/// Language used when a chapter carries no language tag.
const DEFAULT_LANGUAGE: &str = "en";

/// Author recorded when the series has no source name.
const DEFAULT_AUTHOR: &str = "unknown";

const GENERATOR: &str = "mangas";

const CHAPTER_DOCUMENT: &str = "chapter.xhtml";

/// Descriptive metadata written into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub language: String,
}

/// Observable state of a [`DocumentBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderPhase {
    Uninitialized,
    Initialized { pages: usize },
}

/// A page already written to scratch storage.
#[derive(Debug)]
struct SpooledPage {
    index: u32,
    content_type: String,
    path: PathBuf,
}

/// Everything owned by one `init .. done` session.
#[derive(Debug)]
struct Session {
    scratch: TempDir,
    metadata: DocumentMetadata,
    chapter_title: String,
    file_name: String,
    series_cover: Option<CoverImage>,
    chapter_cover: Option<CoverImage>,
    pages: Vec<SpooledPage>,
    seen: HashSet<u32>,
}

#[derive(Debug, Default)]
enum BuilderState {
    #[default]
    Uninitialized,
    Initialized(Box<Session>),
}

/// Accumulates page images into a finished EPUB container.
///
/// One builder must never be shared by concurrent chapters; each chapter
/// owns its builder and therefore its own scratch directory. A builder may be
/// reused for a fresh session after `done`.
///
/// # Example
///
/// ```no_run
/// use mangas_core::document::DocumentBuilder;
/// use mangas_core::model::{ChapterUnit, PageImage, Series};
///
/// # fn example(series: &Series, chapter: &ChapterUnit, png: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
/// let mut builder = DocumentBuilder::new("./downloads");
/// builder.init(series, chapter)?;
/// builder.next(PageImage::new(png, "image/png", 0))?;
/// let path = builder.done()?;
/// println!("wrote {}", path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DocumentBuilder {
    output_dir: PathBuf,
    state: BuilderState,
}

impl DocumentBuilder {
    /// Creates an uninitialized builder writing containers into `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            state: BuilderState::Uninitialized,
        }
    }

    /// Returns the directory finished containers are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> BuilderPhase {
        match &self.state {
            BuilderState::Uninitialized => BuilderPhase::Uninitialized,
            BuilderState::Initialized(session) => BuilderPhase::Initialized {
                pages: session.pages.len(),
            },
        }
    }

    /// Opens a session for `chapter` of `series`.
    ///
    /// # Errors
    ///
    /// - [`DocumentError::AlreadyInitialized`] if a session is open
    /// - [`DocumentError::MissingArgument`] if either record has no id
    /// - [`DocumentError::Io`] if the scratch directory cannot be created
    #[instrument(skip(self, series, chapter), fields(series_id = %series.id, chapter_id = %chapter.id))]
    pub fn init(&mut self, series: &Series, chapter: &ChapterUnit) -> Result<(), DocumentError> {
        if series.id.is_empty() {
            return Err(DocumentError::MissingArgument("series"));
        }
        if chapter.id.is_empty() {
            return Err(DocumentError::MissingArgument("chapter"));
        }

        let metadata = DocumentMetadata {
            title: series.name.clone(),
            author: if series.source.is_empty() {
                DEFAULT_AUTHOR.to_string()
            } else {
                series.source.clone()
            },
            description: Some(series.description.clone()).filter(|d| !d.is_empty()),
            language: if chapter.language.is_empty() {
                DEFAULT_LANGUAGE.to_string()
            } else {
                chapter.language.clone()
            },
        };
        let chapter_title = format_chapter_title(&chapter.volume, &chapter.number, &chapter.title);
        let file_name = container_file_name(&series.name, &chapter.number);

        self.open(metadata, chapter_title, file_name)
    }

    fn open(
        &mut self,
        metadata: DocumentMetadata,
        chapter_title: String,
        file_name: String,
    ) -> Result<(), DocumentError> {
        if matches!(self.state, BuilderState::Initialized(_)) {
            return Err(DocumentError::AlreadyInitialized);
        }

        let scratch = tempfile::Builder::new()
            .prefix("mangas-doc-")
            .tempdir()
            .map_err(|e| DocumentError::io(std::env::temp_dir(), e))?;
        debug!(scratch = %scratch.path().display(), "document session opened");

        self.state = BuilderState::Initialized(Box::new(Session {
            scratch,
            metadata,
            chapter_title,
            file_name,
            series_cover: None,
            chapter_cover: None,
            pages: Vec::new(),
            seen: HashSet::new(),
        }));
        Ok(())
    }

    fn session_mut(&mut self) -> Result<&mut Session, DocumentError> {
        match &mut self.state {
            BuilderState::Initialized(session) => Ok(session),
            BuilderState::Uninitialized => Err(DocumentError::NotInitialized),
        }
    }

    /// Sets the series cover, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// [`DocumentError::NotInitialized`] or [`DocumentError::EmptyContent`].
    pub fn set_series_cover(&mut self, cover: CoverImage) -> Result<(), DocumentError> {
        let session = self.session_mut()?;
        if cover.bytes.is_empty() {
            return Err(DocumentError::EmptyContent {
                what: "series cover",
            });
        }
        session.series_cover = Some(cover);
        Ok(())
    }

    /// Sets the chapter cover, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// [`DocumentError::NotInitialized`] or [`DocumentError::EmptyContent`].
    pub fn set_chapter_cover(&mut self, cover: CoverImage) -> Result<(), DocumentError> {
        let session = self.session_mut()?;
        if cover.bytes.is_empty() {
            return Err(DocumentError::EmptyContent {
                what: "chapter cover",
            });
        }
        session.chapter_cover = Some(cover);
        Ok(())
    }

    /// Adds a page. Pages may arrive in any order; ordinals must be unique.
    ///
    /// # Errors
    ///
    /// - [`DocumentError::NotInitialized`] before `init`
    /// - [`DocumentError::EmptyContent`] / [`DocumentError::MissingContentType`] on invalid pages
    /// - [`DocumentError::DuplicatePage`] if the ordinal was already used
    /// - [`DocumentError::Io`] if spooling to scratch fails
    pub fn next(&mut self, page: PageImage) -> Result<(), DocumentError> {
        let session = self.session_mut()?;
        if page.bytes.is_empty() {
            return Err(DocumentError::EmptyContent { what: "page" });
        }
        if page.content_type.trim().is_empty() {
            return Err(DocumentError::MissingContentType { index: page.index });
        }
        if !session.seen.insert(page.index) {
            return Err(DocumentError::DuplicatePage { index: page.index });
        }

        let name = page_entry_name(page.index, &page.content_type);
        let path = session.scratch.path().join(&name);
        if let Err(e) = fs::write(&path, &page.bytes) {
            session.seen.remove(&page.index);
            return Err(DocumentError::io(path, e));
        }

        session.pages.push(SpooledPage {
            index: page.index,
            content_type: page.content_type,
            path,
        });
        Ok(())
    }

    /// Writes the container into the output directory and ends the session.
    ///
    /// Returns the path of the finished container.
    ///
    /// # Errors
    ///
    /// - [`DocumentError::NotInitialized`] before `init`
    /// - [`DocumentError::NoPages`] if no page was added; the session stays open
    /// - [`DocumentError::Io`] / [`DocumentError::Epub`] on assembly failure; the session ends
    pub fn done(&mut self) -> Result<PathBuf, DocumentError> {
        let file_name = match &self.state {
            BuilderState::Initialized(session) => session.file_name.clone(),
            BuilderState::Uninitialized => return Err(DocumentError::NotInitialized),
        };
        let output = self.output_dir.join(file_name);
        self.done_to(&output)
    }

    /// Like [`done`](Self::done) but writes to an explicit path.
    ///
    /// # Errors
    ///
    /// Same as [`done`](Self::done).
    #[instrument(skip(self), fields(output = %output.display()))]
    pub fn done_to(&mut self, output: &Path) -> Result<PathBuf, DocumentError> {
        match &self.state {
            BuilderState::Uninitialized => return Err(DocumentError::NotInitialized),
            BuilderState::Initialized(session) if session.pages.is_empty() => {
                return Err(DocumentError::NoPages);
            }
            BuilderState::Initialized(_) => {}
        }

        let BuilderState::Initialized(session) = std::mem::take(&mut self.state) else {
            return Err(DocumentError::NotInitialized);
        };

        let pages = session.pages.len();
        let path = session.assemble(output)?;
        info!(pages, path = %path.display(), "container written");
        Ok(path)
    }
}

impl DocumentBuilder {
    /// Opens a session with explicit metadata, used for combined exports.
    ///
    /// # Errors
    ///
    /// [`DocumentError::AlreadyInitialized`], [`DocumentError::MissingArgument`]
    /// if the title is empty, or [`DocumentError::Io`].
    pub fn init_with_metadata(
        &mut self,
        metadata: DocumentMetadata,
        chapter_title: impl Into<String>,
    ) -> Result<(), DocumentError> {
        if metadata.title.is_empty() {
            return Err(DocumentError::MissingArgument("title"));
        }
        let chapter_title = chapter_title.into();
        let file_name = container_file_name(&metadata.title, "1");
        self.open(metadata, chapter_title, file_name)
    }
}

impl Session {
    fn assemble(mut self, output: &Path) -> Result<PathBuf, DocumentError> {
        self.pages.sort_by_key(|p| p.index);

        let zip = ZipLibrary::new().map_err(epub_error)?;
        let mut epub = EpubBuilder::new(zip).map_err(epub_error)?;
        epub.epub_version(EpubVersion::V30);
        epub.metadata("title", &self.metadata.title)
            .map_err(epub_error)?;
        epub.metadata("author", &self.metadata.author)
            .map_err(epub_error)?;
        epub.metadata("lang", &self.metadata.language)
            .map_err(epub_error)?;
        epub.metadata("generator", GENERATOR).map_err(epub_error)?;
        if let Some(description) = &self.metadata.description {
            epub.metadata("description", description)
                .map_err(epub_error)?;
        }

        if let Some(cover) = &self.series_cover {
            let name = format!("images/cover.{}", extension_for_mime(&cover.content_type));
            epub.add_cover_image(&name, cover.bytes.as_slice(), cover_mime(cover))
                .map_err(epub_error)?;
        }

        let mut figures: Vec<(String, String)> = Vec::with_capacity(self.pages.len() + 1);

        if let Some(cover) = &self.chapter_cover {
            let name = format!(
                "images/chapter_cover.{}",
                extension_for_mime(&cover.content_type)
            );
            epub.add_resource(&name, cover.bytes.as_slice(), cover_mime(cover))
                .map_err(epub_error)?;
            figures.push((name, "Chapter Cover".to_string()));
        }

        for (position, page) in self.pages.iter().enumerate() {
            let file = File::open(&page.path).map_err(|e| DocumentError::io(&page.path, e))?;
            let name = format!(
                "images/{}",
                page_entry_name(page.index, &page.content_type)
            );
            epub.add_resource(&name, file, page.content_type.as_str())
                .map_err(epub_error)?;
            figures.push((name, format!("Page {}", position + 1)));
        }

        let body = render_chapter(&self.chapter_title, &figures);
        epub.add_content(
            EpubContent::new(CHAPTER_DOCUMENT, body.as_bytes())
                .title(self.chapter_title.as_str())
                .reftype(ReferenceType::Text),
        )
        .map_err(epub_error)?;

        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| DocumentError::io(&dir, e))?;

        // Written beside the target and renamed, so a failed write never leaves a truncated container.
        let mut staged = NamedTempFile::new_in(&dir).map_err(|e| DocumentError::io(&dir, e))?;
        epub.generate(&mut staged).map_err(epub_error)?;
        staged
            .persist(output)
            .map_err(|e| DocumentError::io(output, e.error))?;

        debug!(scratch = %self.scratch.path().display(), "releasing document scratch");
        Ok(output.to_path_buf())
    }
}

fn page_entry_name(index: u32, content_type: &str) -> String {
    format!("page_{index:04}.{}", extension_for_mime(content_type))
}

fn cover_mime(cover: &CoverImage) -> &str {
    if cover.content_type.trim().is_empty() {
        "image/jpeg"
    } else {
        cover.content_type.as_str()
    }
}

#[allow(clippy::needless_pass_by_value)]
fn epub_error(e: impl std::fmt::Display) -> DocumentError {
    DocumentError::Epub(e.to_string())
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Renders the page-sequence XHTML body: a title block, then one figure per image.
fn render_chapter(title: &str, figures: &[(String, String)]) -> String {
    let title = escape_xml(title);
    let mut html = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
<title>{title}</title>
<style>
body {{ margin: 0; padding: 0; text-align: center; }}
.chapter-title {{ font-size: 2em; font-weight: bold; margin: 1em 0; page-break-after: always; }}
.page {{ page-break-after: always; margin: 0; padding: 0; }}
img {{ max-width: 100%; max-height: 100vh; height: auto; width: auto; display: block; margin: 0 auto; }}
</style>
</head>
<body>
<div class="chapter-title"><h1>{title}</h1></div>
"#
    );
    for (src, alt) in figures {
        html.push_str(&format!(
            "<div class=\"page\"><img src=\"{}\" alt=\"{}\"/></div>\n",
            escape_xml(src),
            escape_xml(alt)
        ));
    }
    html.push_str("</body>\n</html>\n");
    html
}
