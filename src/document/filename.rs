//! Naming helpers for containers and the entries inside them.

/// Characters that are invalid in file names on at least one major platform.
const INVALID_FILENAME_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Fallback stem when sanitizing leaves nothing.
const EMPTY_NAME_FALLBACK: &str = "untitled";

/// Extension used for finished chapter containers.
pub const CONTAINER_EXTENSION: &str = "epub";

/// Replaces `/ \ : * ? " < > |` with `_` and trims surrounding whitespace
/// and dots.
///
/// # Examples
///
/// ```
/// use mangas_core::document::sanitize_filename;
///
/// assert_eq!(sanitize_filename("Test: Manga <With> Special/Chars"), "Test_ Manga _With_ Special_Chars");
/// assert_eq!(sanitize_filename("  ..hidden.. "), "hidden");
/// ```
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if INVALID_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    replaced
        .trim_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string()
}

/// Builds `{series}_{ch_number}.epub` from sanitized parts.
///
/// The language is not part of the name, so two translations of the same
/// chapter number map to the same file.
#[must_use]
pub fn container_file_name(series_name: &str, chapter_number: &str) -> String {
    let mut series = sanitize_filename(series_name);
    if series.is_empty() {
        series = EMPTY_NAME_FALLBACK.to_string();
    }
    let chapter = sanitize_filename(&format!("ch_{chapter_number}"));
    format!("{series}_{chapter}.{CONTAINER_EXTENSION}")
}

/// Maps an image MIME type to the extension used inside containers.
///
/// Unknown types fall back to `jpg`.
#[must_use]
pub fn extension_for_mime(content_type: &str) -> &'static str {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match media.as_str() {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// Formats `Vol. {volume}, Chapter {number}: {title}`.
///
/// The volume clause is omitted when the volume is empty or `"0"`, the
/// title clause when the title is empty. The chapter clause is always present.
///
/// # Examples
///
/// ```
/// use mangas_core::document::format_chapter_title;
///
/// assert_eq!(format_chapter_title("2", "10", "Arc"), "Vol. 2, Chapter 10: Arc");
/// assert_eq!(format_chapter_title("0", "3", ""), "Chapter 3");
/// ```
#[must_use]
pub fn format_chapter_title(volume: &str, number: &str, title: &str) -> String {
    let mut formatted = format!("Chapter {number}");
    if !volume.is_empty() && volume != "0" {
        formatted = format!("Vol. {volume}, {formatted}");
    }
    if !title.is_empty() {
        formatted = format!("{formatted}: {title}");
    }
    formatted
}
