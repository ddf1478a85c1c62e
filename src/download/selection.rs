//! Chapter filtering ahead of a batch.

use thiserror::Error;
use tracing::debug;

use crate::model::ChapterUnit;

/// Returned when no chapter survives the filters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no chapters to download after applying filters ({available} available)")]
pub struct EmptySelection {
    pub available: usize,
}

/// Inclusive numeric chapter range, parsed from `"a-b"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChapterRange {
    pub start: f64,
    pub end: f64,
}

impl ChapterRange {
    /// Parses `"a-b"`. Anything else yields `None`.
    ///
    /// ```
    /// use mangas_core::download::ChapterRange;
    ///
    /// let range = ChapterRange::parse("1-2.5").unwrap();
    /// assert!(range.contains(2.5));
    /// assert!(ChapterRange::parse("5").is_none());
    /// ```
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (start, end) = raw.split_once('-')?;
        if end.contains('-') {
            return None;
        }
        let start = start.trim().parse::<f64>().ok()?;
        let end = end.trim().parse::<f64>().ok()?;
        Some(Self { start, end })
    }

    #[must_use]
    pub fn contains(&self, number: f64) -> bool {
        number >= self.start && number <= self.end
    }
}

/// Filters applied to a series' chapter list, in order: language, ids, range.
#[derive(Debug, Clone, Default)]
pub struct ChapterSelection {
    /// Keep only chapters with this language tag.
    pub language: Option<String>,
    /// Keep only these chapter ids.
    pub chapter_ids: Vec<String>,
    /// Raw range text such as `"1-10"`. Malformed text disables the filter.
    pub range: Option<String>,
}

impl ChapterSelection {
    /// Applies every configured filter, preserving the input order.
    #[must_use]
    pub fn apply(&self, chapters: Vec<ChapterUnit>) -> Vec<ChapterUnit> {
        let range = self.range.as_deref().and_then(|r| {
            let parsed = ChapterRange::parse(r);
            if parsed.is_none() {
                debug!(range = r, "ignoring malformed chapter range");
            }
            parsed
        });

        chapters
            .into_iter()
            .filter(|c| match self.language.as_deref() {
                Some(lang) if !lang.is_empty() => c.language == lang,
                _ => true,
            })
            .filter(|c| self.chapter_ids.is_empty() || self.chapter_ids.contains(&c.id))
            .filter(|c| match range {
                // Chapters without a numeric number cannot be placed in a range.
                Some(range) => c
                    .number
                    .trim()
                    .parse::<f64>()
                    .is_ok_and(|n| range.contains(n)),
                None => true,
            })
            .collect()
    }

    /// Like [`apply`](Self::apply) but rejects an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`EmptySelection`] when nothing is left to download.
    pub fn select(&self, chapters: Vec<ChapterUnit>) -> Result<Vec<ChapterUnit>, EmptySelection> {
        let available = chapters.len();
        let selected = self.apply(chapters);
        if selected.is_empty() {
            return Err(EmptySelection { available });
        }
        debug!(available, selected = selected.len(), "chapters selected");
        Ok(selected)
    }
}
