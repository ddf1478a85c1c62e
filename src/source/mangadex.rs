//! MangaDex catalogue client.
//!
//! Talks to the public REST API at `api.mangadex.org`. Page images are served
//! by the "at-home" network: the API hands out a base URL plus a chapter hash
//! and each page lives at `{baseUrl}/data/{hash}/{file}`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument};
use url::Url;

use super::{Source, SourceError};
use crate::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::model::{ChapterUnit, Series, SeriesStatus, SeriesSummary};
use crate::user_agent;

/// Default MangaDex API base URL.
const DEFAULT_API_URL: &str = "https://api.mangadex.org";

/// Default host serving cover art.
const DEFAULT_UPLOADS_URL: &str = "https://uploads.mangadex.org";

const SOURCE_NAME: &str = "mangadex";

/// Maximum page size the feed endpoint accepts.
const FEED_PAGE_LIMIT: usize = 500;

const SEARCH_LIMIT: &str = "20";

const PREFERRED_LANGUAGE: &str = "en";

// ==================== MangaDex API Response Types ====================

#[derive(Debug, Deserialize)]
struct Collection<T> {
    data: Vec<T>,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
struct Entity<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
struct MangaAttributes {
    #[serde(default, deserialize_with = "localized")]
    title: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "localized")]
    description: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    #[serde(rename = "type")]
    kind: String,
    attributes: Option<FileAttributes>,
}

#[derive(Debug, Deserialize)]
struct FileAttributes {
    #[serde(rename = "fileName")]
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterData {
    id: String,
    attributes: ChapterAttributes,
}

#[derive(Debug, Deserialize)]
struct ChapterAttributes {
    title: Option<String>,
    #[serde(rename = "translatedLanguage")]
    translated_language: Option<String>,
    volume: Option<String>,
    chapter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtHomeResponse {
    #[serde(rename = "baseUrl")]
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Debug, Deserialize)]
struct AtHomeChapter {
    hash: String,
    data: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CoverData {
    attributes: FileAttributes,
}

/// Localized string maps come back as `[]` instead of `{}` when empty.
fn localized<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Localized {
        Map(BTreeMap<String, String>),
        Empty(Vec<serde_json::Value>),
    }

    Ok(match Localized::deserialize(deserializer)? {
        Localized::Map(map) => map,
        Localized::Empty(_) => BTreeMap::new(),
    })
}

/// Picks the English value, falling back to the first language in key order.
fn pick_localized(values: &BTreeMap<String, String>) -> String {
    values
        .get(PREFERRED_LANGUAGE)
        .or_else(|| values.values().next())
        .cloned()
        .unwrap_or_default()
}

// ==================== MangaDex ====================

/// Client for the MangaDex public API.
#[derive(Debug, Clone)]
pub struct MangaDex {
    client: Client,
    api_url: String,
    uploads_url: String,
}

impl MangaDex {
    /// Creates a client against the public MangaDex hosts.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::ClientBuild`] if HTTP client construction fails.
    pub fn new() -> Result<Self, SourceError> {
        Self::with_base_urls(DEFAULT_API_URL, DEFAULT_UPLOADS_URL)
    }

    /// Creates a client against custom hosts (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::ClientBuild`] if HTTP client construction fails.
    #[instrument(skip_all, fields(api_url))]
    pub fn with_base_urls(
        api_url: impl Into<String>,
        uploads_url: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let api_url = api_url.into();
        tracing::Span::current().record("api_url", api_url.as_str());

        let client = Client::builder()
            .user_agent(user_agent::default_user_agent())
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .gzip(true)
            .build()
            .map_err(SourceError::ClientBuild)?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            uploads_url: uploads_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, SourceError> {
        let raw = format!("{}{path}", self.api_url);
        let mut url = Url::parse(&raw).map_err(|source| SourceError::InvalidUrl {
            url: raw.clone(),
            source,
        })?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        debug!(url = %url, "calling MangaDex API");

        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| SourceError::request(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::request(url.as_str(), e))?;

        serde_json::from_slice(&body).map_err(|source| SourceError::Decode {
            url: url.to_string(),
            source,
        })
    }

    fn cover_url_from(&self, manga: &MangaData) -> Option<String> {
        manga
            .relationships
            .iter()
            .filter(|r| r.kind == "cover_art")
            .find_map(|r| r.attributes.as_ref()?.file_name.clone())
            .map(|file| format!("{}/covers/{}/{file}", self.uploads_url, manga.id))
    }

    fn to_series(&self, manga: &MangaData) -> Series {
        Series {
            id: manga.id.clone(),
            name: pick_localized(&manga.attributes.title),
            description: pick_localized(&manga.attributes.description),
            cover_url: self.cover_url_from(manga),
            source: SOURCE_NAME.to_string(),
            status: SeriesStatus::New,
        }
    }
}

#[async_trait]
impl Source for MangaDex {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    #[instrument(skip(self), fields(source = SOURCE_NAME))]
    async fn search(&self, query: &str) -> Result<Vec<SeriesSummary>, SourceError> {
        let url = self.endpoint("/manga", &[("title", query), ("limit", SEARCH_LIMIT)])?;
        let found: Collection<MangaData> = self.get_json(url).await?;

        debug!(results = found.data.len(), "search complete");
        Ok(found
            .data
            .iter()
            .map(|m| SeriesSummary {
                id: m.id.clone(),
                name: pick_localized(&m.attributes.title),
                description: pick_localized(&m.attributes.description),
            })
            .collect())
    }

    #[instrument(skip(self), fields(source = SOURCE_NAME))]
    async fn get_series(&self, id: &str) -> Result<Series, SourceError> {
        let url = self.endpoint(&format!("/manga/{id}"), &[("includes[]", "cover_art")])?;
        let manga: Entity<MangaData> = self.get_json(url).await?;
        Ok(self.to_series(&manga.data))
    }

    #[instrument(skip(self, series), fields(source = SOURCE_NAME, series_id = %series.id))]
    async fn get_chapters(&self, series: &Series) -> Result<Vec<ChapterUnit>, SourceError> {
        let limit = FEED_PAGE_LIMIT.to_string();
        let mut chapters = Vec::new();
        let mut offset = 0usize;

        loop {
            let offset_param = offset.to_string();
            let url = self.endpoint(
                &format!("/manga/{}/feed", series.id),
                &[
                    ("limit", limit.as_str()),
                    ("offset", offset_param.as_str()),
                    ("order[volume]", "asc"),
                    ("order[chapter]", "asc"),
                ],
            )?;
            let feed: Collection<ChapterData> = self.get_json(url).await?;
            let received = feed.data.len();

            chapters.extend(feed.data.into_iter().map(|c| ChapterUnit {
                id: c.id,
                series_id: series.id.clone(),
                title: c.attributes.title.unwrap_or_default(),
                language: c.attributes.translated_language.unwrap_or_default(),
                volume: c.attributes.volume.unwrap_or_default(),
                number: c.attributes.chapter.unwrap_or_default(),
                materialized: false,
                container_path: None,
            }));

            offset += received;
            if received == 0 || offset >= feed.total {
                break;
            }
        }

        debug!(chapters = chapters.len(), "chapter feed loaded");
        Ok(chapters)
    }

    #[instrument(skip(self, _series, chapter), fields(source = SOURCE_NAME, chapter_id = %chapter.id))]
    async fn get_pages(
        &self,
        _series: &Series,
        chapter: &ChapterUnit,
    ) -> Result<Vec<String>, SourceError> {
        let url = self.endpoint(&format!("/at-home/server/{}", chapter.id), &[])?;
        let server: AtHomeResponse = self.get_json(url).await?;
        let base = server.base_url.trim_end_matches('/');

        Ok(server
            .chapter
            .data
            .iter()
            .map(|file| format!("{base}/data/{}/{file}", server.chapter.hash))
            .collect())
    }

    #[instrument(skip(self, series), fields(source = SOURCE_NAME, series_id = %series.id))]
    async fn series_cover_url(&self, series: &Series) -> Result<String, SourceError> {
        if let Some(url) = &series.cover_url {
            return Ok(url.clone());
        }

        let url = self.endpoint(
            &format!("/manga/{}", series.id),
            &[("includes[]", "cover_art")],
        )?;
        let manga: Entity<MangaData> = self.get_json(url).await?;
        self.cover_url_from(&manga.data)
            .ok_or_else(|| SourceError::not_found(format!("cover for series {}", series.id)))
    }

    #[instrument(skip(self, series, chapter), fields(source = SOURCE_NAME, volume = %chapter.volume))]
    async fn chapter_cover_url(
        &self,
        series: &Series,
        chapter: &ChapterUnit,
    ) -> Result<String, SourceError> {
        if chapter.volume.is_empty() {
            return Err(SourceError::not_found(format!(
                "volume cover for chapter {}",
                chapter.id
            )));
        }

        let url = self.endpoint(
            "/cover",
            &[
                ("manga[]", series.id.as_str()),
                ("volume[]", chapter.volume.as_str()),
                ("limit", "1"),
            ],
        )?;
        let covers: Collection<CoverData> = self.get_json(url).await?;

        covers
            .data
            .into_iter()
            .find_map(|c| c.attributes.file_name)
            .map(|file| format!("{}/covers/{}/{file}", self.uploads_url, series.id))
            .ok_or_else(|| {
                SourceError::not_found(format!("volume {} cover for series {}", chapter.volume, series.id))
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_localized_prefers_english() {
        let mut values = BTreeMap::new();
        values.insert("ja".to_string(), "ワンピース".to_string());
        values.insert("en".to_string(), "One Piece".to_string());
        assert_eq!(pick_localized(&values), "One Piece");
    }

    #[test]
    fn test_pick_localized_falls_back_to_first_key() {
        let mut values = BTreeMap::new();
        values.insert("ko".to_string(), "b".to_string());
        values.insert("ja".to_string(), "a".to_string());
        assert_eq!(pick_localized(&values), "a");
        assert_eq!(pick_localized(&BTreeMap::new()), "");
    }

    #[test]
    fn test_manga_attributes_accept_empty_array_description() {
        let json = r#"{"title": {"en": "Test"}, "description": []}"#;
        let attrs: MangaAttributes = serde_json::from_str(json).unwrap();
        assert_eq!(pick_localized(&attrs.title), "Test");
        assert!(attrs.description.is_empty());
    }

    #[test]
    fn test_cover_url_from_relationship() {
        let source = MangaDex::with_base_urls("https://api.test", "https://uploads.test/").unwrap();
        let json = r#"{
            "id": "m1",
            "attributes": {"title": {"en": "T"}},
            "relationships": [
                {"type": "author", "id": "a1"},
                {"type": "cover_art", "id": "c1", "attributes": {"fileName": "cover.png"}}
            ]
        }"#;
        let manga: MangaData = serde_json::from_str(json).unwrap();
        assert_eq!(
            source.cover_url_from(&manga).as_deref(),
            Some("https://uploads.test/covers/m1/cover.png")
        );
    }

    #[test]
    fn test_endpoint_encodes_query() {
        let source = MangaDex::with_base_urls("https://api.test/", "https://uploads.test").unwrap();
        let url = source
            .endpoint("/manga", &[("title", "one piece & co")])
            .unwrap();
        assert_eq!(url.path(), "/manga");
        assert_eq!(
            url.query_pairs().next().map(|(_, v)| v.into_owned()),
            Some("one piece & co".to_string())
        );
    }
}
