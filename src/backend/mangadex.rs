use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

const USER_AGENT: &str = "Tachiyomi-TUI/0.1.0";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("request to MangaDex failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("MangaDex answered HTTP {status} for {url}")]
    Status { status: u16, url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub id: String,
    pub chapter: String,
    pub title: String,
    pub volume: Option<String>,
    pub pages: usize,
}

/// Ordered page URLs of one chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterPages {
    pub chapter: Chapter,
    pub pages: Vec<String>,
    pub total_pages: usize,
}

#[derive(Debug, Deserialize)]
struct ChapterResponse {
    data: ChapterData,
}

#[derive(Debug, Deserialize)]
struct ChapterData {
    id: String,
    attributes: ChapterAttributes,
}

#[derive(Debug, Deserialize)]
struct ChapterAttributes {
    chapter: Option<String>,
    title: Option<String>,
    volume: Option<String>,
    #[serde(default)]
    pages: usize,
}

#[derive(Debug, Deserialize)]
struct MangaResponse {
    data: MangaData,
}

#[derive(Debug, Deserialize)]
struct MangaData {
    attributes: MangaAttributes,
}

#[derive(Debug, Deserialize)]
struct MangaAttributes {
    title: HashMap<String, String>,
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
    #[serde(rename = "dataSaver")]
    data_saver: Vec<String>,
}

impl From<ChapterData> for Chapter {
    fn from(c: ChapterData) -> Self {
        Chapter {
            id: c.id,
            chapter: c.attributes.chapter.unwrap_or_else(|| "0".to_string()),
            title: c.attributes.title.unwrap_or_else(|| "No Title".to_string()),
            volume: c.attributes.volume,
            pages: c.attributes.pages,
        }
    }
}

fn display_title(title: &HashMap<String, String>) -> String {
    title
        .get("en")
        .or_else(|| title.values().next())
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string())
}

fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().user_agent(USER_AGENT).build()
}

/// Builds `{baseUrl}/{data|data-saver}/{hash}/{filename}` for every page,
/// in the order the at-home server lists them.
fn page_urls(at_home: AtHomeResponse, data_saver: bool) -> Vec<String> {
    let (quality, files) = if data_saver {
        ("data-saver", at_home.chapter.data_saver)
    } else {
        ("data", at_home.chapter.data)
    };

    files
        .into_iter()
        .map(|filename| {
            format!(
                "{}/{}/{}/{}",
                at_home.base_url, quality, at_home.chapter.hash, filename
            )
        })
        .collect()
}

/// Source of chapter page URLs.
#[derive(Clone)]
pub struct MangaDex {
    client: reqwest::Client,
    base_url: String,
}

impl MangaDex {
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        Ok(Self::with_client(build_client()?, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CatalogError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(CatalogError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.json().await?)
    }

    pub async fn get_manga_title(&self, manga_id: &str) -> Result<String, CatalogError> {
        let url = format!("{}/manga/{}", self.base_url, urlencoding::encode(manga_id));
        let response: MangaResponse = self.get_json(&url).await?;
        Ok(display_title(&response.data.attributes.title))
    }

    pub async fn get_chapter(&self, chapter_id: &str) -> Result<Chapter, CatalogError> {
        let url = format!(
            "{}/chapter/{}",
            self.base_url,
            urlencoding::encode(chapter_id)
        );
        let response: ChapterResponse = self.get_json(&url).await?;
        Ok(Chapter::from(response.data))
    }

    pub async fn get_chapter_pages(
        &self,
        chapter_id: &str,
        data_saver: bool,
    ) -> Result<ChapterPages, CatalogError> {
        let chapter = self.get_chapter(chapter_id).await?;

        let url = format!(
            "{}/at-home/server/{}",
            self.base_url,
            urlencoding::encode(chapter_id)
        );
        let at_home: AtHomeResponse = self.get_json(&url).await?;

        let pages = page_urls(at_home, data_saver);
        log::info!(
            "Chapter {} ({}) has {} pages",
            chapter.chapter,
            chapter.id,
            pages.len()
        );

        Ok(ChapterPages {
            chapter,
            total_pages: pages.len(),
            pages,
        })
    }
}
