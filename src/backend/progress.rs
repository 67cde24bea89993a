use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use super::config::app_config_dir;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("failed to write reading progress: {0}")]
    Io(#[from] io::Error),

    #[error("invalid reading progress data: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterProgress {
    pub chapter_id: String,
    pub current_page: usize,
    pub total_pages: usize,
    pub completed: bool,
    pub last_read_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MangaProgress {
    pub manga_id: String,
    pub manga_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub chapters: HashMap<String, ChapterProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_chapter_read: Option<String>,
    pub last_read_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chapters_available: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    #[serde(default)]
    pub mangas: HashMap<String, MangaProgress>,
    #[serde(default)]
    pub last_updated: u64,
}

/// What the reader knows about the chapter being read.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterUpdate {
    pub chapter_id: String,
    pub current_page: usize,
    pub total_pages: usize,
    pub chapter_number: Option<String>,
    pub chapter_title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingStats {
    pub total_mangas: usize,
    pub total_chapters: usize,
    pub completed_chapters: usize,
    /// Percentage of tracked chapters that are completed.
    pub reading_progress: f64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Reading progress persisted as JSON, rewritten after every change.
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    data: ReadingProgress,
}

impl ProgressStore {
    pub fn open_default() -> Self {
        Self::open(app_config_dir().join("progress.json"))
    }

    /// A missing or unreadable file starts an empty store.
    pub fn open(path: PathBuf) -> Self {
        let data = load_progress(&path);
        Self { path, data }
    }

    pub fn data(&self) -> &ReadingProgress {
        &self.data
    }

    pub fn save(&mut self) -> Result<(), ProgressError> {
        self.data.last_updated = now_millis();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn update_chapter_progress(
        &mut self,
        manga_id: &str,
        manga_title: &str,
        update: ChapterUpdate,
        cover_url: Option<&str>,
        total_chapters_available: Option<usize>,
    ) -> Result<(), ProgressError> {
        self.record_chapter(
            manga_id,
            manga_title,
            update,
            cover_url,
            total_chapters_available,
            now_millis(),
        );
        self.save()
    }

    fn record_chapter(
        &mut self,
        manga_id: &str,
        manga_title: &str,
        update: ChapterUpdate,
        cover_url: Option<&str>,
        total_chapters_available: Option<usize>,
        now: u64,
    ) {
        let manga = self
            .data
            .mangas
            .entry(manga_id.to_string())
            .or_insert_with(|| MangaProgress {
                manga_id: manga_id.to_string(),
                manga_title: manga_title.to_string(),
                cover_url: None,
                chapters: HashMap::new(),
                last_chapter_read: None,
                last_read_at: now,
                total_chapters_available: None,
            });

        manga.manga_title = manga_title.to_string();
        manga.last_read_at = now;
        manga.last_chapter_read = Some(update.chapter_id.clone());
        if let Some(cover) = cover_url {
            manga.cover_url = Some(cover.to_string());
        }
        if total_chapters_available.is_some() {
            manga.total_chapters_available = total_chapters_available;
        }

        let chapter = ChapterProgress {
            chapter_id: update.chapter_id.clone(),
            current_page: update.current_page,
            total_pages: update.total_pages,
            completed: update.current_page + 1 >= update.total_pages,
            last_read_at: now,
            chapter_number: update.chapter_number,
            chapter_title: update.chapter_title,
        };
        manga.chapters.insert(update.chapter_id, chapter);
    }

    pub fn manga_progress(&self, manga_id: &str) -> Option<&MangaProgress> {
        self.data.mangas.get(manga_id)
    }

    pub fn chapter_progress(&self, manga_id: &str, chapter_id: &str) -> Option<&ChapterProgress> {
        self.manga_progress(manga_id)?.chapters.get(chapter_id)
    }

    /// Mangas with at least one chapter read, most recent first.
    pub fn recently_read(&self, limit: usize) -> Vec<&MangaProgress> {
        let mut mangas: Vec<&MangaProgress> = self
            .data
            .mangas
            .values()
            .filter(|manga| manga.last_chapter_read.is_some())
            .collect();
        mangas.sort_by(|a, b| b.last_read_at.cmp(&a.last_read_at));
        mangas.truncate(limit);
        mangas
    }

    /// Returns `false` when the chapter has never been opened.
    pub fn mark_chapter_completed(
        &mut self,
        manga_id: &str,
        chapter_id: &str,
    ) -> Result<bool, ProgressError> {
        let now = now_millis();
        let Some(manga) = self.data.mangas.get_mut(manga_id) else {
            return Ok(false);
        };
        let Some(chapter) = manga.chapters.get_mut(chapter_id) else {
            return Ok(false);
        };

        chapter.completed = true;
        chapter.last_read_at = now;
        manga.last_read_at = now;
        self.save()?;
        Ok(true)
    }

    pub fn stats(&self) -> ReadingStats {
        let total_mangas = self.data.mangas.len();
        let total_chapters = self
            .data
            .mangas
            .values()
            .map(|manga| manga.chapters.len())
            .sum();
        let completed_chapters = self
            .data
            .mangas
            .values()
            .flat_map(|manga| manga.chapters.values())
            .filter(|chapter| chapter.completed)
            .count();

        ReadingStats {
            total_mangas,
            total_chapters,
            completed_chapters,
            reading_progress: if total_chapters > 0 {
                completed_chapters as f64 / total_chapters as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    /// Records how many chapters a manga has without touching read state.
    pub fn update_manga_total_chapters(
        &mut self,
        manga_id: &str,
        manga_title: &str,
        total_chapters: usize,
        cover_url: Option<&str>,
    ) -> Result<(), ProgressError> {
        let now = now_millis();
        let manga = self
            .data
            .mangas
            .entry(manga_id.to_string())
            .or_insert_with(|| MangaProgress {
                manga_id: manga_id.to_string(),
                manga_title: manga_title.to_string(),
                cover_url: None,
                chapters: HashMap::new(),
                last_chapter_read: None,
                last_read_at: now,
                total_chapters_available: None,
            });

        manga.manga_title = manga_title.to_string();
        manga.total_chapters_available = Some(total_chapters);
        if let Some(cover) = cover_url {
            manga.cover_url = Some(cover.to_string());
        }
        self.save()
    }

    pub fn clear(&mut self) -> Result<(), ProgressError> {
        self.data = ReadingProgress::default();
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    pub fn export(&self) -> Result<String, ProgressError> {
        Ok(serde_json::to_string_pretty(&self.data)?)
    }

    /// Replaces all progress with `json`. Invalid input leaves the store as it was.
    pub fn import(&mut self, json: &str) -> Result<(), ProgressError> {
        self.data = serde_json::from_str(json)?;
        self.save()
    }
}

fn load_progress(path: &Path) -> ReadingProgress {
    if !path.exists() {
        return ReadingProgress::default();
    }

    match fs::read_to_string(path).map(|content| serde_json::from_str(&content)) {
        Ok(Ok(progress)) => progress,
        Ok(Err(e)) => {
            log::error!("Error loading reading progress: {}", e);
            ReadingProgress::default()
        }
        Err(e) => {
            log::error!("Error reading {}: {}", path.display(), e);
            ReadingProgress::default()
        }
    }
}
