use log::warn;
use std::sync::Arc;

use crate::backend::loader::PageLoader;
use crate::backend::mangadex::ChapterPages;
use crate::backend::preloader::{Direction, PageState, PreloadStats, Preloader};
use crate::backend::progress::{ChapterUpdate, ProgressStore};

use super::indicator;

/// State of the chapter being read.
///
/// Every page change puts the page itself at the head of the queue, refreshes the preload window
/// around it, evicts pages outside the retention radius and records progress.
/// Dropping the session cancels all outstanding loads.
pub struct ReaderSession<L: PageLoader> {
    manga_id: String,
    manga_title: String,
    chapter: ChapterPages,
    current_page: usize,
    preloader: Preloader<L>,
    progress: ProgressStore,
}

impl<L: PageLoader> ReaderSession<L> {
    /// Resumes at the stored page unless the chapter was finished.
    pub fn open(
        manga_id: &str,
        manga_title: &str,
        chapter: ChapterPages,
        preloader: Preloader<L>,
        progress: ProgressStore,
    ) -> Self {
        preloader.cancel_all();

        let mut session = Self {
            manga_id: manga_id.to_string(),
            manga_title: manga_title.to_string(),
            chapter,
            current_page: 0,
            preloader,
            progress,
        };
        session.current_page = session.resume_page();
        session.refresh(Direction::Both);
        session
    }

    fn resume_page(&self) -> usize {
        self.progress
            .chapter_progress(&self.manga_id, &self.chapter.chapter.id)
            .filter(|saved| !saved.completed)
            .map(|saved| saved.current_page.min(self.chapter.pages.len().saturating_sub(1)))
            .unwrap_or(0)
    }

    pub fn manga_title(&self) -> &str {
        &self.manga_title
    }

    pub fn chapter(&self) -> &ChapterPages {
        &self.chapter
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn total_pages(&self) -> usize {
        self.chapter.pages.len()
    }

    pub fn current_url(&self) -> Option<&str> {
        self.chapter.pages.get(self.current_page).map(String::as_str)
    }

    pub fn current_state(&self) -> PageState {
        self.current_url()
            .map(|url| self.preloader.query_state(url))
            .unwrap_or(PageState::Unknown)
    }

    pub fn current_image(&self) -> Option<Arc<L::Image>> {
        self.current_url()
            .and_then(|url| self.preloader.loaded_image(url))
    }

    pub fn preloader(&self) -> &Preloader<L> {
        &self.preloader
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    pub fn stats(&self) -> PreloadStats {
        self.preloader.stats()
    }

    pub fn status_line(&self) -> Option<String> {
        indicator::minimal(&self.preloader.stats())
    }

    pub fn next_page(&mut self) -> bool {
        if self.current_page + 1 < self.total_pages() {
            self.current_page += 1;
            self.refresh(Direction::Forward);
            true
        } else {
            false
        }
    }

    pub fn prev_page(&mut self) -> bool {
        if self.current_page > 0 {
            self.current_page -= 1;
            self.refresh(Direction::Backward);
            true
        } else {
            false
        }
    }

    /// Jumps to `page`, returning `false` when it is out of range.
    pub fn go_to(&mut self, page: usize) -> bool {
        if page >= self.total_pages() {
            return false;
        }
        self.current_page = page;
        self.refresh(Direction::Both);
        true
    }

    pub fn first_page(&mut self) -> bool {
        self.go_to(0)
    }

    pub fn last_page(&mut self) -> bool {
        self.go_to(self.total_pages().saturating_sub(1))
    }

    /// Switches to another chapter. Loads for the old page list are cancelled
    /// before the new one is used.
    pub fn change_chapter(&mut self, chapter: ChapterPages) {
        self.preloader.cancel_all();
        self.chapter = chapter;
        self.current_page = self.resume_page();
        self.refresh(Direction::Both);
    }

    fn refresh(&mut self, direction: Direction) {
        let pages = &self.chapter.pages;
        if let Some(url) = pages.get(self.current_page) {
            self.preloader.prioritize(url);
        }
        self.preloader
            .request_window(self.current_page, pages, direction);
        self.preloader.evict_stale(self.current_page, pages);

        if pages.is_empty() {
            return;
        }
        let update = ChapterUpdate {
            chapter_id: self.chapter.chapter.id.clone(),
            current_page: self.current_page,
            total_pages: pages.len(),
            chapter_number: Some(self.chapter.chapter.chapter.clone()),
            chapter_title: Some(self.chapter.chapter.title.clone()),
        };
        if let Err(e) = self.progress.update_chapter_progress(
            &self.manga_id,
            &self.manga_title,
            update,
            None,
            None,
        ) {
            warn!("Failed to save reading progress: {}", e);
        }
    }
}

impl<L: PageLoader> Drop for ReaderSession<L> {
    fn drop(&mut self) {
        self.preloader.cancel_all();
    }
}
