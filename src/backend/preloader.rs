//! Look-ahead/look-behind page preloader.

use futures::future::{AbortHandle, Abortable};
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::Instant;

use super::config::{ConfigError, PreloadConfig};
use super::loader::{LoadError, PageLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Forward,
    Backward,
    #[default]
    Both,
}

/// Load state of a single page as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Loaded,
    Loading,
    Error,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreloadStats {
    pub total: usize,
    pub loaded: usize,
    pub loading: usize,
    pub errors: usize,
    pub queue_length: usize,
    pub active_loads: usize,
}

enum LoadStatus<T> {
    Loading,
    Loaded(Arc<T>),
    Error,
}

struct LoadEntry<T> {
    status: LoadStatus<T>,
    /// Last state transition.
    timestamp: Instant,
}

struct ActiveLoad {
    ticket: u64,
    abort: AbortHandle,
}

struct PreloaderInner<T> {
    entries: HashMap<String, LoadEntry<T>>,
    queue: VecDeque<String>,
    active: HashMap<String, ActiveLoad>,
    next_ticket: u64,
}

struct Shared<L: PageLoader> {
    config: PreloadConfig,
    loader: L,
    inner: Mutex<PreloaderInner<L::Image>>,
    changes: watch::Sender<u64>,
}

/// Page loads keyed by URL, a FIFO of pages waiting for a slot, and the set
/// of loads in flight. The bookkeeping mutex is never held across an await.
///
/// Cheap to clone; every clone drives the same queue and cache.
pub struct Preloader<L: PageLoader> {
    shared: Arc<Shared<L>>,
}

impl<L: PageLoader> Clone for Preloader<L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<L: PageLoader> Preloader<L> {
    pub fn new(config: PreloadConfig, loader: L) -> Result<Self, ConfigError> {
        config.validate()?;
        let (changes, _) = watch::channel(0);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                loader,
                inner: Mutex::new(PreloaderInner {
                    entries: HashMap::new(),
                    queue: VecDeque::new(),
                    active: HashMap::new(),
                    next_ticket: 0,
                }),
                changes,
            }),
        })
    }

    pub fn config(&self) -> &PreloadConfig {
        &self.shared.config
    }

    /// Queue the pages around `current` and start as many loads as the
    /// concurrency cap allows. Nearer pages are queued first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn request_window(&self, current: usize, pages: &[String], direction: Direction) {
        let targets = window_targets(current, pages, self.shared.config.preload_distance, direction);
        self.queue_preload(&targets);
    }

    /// Queue an explicit list of pages. Pages that are already queued, in
    /// flight or in the table are skipped, so repeated calls never start a
    /// second load for the same URL.
    pub fn queue_preload<S: AsRef<str>>(&self, urls: &[S]) {
        let mut inner = self.lock();
        let mut queued = 0;

        for url in urls {
            let url = url.as_ref();
            if inner.queue.iter().any(|q| q == url) || !self.admit(&mut inner, url) {
                continue;
            }
            inner.queue.push_back(url.to_string());
            queued += 1;
        }

        if queued == 0 {
            return;
        }
        debug!("Queued {} pages ({} waiting)", queued, inner.queue.len());

        self.drain(&mut inner);
        drop(inner);
        self.notify();
    }

    /// Put `url` at the head of the queue, ahead of pages queued for earlier
    /// positions, and start it if a slot is free. A page already in flight or
    /// in the table is left alone.
    pub fn prioritize(&self, url: &str) {
        let mut inner = self.lock();
        if let Some(position) = inner.queue.iter().position(|q| q == url) {
            inner.queue.remove(position);
        } else if !self.admit(&mut inner, url) {
            return;
        }
        debug!("Prioritized {}", url);
        inner.queue.push_front(url.to_string());

        self.drain(&mut inner);
        drop(inner);
        self.notify();
    }

    /// Drop table entries older than the age cutoff or further than the
    /// cleanup distance from `current`, and drop queued pages that are too
    /// far. URLs missing from `pages` count as far. In-flight loads keep
    /// running and re-populate the table when they finish. Returns the number
    /// of evicted table entries.
    pub fn evict_stale(&self, current: usize, pages: &[String]) -> usize {
        let config = &self.shared.config;
        let now = Instant::now();

        let mut positions: HashMap<&str, usize> = HashMap::with_capacity(pages.len());
        for (index, url) in pages.iter().enumerate() {
            positions.entry(url.as_str()).or_insert(index);
        }
        let too_far = |url: &str| {
            positions
                .get(url)
                .is_none_or(|&index| index.abs_diff(current) > config.cache_cleanup_distance)
        };

        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|url, entry| {
            let too_old = now.duration_since(entry.timestamp) > config.max_entry_age;
            !(too_old || too_far(url.as_str()))
        });
        let evicted = before - inner.entries.len();

        let queued = inner.queue.len();
        inner.queue.retain(|url| !too_far(url.as_str()));
        let dequeued = queued - inner.queue.len();
        drop(inner);

        if evicted > 0 || dequeued > 0 {
            debug!(
                "Evicted {} cached and {} queued pages around page {}",
                evicted, dequeued, current
            );
            self.notify();
        }
        evicted
    }

    /// Abort every in-flight load and forget all queued and cached pages.
    pub fn cancel_all(&self) {
        let mut inner = self.lock();
        let aborted = inner.active.len();
        for (_, load) in inner.active.drain() {
            load.abort.abort();
        }
        inner.queue.clear();
        inner.entries.clear();
        drop(inner);

        if aborted > 0 {
            info!("Cancelled {} in-flight page loads", aborted);
        }
        self.notify();
    }

    pub fn query_state(&self, url: &str) -> PageState {
        match self.lock().entries.get(url).map(|entry| &entry.status) {
            Some(LoadStatus::Loaded(_)) => PageState::Loaded,
            Some(LoadStatus::Loading) => PageState::Loading,
            Some(LoadStatus::Error) => PageState::Error,
            None => PageState::Unknown,
        }
    }

    pub fn is_loaded(&self, url: &str) -> bool {
        self.query_state(url) == PageState::Loaded
    }

    pub fn is_loading(&self, url: &str) -> bool {
        self.query_state(url) == PageState::Loading
    }

    pub fn is_error(&self, url: &str) -> bool {
        self.query_state(url) == PageState::Error
    }

    pub fn loaded_image(&self, url: &str) -> Option<Arc<L::Image>> {
        match self.lock().entries.get(url).map(|entry| &entry.status) {
            Some(LoadStatus::Loaded(image)) => Some(Arc::clone(image)),
            _ => None,
        }
    }

    pub fn stats(&self) -> PreloadStats {
        let inner = self.lock();
        let mut stats = PreloadStats {
            total: inner.entries.len(),
            queue_length: inner.queue.len(),
            active_loads: inner.active.len(),
            ..PreloadStats::default()
        };
        for entry in inner.entries.values() {
            match entry.status {
                LoadStatus::Loaded(_) => stats.loaded += 1,
                LoadStatus::Loading => stats.loading += 1,
                LoadStatus::Error => stats.errors += 1,
            }
        }
        stats
    }

    /// Receiver whose value changes after every state transition.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, PreloaderInner<L::Image>> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.shared.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Whether `url` may be queued. Failed pages are admitted again only when
    /// retrying is enabled, and lose their table entry when they are.
    fn admit(&self, inner: &mut PreloaderInner<L::Image>, url: &str) -> bool {
        if inner.active.contains_key(url) {
            return false;
        }
        let failed = inner
            .entries
            .get(url)
            .map(|entry| matches!(entry.status, LoadStatus::Error));
        match failed {
            None => true,
            Some(true) if self.shared.config.retry_failed => {
                debug!("Retrying failed page {}", url);
                inner.entries.remove(url);
                true
            }
            Some(_) => false,
        }
    }

    fn drain(&self, inner: &mut PreloaderInner<L::Image>) {
        while inner.active.len() < self.shared.config.max_concurrent {
            let Some(url) = inner.queue.pop_front() else {
                break;
            };
            let already_loaded = matches!(
                inner.entries.get(&url).map(|entry| &entry.status),
                Some(LoadStatus::Loaded(_))
            );
            if already_loaded || inner.active.contains_key(&url) {
                continue;
            }
            self.start_load(inner, url);
        }
    }

    fn start_load(&self, inner: &mut PreloaderInner<L::Image>, url: String) {
        let ticket = inner.next_ticket;
        inner.next_ticket += 1;

        let (abort, registration) = AbortHandle::new_pair();
        inner.entries.insert(
            url.clone(),
            LoadEntry {
                status: LoadStatus::Loading,
                timestamp: Instant::now(),
            },
        );
        inner.active.insert(url.clone(), ActiveLoad { ticket, abort });

        let load = self.shared.loader.load(&url);
        let timeout = self.shared.config.load_timeout;
        let preloader = self.clone();

        tokio::spawn(async move {
            let load = async move {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, load)
                        .await
                        .unwrap_or_else(|_| Err(LoadError::Timeout)),
                    None => load.await,
                }
            };

            match Abortable::new(load, registration).await {
                Ok(result) => preloader.finish_load(&url, ticket, result),
                Err(_) => debug!("Aborted load of {}", url),
            }
        });
    }

    fn finish_load(&self, url: &str, ticket: u64, result: Result<L::Image, LoadError>) {
        let mut inner = self.lock();
        if inner.active.get(url).is_none_or(|load| load.ticket != ticket) {
            debug!("Discarding result for cancelled load of {}", url);
            return;
        }
        inner.active.remove(url);

        let status = match result {
            Ok(image) => {
                debug!("Loaded {}", url);
                LoadStatus::Loaded(Arc::new(image))
            }
            Err(e) => {
                warn!("Failed to load page {}: {}", url, e);
                LoadStatus::Error
            }
        };
        inner.entries.insert(
            url.to_string(),
            LoadEntry {
                status,
                timestamp: Instant::now(),
            },
        );

        self.drain(&mut inner);
        drop(inner);
        self.notify();
    }
}

/// Pages to preload around `current`, nearest first. With `Both`, the page
/// after is taken before the page before at each distance.
fn window_targets(
    current: usize,
    pages: &[String],
    distance: usize,
    direction: Direction,
) -> Vec<&str> {
    let forward = matches!(direction, Direction::Forward | Direction::Both);
    let backward = matches!(direction, Direction::Backward | Direction::Both);
    let mut targets = Vec::new();

    for step in 1..=distance {
        if forward {
            if let Some(url) = current.checked_add(step).and_then(|i| pages.get(i)) {
                targets.push(url.as_str());
            }
        }
        if backward {
            if let Some(url) = current.checked_sub(step).and_then(|i| pages.get(i)) {
                targets.push(url.as_str());
            }
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::time::Duration;
    use tokio::sync::oneshot;

    type Reply = Result<String, LoadError>;

    /// Loader whose pages only finish when the test says so.
    #[derive(Clone, Default)]
    struct ScriptedLoader {
        pending: Arc<Mutex<HashMap<String, oneshot::Sender<Reply>>>>,
        started: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedLoader {
        fn started(&self) -> Vec<String> {
            self.started.lock().unwrap().clone()
        }

        fn reply(&self, url: &str, reply: Reply) {
            let sender = self.pending.lock().unwrap().remove(url);
            sender.expect("page was never requested").send(reply).ok();
        }

        fn succeed(&self, url: &str) {
            self.reply(url, Ok(format!("image:{url}")));
        }

        fn fail(&self, url: &str) {
            self.reply(url, Err(LoadError::Status(404)));
        }

        fn dropped(&self, url: &str) -> bool {
            self.pending
                .lock()
                .unwrap()
                .get(url)
                .is_none_or(|sender| sender.is_closed())
        }
    }

    impl PageLoader for ScriptedLoader {
        type Image = String;

        fn load(&self, url: &str) -> BoxFuture<'static, Reply> {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().unwrap().insert(url.to_string(), tx);
            self.started.lock().unwrap().push(url.to_string());

            Box::pin(async move { rx.await.unwrap_or(Err(LoadError::Status(499))) })
        }
    }

    fn pages(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn numbered_pages(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("p{i}")).collect()
    }

    fn config(max_concurrent: usize, preload_distance: usize, cleanup: usize) -> PreloadConfig {
        PreloadConfig {
            max_concurrent,
            preload_distance,
            cache_cleanup_distance: cleanup,
            load_timeout: None,
            ..PreloadConfig::default()
        }
    }

    async fn finish(preloader: &Preloader<ScriptedLoader>, loader: &ScriptedLoader, url: &str, ok: bool) {
        let mut changes = preloader.subscribe();
        if ok {
            loader.succeed(url);
        } else {
            loader.fail(url);
        }
        tokio::time::timeout(Duration::from_secs(5), changes.changed())
            .await
            .expect("load never completed")
            .unwrap();
    }

    #[test]
    fn test_window_targets_are_clamped_and_nearest_first() {
        let pages = numbered_pages(10);

        assert_eq!(window_targets(8, &pages, 3, Direction::Forward), vec!["p9"]);
        assert_eq!(window_targets(1, &pages, 3, Direction::Backward), vec!["p0"]);
        assert_eq!(
            window_targets(5, &pages, 2, Direction::Both),
            vec!["p6", "p4", "p7", "p3"]
        );
        assert!(window_targets(0, &pages, 0, Direction::Both).is_empty());
        assert!(window_targets(3, &[], 3, Direction::Both).is_empty());
    }

    #[test]
    fn test_zero_concurrency_fails_fast() {
        let result = Preloader::new(config(0, 3, 5), ScriptedLoader::default());
        assert!(matches!(result, Err(ConfigError::ZeroConcurrency)));
    }

    #[tokio::test]
    async fn test_forward_window_respects_cap() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(2, 3, 5), loader.clone()).unwrap();
        let pages = pages(&["A", "B", "C", "D", "E"]);

        preloader.request_window(0, &pages, Direction::Forward);

        assert_eq!(loader.started(), vec!["B", "C"]);
        let stats = preloader.stats();
        assert_eq!(stats.active_loads, 2);
        assert_eq!(stats.queue_length, 1);
        assert_eq!(stats.loading, 2);
        assert_eq!(preloader.query_state("B"), PageState::Loading);
        assert_eq!(preloader.query_state("D"), PageState::Unknown);

        finish(&preloader, &loader, "B", true).await;

        assert_eq!(loader.started(), vec!["B", "C", "D"]);
        let stats = preloader.stats();
        assert_eq!(stats.active_loads, 2);
        assert_eq!(stats.queue_length, 0);
        assert_eq!(stats.loaded, 1);
        assert_eq!(preloader.query_state("B"), PageState::Loaded);
        assert_eq!(preloader.query_state("D"), PageState::Loading);
        assert_eq!(preloader.loaded_image("B").as_deref(), Some(&"image:B".to_string()));
    }

    #[tokio::test]
    async fn test_failed_page_does_not_affect_others() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(3, 1, 5), loader.clone()).unwrap();
        let pages = pages(&["A", "B", "C"]);

        preloader.request_window(1, &pages, Direction::Both);
        preloader.queue_preload(&["B"]);
        assert_eq!(loader.started(), vec!["C", "A", "B"]);

        finish(&preloader, &loader, "B", false).await;
        finish(&preloader, &loader, "A", true).await;

        assert!(preloader.is_error("B"));
        assert!(preloader.is_loaded("A"));
        assert!(preloader.is_loading("C"));
        assert!(preloader.loaded_image("B").is_none());

        let stats = preloader.stats();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.loaded, 1);
        assert_eq!(stats.loading, 1);
    }

    #[tokio::test]
    async fn test_repeated_requests_are_idempotent() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(2, 2, 5), loader.clone()).unwrap();
        let pages = numbered_pages(10);

        preloader.request_window(5, &pages, Direction::Both);
        let first = preloader.stats();
        preloader.request_window(5, &pages, Direction::Both);

        assert_eq!(preloader.stats(), first);
        assert_eq!(loader.started(), vec!["p6", "p4"]);
        assert_eq!(first.queue_length, 2);
    }

    #[tokio::test]
    async fn test_known_pages_are_not_reloaded() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(1, 1, 5), loader.clone()).unwrap();
        let pages = pages(&["A", "B", "C"]);

        preloader.request_window(0, &pages, Direction::Forward);
        finish(&preloader, &loader, "B", true).await;
        preloader.request_window(2, &pages, Direction::Backward);
        preloader.request_window(0, &pages, Direction::Forward);

        assert_eq!(loader.started(), vec!["B"]);
        assert_eq!(preloader.stats().total, 1);
    }

    #[tokio::test]
    async fn test_failed_page_is_not_retried_by_default() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(1, 1, 5), loader.clone()).unwrap();
        let pages = pages(&["A", "B"]);

        preloader.request_window(0, &pages, Direction::Forward);
        finish(&preloader, &loader, "B", false).await;
        preloader.request_window(0, &pages, Direction::Forward);

        assert_eq!(loader.started(), vec!["B"]);
        assert!(preloader.is_error("B"));
    }

    #[tokio::test]
    async fn test_failed_page_is_retried_when_enabled() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(
            PreloadConfig {
                retry_failed: true,
                ..config(1, 1, 5)
            },
            loader.clone(),
        )
        .unwrap();
        let pages = pages(&["A", "B"]);

        preloader.request_window(0, &pages, Direction::Forward);
        finish(&preloader, &loader, "B", false).await;
        preloader.request_window(0, &pages, Direction::Forward);

        assert_eq!(loader.started(), vec!["B", "B"]);
        assert!(preloader.is_loading("B"));
        assert_eq!(preloader.stats().errors, 0);
    }

    #[tokio::test]
    async fn test_both_directions_load_nearest_first() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(1, 2, 5), loader.clone()).unwrap();
        let pages = numbered_pages(10);

        preloader.request_window(5, &pages, Direction::Both);
        for url in ["p6", "p4", "p7"] {
            finish(&preloader, &loader, url, true).await;
        }

        assert_eq!(loader.started(), vec!["p6", "p4", "p7", "p3"]);
    }

    #[tokio::test]
    async fn test_active_loads_never_exceed_cap() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(3, 4, 50), loader.clone()).unwrap();
        let pages = numbered_pages(30);

        for current in (0..30).step_by(3) {
            preloader.request_window(current, &pages, Direction::Both);
            assert!(preloader.stats().active_loads <= 3);

            let in_flight: Vec<String> = loader.pending.lock().unwrap().keys().cloned().collect();
            for url in in_flight.into_iter().take(2) {
                finish(&preloader, &loader, &url, true).await;
                assert!(preloader.stats().active_loads <= 3);
            }
        }

        let mut started = loader.started();
        let count = started.len();
        started.sort();
        started.dedup();
        assert_eq!(started.len(), count, "a page was loaded twice");
    }

    #[tokio::test]
    async fn test_evict_by_distance() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(5, 5, 1), loader.clone()).unwrap();
        let pages = numbered_pages(5);

        preloader.queue_preload(&pages);
        for url in &pages {
            finish(&preloader, &loader, url, true).await;
        }
        assert_eq!(preloader.stats().loaded, 5);

        let evicted = preloader.evict_stale(2, &pages);

        assert_eq!(evicted, 2);
        assert_eq!(preloader.query_state("p0"), PageState::Unknown);
        assert_eq!(preloader.query_state("p4"), PageState::Unknown);
        for url in ["p1", "p2", "p3"] {
            assert_eq!(preloader.loaded_image(url).as_deref(), Some(&format!("image:{url}")));
        }
    }

    #[tokio::test]
    async fn test_pages_outside_chapter_are_evicted() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(2, 1, 10), loader.clone()).unwrap();
        let old = pages(&["old0", "old1"]);

        preloader.request_window(0, &old, Direction::Forward);
        finish(&preloader, &loader, "old1", true).await;

        assert_eq!(preloader.evict_stale(0, &pages(&["new0", "new1"])), 1);
        assert_eq!(preloader.stats().total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_by_age() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(2, 2, 10), loader.clone()).unwrap();
        let pages = numbered_pages(5);

        preloader.queue_preload(&["p0"]);
        finish(&preloader, &loader, "p0", true).await;

        tokio::time::advance(Duration::from_secs(200)).await;
        preloader.queue_preload(&["p1"]);
        finish(&preloader, &loader, "p1", true).await;

        tokio::time::advance(Duration::from_secs(150)).await;
        assert_eq!(preloader.evict_stale(0, &pages), 1);
        assert_eq!(preloader.query_state("p0"), PageState::Unknown);
        assert!(preloader.is_loaded("p1"));
    }

    #[tokio::test]
    async fn test_evicted_in_flight_load_repopulates_table() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(1, 1, 0), loader.clone()).unwrap();
        let pages = pages(&["A", "B", "C"]);

        preloader.request_window(0, &pages, Direction::Forward);
        assert_eq!(preloader.evict_stale(2, &pages), 1);

        let stats = preloader.stats();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.active_loads, 1);
        assert!(!loader.dropped("B"));

        preloader.request_window(0, &pages, Direction::Forward);
        assert_eq!(loader.started(), vec!["B"]);

        finish(&preloader, &loader, "B", true).await;
        assert!(preloader.is_loaded("B"));
        assert_eq!(preloader.stats().active_loads, 0);
    }

    #[tokio::test]
    async fn test_cancel_all_clears_everything() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(2, 3, 5), loader.clone()).unwrap();
        let pages = pages(&["A", "B", "C", "D", "E"]);

        preloader.request_window(0, &pages, Direction::Forward);
        finish(&preloader, &loader, "B", true).await;
        preloader.cancel_all();

        assert_eq!(preloader.stats(), PreloadStats::default());
        assert_eq!(preloader.query_state("B"), PageState::Unknown);

        for _ in 0..20 {
            if loader.dropped("C") && loader.dropped("D") {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(loader.dropped("C"), "in-flight load was not aborted");
        assert!(loader.dropped("D"), "in-flight load was not aborted");

        preloader.request_window(0, &pages, Direction::Forward);
        assert_eq!(loader.started(), vec!["B", "C", "D", "B", "C"]);
    }

    #[tokio::test]
    async fn test_late_completion_after_cancel_is_ignored() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(1, 1, 5), loader.clone()).unwrap();
        let pages = pages(&["A", "B"]);

        preloader.request_window(0, &pages, Direction::Forward);
        preloader.cancel_all();
        preloader.finish_load("B", 0, Ok("late".to_string()));

        assert_eq!(preloader.stats(), PreloadStats::default());
        assert_eq!(preloader.query_state("B"), PageState::Unknown);
    }

    #[tokio::test]
    async fn test_late_completion_does_not_overwrite_reload() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(1, 1, 5), loader.clone()).unwrap();
        let pages = pages(&["A", "B"]);

        preloader.request_window(0, &pages, Direction::Forward);
        preloader.cancel_all();
        preloader.request_window(0, &pages, Direction::Forward);
        assert_eq!(loader.started(), vec!["B", "B"]);

        preloader.finish_load("B", 0, Ok("late".to_string()));

        assert!(preloader.is_loading("B"));
        assert_eq!(preloader.stats().active_loads, 1);
        assert!(preloader.loaded_image("B").is_none());

        finish(&preloader, &loader, "B", true).await;
        assert_eq!(preloader.loaded_image("B").as_deref(), Some(&"image:B".to_string()));
    }

    #[tokio::test]
    async fn test_prioritized_page_jumps_the_queue() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(1, 3, 10), loader.clone()).unwrap();
        let pages = numbered_pages(10);

        preloader.request_window(0, &pages, Direction::Forward);
        preloader.prioritize("p3");
        preloader.prioritize("p8");
        assert_eq!(preloader.stats().queue_length, 3);

        finish(&preloader, &loader, "p1", true).await;
        finish(&preloader, &loader, "p8", true).await;

        assert_eq!(loader.started(), vec!["p1", "p8", "p3"]);
        preloader.prioritize("p8");
        assert_eq!(preloader.stats().queue_length, 1);
    }

    #[tokio::test]
    async fn test_far_queued_pages_are_dropped() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(config(1, 3, 3), loader.clone()).unwrap();
        let pages = numbered_pages(20);

        preloader.request_window(0, &pages, Direction::Forward);
        assert_eq!(preloader.stats().queue_length, 2);

        preloader.request_window(10, &pages, Direction::Forward);
        preloader.evict_stale(10, &pages);
        assert_eq!(preloader.stats().queue_length, 3);

        finish(&preloader, &loader, "p1", true).await;
        assert_eq!(loader.started(), vec!["p1", "p11"]);
        assert_eq!(preloader.query_state("p2"), PageState::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_load_times_out() {
        let loader = ScriptedLoader::default();
        let preloader = Preloader::new(
            PreloadConfig {
                load_timeout: Some(Duration::from_secs(5)),
                ..config(1, 2, 5)
            },
            loader.clone(),
        )
        .unwrap();
        let pages = pages(&["A", "B", "C"]);

        preloader.request_window(0, &pages, Direction::Forward);
        let mut changes = preloader.subscribe();
        changes.changed().await.unwrap();

        assert!(preloader.is_error("B"));
        assert_eq!(loader.started(), vec!["B", "C"]);
        assert_eq!(preloader.stats().active_loads, 1);
    }
}
