//! One worker per distinct domain: owns the domain's TaskList, paces and
//! bounds its fetches, and runs the retry policy.
//!
//! Grounded on the teacher's `queue::task_queue::TaskQueue` main-loop shape
//! (pop, dispatch, track in-flight) combined with
//! `network::rate_limit::GlobalRateLimiter`'s per-domain interval tracking.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::defaults;
use crate::error::ErrorCode;
use crate::network::{DownloadResponse, SharedDownloader};
#[cfg(test)]
use crate::network::DownloadError;
use crate::storage;
use crate::task::{ReaderProgress, Task, TaskId, TaskKind, TaskList};

const MAX_ATTEMPTS: usize = 3;

/// Hook invoked by the browser when a `TaskKind::Scrape` task's fetch succeeds.
/// The Collector implements this; the browser itself knows nothing about HTML.
#[async_trait]
pub trait ScrapeHandler: Send + Sync {
    async fn on_scrape(
        &self,
        task: Arc<RwLock<Task>>,
        response: DownloadResponse,
    ) -> Result<(), (ErrorCode, String)>;
}

pub struct DomainBrowser {
    domain: String,
    list: TaskList,
    parallelism: AtomicUsize,
    max_depth: u32,
    interval: Mutex<Duration>,
    inflight: AtomicUsize,
    last_dispatch_at: Mutex<Option<Instant>>,
    wake: Notify,
    completed: Notify,
    stopping: AtomicBool,
    downloader: SharedDownloader,
    /// Weak so the Collector (which owns the Scheduler, which owns each
    /// DomainBrowser) isn't kept alive by its own browsers, mirroring the
    /// `Task::parent` back-reference pattern.
    scrape_handler: Weak<dyn ScrapeHandler>,
}

impl DomainBrowser {
    pub fn new(
        domain: impl Into<String>,
        downloader: SharedDownloader,
        scrape_handler: Weak<dyn ScrapeHandler>,
    ) -> Arc<Self> {
        Self::with_policy(
            domain,
            defaults::PARALLELISM_PER_DOMAIN,
            defaults::MAX_DEPTH,
            defaults::TASK_INTERVAL,
            downloader,
            scrape_handler,
        )
    }

    pub fn with_policy(
        domain: impl Into<String>,
        parallelism: usize,
        max_depth: u32,
        interval: Duration,
        downloader: SharedDownloader,
        scrape_handler: Weak<dyn ScrapeHandler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            domain: domain.into(),
            list: TaskList::new(),
            parallelism: AtomicUsize::new(parallelism.max(1)),
            max_depth,
            interval: Mutex::new(interval),
            inflight: AtomicUsize::new(0),
            last_dispatch_at: Mutex::new(None),
            wake: Notify::new(),
            completed: Notify::new(),
            stopping: AtomicBool::new(false),
            downloader,
            scrape_handler,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn set_parallelism(&self, n: usize) {
        self.parallelism.store(n.max(1), Ordering::Relaxed);
        self.wake.notify_one();
    }

    pub fn set_interval(&self, interval: Duration) {
        *self.interval.lock().expect("interval lock poisoned") = interval;
    }

    /// Pushes a task, rejecting it if `task.depth > max_depth`.
    pub fn push(&self, task: Arc<RwLock<Task>>) -> Result<(), (u32, u32)> {
        let depth = task.read().expect("task lock poisoned").depth();
        if depth > self.max_depth {
            return Err((depth, self.max_depth));
        }
        self.list.push(task);
        self.wake.notify_one();
        Ok(())
    }

    pub fn list(&self) -> Vec<Arc<RwLock<Task>>> {
        self.list.list()
    }

    pub fn query(&self, id: TaskId) -> Option<Arc<RwLock<Task>>> {
        self.list.query(id)
    }

    pub fn delete(&self, id: TaskId) -> Option<Arc<RwLock<Task>>> {
        self.list.delete(id)
    }

    pub fn tree(&self) -> Vec<Arc<RwLock<Task>>> {
        self.list.list()
    }

    pub fn is_idle(&self) -> bool {
        self.list.pending_len() == 0 && self.inflight.load(Ordering::Relaxed) == 0
    }

    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::Relaxed);
        self.wake.notify_one();
    }

    /// Main loop, per the spec's five-step dispatch cycle. Runs until stopped
    /// and idle.
    pub async fn run(self: Arc<Self>) {
        info!(domain = %self.domain, "browser: starting");
        loop {
            if self.stopping.load(Ordering::Relaxed) && self.is_idle() {
                break;
            }

            let parallelism = self.parallelism.load(Ordering::Relaxed);
            if self.inflight.load(Ordering::Relaxed) >= parallelism {
                self.completed.notified().await;
                continue;
            }

            let interval = *self.interval.lock().expect("interval lock poisoned");
            let wait = {
                let last = *self.last_dispatch_at.lock().expect("last_dispatch lock poisoned");
                last.map(|t| interval.saturating_sub(t.elapsed()))
            };
            if let Some(remaining) = wait {
                if !remaining.is_zero() {
                    tokio::time::sleep(remaining).await;
                    continue;
                }
            }

            let Some(task) = self.list.pop_next() else {
                if self.stopping.load(Ordering::Relaxed) {
                    continue;
                }
                tokio::select! {
                    _ = self.wake.notified() => {}
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                }
                continue;
            };

            {
                let mut guard = task.write().expect("task lock poisoned");
                guard.record_start();
            }
            *self.last_dispatch_at.lock().expect("last_dispatch lock poisoned") = Some(Instant::now());
            self.inflight.fetch_add(1, Ordering::Relaxed);

            let browser = Arc::clone(&self);
            tokio::spawn(async move {
                browser.fetch_worker(task).await;
                browser.inflight.fetch_sub(1, Ordering::Relaxed);
                browser.completed.notify_one();
                browser.wake.notify_one();
            });
        }
        info!(domain = %self.domain, "browser: stopped");
    }

    async fn fetch_worker(&self, task: Arc<RwLock<Task>>) {
        let task_id = task.read().expect("task lock poisoned").id();
        let task_snapshot = task.read().expect("task lock poisoned").clone();
        let result = self.downloader.get(&task_snapshot).await;

        match result {
            Err(err) => self.record_failure(&task, err.code, err.msg, err.reader_progress),
            Ok(response) => self.handle_response(&task, response).await,
        }
        debug!(domain = %self.domain, task_id = %task_id, "browser: fetch worker done");
    }

    fn handle_failure(&self, task: &Arc<RwLock<Task>>, code: ErrorCode, msg: String) {
        self.record_failure(task, code, msg, None);
    }

    fn record_failure(
        &self,
        task: &Arc<RwLock<Task>>,
        code: ErrorCode,
        msg: String,
        reader_progress: Option<ReaderProgress>,
    ) {
        let mut guard = task.write().expect("task lock poisoned");
        if let Some(progress) = reader_progress {
            guard.meta_mut().reader = Some(progress);
        }
        guard.record_err(code, msg);
        let attempts = guard.err_details().len();
        if code.is_retryable() && attempts < MAX_ATTEMPTS {
            guard.touch_create_time();
            let id = guard.id();
            drop(guard);
            self.list.requeue(id);
            warn!(task_id = %id, attempts, "browser: retrying task");
        }
    }

    async fn handle_response(&self, task: &Arc<RwLock<Task>>, response: DownloadResponse) {
        if !(200..400).contains(&response.status) {
            let code = ErrorCode::from_status(response.status);
            self.handle_failure(task, code, format!("http status {}", response.status));
            return;
        }

        let kind = task.read().expect("task lock poisoned").kind().clone();
        let outcome: Result<(), (ErrorCode, String)> = match kind {
            TaskKind::Scrape => match self.scrape_handler.upgrade() {
                Some(handler) => handler.on_scrape(Arc::clone(task), response).await,
                None => Err((ErrorCode::Callback, "collector no longer running".into())),
            },
            TaskKind::Download { name, dir } => storage::save_image(&response.body, &dir, &name)
                .await
                .map_err(|e| (ErrorCode::Callback, e.to_string())),
        };

        match outcome {
            Ok(()) => {
                task.write().expect("task lock poisoned").record_success();
            }
            Err((code, msg)) => self.handle_failure(task, code, msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use url::Url;

    struct FixedDownloader {
        status: u16,
        body: Vec<u8>,
    }

    #[async_trait]
    impl crate::network::Downloader for FixedDownloader {
        async fn get(&self, task: &Task) -> Result<DownloadResponse, DownloadError> {
            Ok(DownloadResponse {
                status: self.status,
                body: self.body.clone(),
                final_url: task.url().clone(),
            })
        }
    }

    struct FailingDownloader;

    #[async_trait]
    impl crate::network::Downloader for FailingDownloader {
        async fn get(&self, _task: &Task) -> Result<DownloadResponse, DownloadError> {
            Err(DownloadError { code: ErrorCode::HttpUnknown, msg: "boom".into(), reader_progress: None })
        }
    }

    struct NoopScrapeHandler;

    #[async_trait]
    impl ScrapeHandler for NoopScrapeHandler {
        async fn on_scrape(
            &self,
            _task: Arc<RwLock<Task>>,
            _response: DownloadResponse,
        ) -> Result<(), (ErrorCode, String)> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn successful_download_task_writes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let handler: Arc<dyn ScrapeHandler> = Arc::new(NoopScrapeHandler);
        let browser = DomainBrowser::new(
            "example.com",
            Arc::new(FixedDownloader { status: 200, body: b"hi".to_vec() }),
            Arc::downgrade(&handler),
        );
        browser.set_interval(Duration::from_millis(0));

        let task = Arc::new(RwLock::new(Task::new(
            "pic",
            None,
            Url::parse("https://example.com/pic.jpg").unwrap(),
            TaskKind::Download { name: "pic.jpg".into(), dir: dir.path().to_str().unwrap().into() },
        )));
        browser.push(task.clone()).unwrap();

        let b2 = Arc::clone(&browser);
        let handle = tokio::spawn(async move { b2.run().await });
        for _ in 0..50 {
            if task.read().unwrap().state() == crate::task::TaskState::Successful {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        browser.request_stop();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

        assert_eq!(task.read().unwrap().state(), crate::task::TaskState::Successful);
        assert!(dir.path().join("pic.jpg").exists());
    }

    #[tokio::test]
    async fn retries_exhaust_after_three_attempts() {
        let handler: Arc<dyn ScrapeHandler> = Arc::new(NoopScrapeHandler);
        let browser = DomainBrowser::new(
            "example.com",
            Arc::new(FailingDownloader),
            Arc::downgrade(&handler),
        );
        browser.set_interval(Duration::from_millis(0));

        let task = Arc::new(RwLock::new(Task::new(
            "t",
            None,
            Url::parse("https://example.com/bad").unwrap(),
            TaskKind::Scrape,
        )));
        browser.push(task.clone()).unwrap();

        let b2 = Arc::clone(&browser);
        let handle = tokio::spawn(async move { b2.run().await });
        for _ in 0..100 {
            if task.read().unwrap().err_details().len() >= MAX_ATTEMPTS {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        browser.request_stop();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

        let guard = task.read().unwrap();
        assert_eq!(guard.err_details().len(), MAX_ATTEMPTS);
        assert_eq!(guard.state(), crate::task::TaskState::Failed);
    }

    #[test]
    fn push_rejects_depth_beyond_max() {
        let handler: Arc<dyn ScrapeHandler> = Arc::new(NoopScrapeHandler);
        let browser = DomainBrowser::new(
            "example.com",
            Arc::new(FailingDownloader),
            Arc::downgrade(&handler),
        );
        let parent = Arc::new(RwLock::new(Task::new(
            "p",
            None,
            Url::parse("https://example.com/1").unwrap(),
            TaskKind::Scrape,
        )));
        let mut current = parent;
        for _ in 0..=defaults::MAX_DEPTH {
            let next = Arc::new(RwLock::new(Task::new(
                "c",
                Some(&current),
                Url::parse("https://example.com/next").unwrap(),
                TaskKind::Scrape,
            )));
            current = next;
        }
        assert!(browser.push(current).is_err());
    }

    struct PartialReadDownloader;

    #[async_trait]
    impl crate::network::Downloader for PartialReadDownloader {
        async fn get(&self, _task: &Task) -> Result<DownloadResponse, DownloadError> {
            Err(DownloadError {
                code: ErrorCode::ReadResponse,
                msg: "connection reset".into(),
                reader_progress: Some(crate::task::ReaderProgress { cur: 128, total: Some(4096) }),
            })
        }
    }

    #[tokio::test]
    async fn partial_read_failure_records_reader_progress_on_task_meta() {
        let handler: Arc<dyn ScrapeHandler> = Arc::new(NoopScrapeHandler);
        let browser = DomainBrowser::new(
            "example.com",
            Arc::new(PartialReadDownloader),
            Arc::downgrade(&handler),
        );
        browser.set_interval(Duration::from_millis(0));

        let task = Arc::new(RwLock::new(Task::new(
            "t",
            None,
            Url::parse("https://example.com/big").unwrap(),
            TaskKind::Scrape,
        )));
        browser.push(task.clone()).unwrap();

        let b2 = Arc::clone(&browser);
        let handle = tokio::spawn(async move { b2.run().await });
        for _ in 0..50 {
            if task.read().unwrap().meta().reader.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        browser.request_stop();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

        let progress = task.read().unwrap().meta().reader.expect("reader progress not recorded");
        assert_eq!(progress.cur, 128);
        assert_eq!(progress.total, Some(4096));
    }
}
