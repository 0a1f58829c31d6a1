//! Routes tasks to the right per-domain browser and owns browsers' lifecycle.
//!
//! Grounded on the teacher's `crawler` orchestration loop plus
//! `queue::task_queue::TaskQueue`'s bounded-channel + semaphore idiom.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::RwLock as StdRwLock;

use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::config::CollectorConfig;
use crate::error::{EngineError, EngineResult};
use crate::network::SharedDownloader;
use crate::scheduler::browser::{DomainBrowser, ScrapeHandler};
use crate::scheduler::cancel::CancelSignal;
use crate::snapshot::Row;
use crate::task::{Task, TaskId, TaskState};

pub struct Scheduler {
    config: CollectorConfig,
    downloader: SharedDownloader,
    scrape_handler: Weak<dyn ScrapeHandler>,
    browsers: RwLock<HashMap<String, Arc<DomainBrowser>>>,
    sender: mpsc::Sender<Arc<StdRwLock<Task>>>,
    receiver: tokio::sync::Mutex<Option<mpsc::Receiver<Arc<StdRwLock<Task>>>>>,
}

impl Scheduler {
    /// `scrape_handler` is weak: the Collector owns the Scheduler strongly, so
    /// the Scheduler must not hold a strong reference back (see `Task::parent`
    /// for the same pattern applied to the task tree).
    pub fn new(
        config: CollectorConfig,
        downloader: SharedDownloader,
        scrape_handler: Weak<dyn ScrapeHandler>,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        Arc::new(Self {
            config,
            downloader,
            scrape_handler,
            browsers: RwLock::new(HashMap::new()),
            sender,
            receiver: tokio::sync::Mutex::new(Some(receiver)),
        })
    }

    /// Validates and offers a task to the bounded queue. Depth is checked
    /// against the existing browser for the task's domain, if one exists.
    pub async fn add_task(&self, task: Arc<StdRwLock<Task>>) -> EngineResult<()> {
        let (domain, depth) = {
            let guard = task.read().expect("task lock poisoned");
            (guard.domain().to_string(), guard.depth())
        };

        let max_depth = {
            let browsers = self.browsers.read().await;
            browsers
                .get(&domain)
                .map(|b| b.max_depth())
                .unwrap_or(self.config.max_depth)
        };
        if depth > max_depth {
            return Err(EngineError::DepthExceeded {
                domain,
                depth,
                max_depth,
            });
        }

        self.sender
            .try_send(task)
            .map_err(|_| EngineError::QueueFull(self.config.queue_capacity))
    }

    /// Blocking dispatch loop: routes queued tasks to their domain's browser,
    /// creating it lazily on first sighting. Returns once `cancel` fires and
    /// every browser has drained to idle.
    pub async fn run(self: Arc<Self>, cancel: CancelSignal) {
        let mut receiver = self
            .receiver
            .lock()
            .await
            .take()
            .expect("Scheduler::run called more than once");

        info!("scheduler: starting");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("scheduler: cancellation received, stopping browsers");
                    break;
                }
                maybe_task = receiver.recv() => {
                    match maybe_task {
                        Some(task) => self.dispatch(task).await,
                        None => break,
                    }
                }
            }
        }

        let browsers: Vec<Arc<DomainBrowser>> = self.browsers.read().await.values().cloned().collect();
        for browser in &browsers {
            browser.request_stop();
        }
        for browser in browsers {
            while !browser.is_idle() {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        }
        self.browsers.write().await.clear();
        info!("scheduler: stopped, browser map empty");
    }

    async fn dispatch(&self, task: Arc<StdRwLock<Task>>) {
        let domain = task.read().expect("task lock poisoned").domain().to_string();

        let browser = {
            let browsers = self.browsers.read().await;
            browsers.get(&domain).cloned()
        };
        let browser = match browser {
            Some(b) => b,
            None => {
                let mut browsers = self.browsers.write().await;
                browsers
                    .entry(domain.clone())
                    .or_insert_with(|| {
                        let browser = DomainBrowser::with_policy(
                            domain.clone(),
                            self.config.parallelism_per_domain,
                            self.config.max_depth,
                            self.config.task_interval,
                            Arc::clone(&self.downloader),
                            self.scrape_handler.clone(),
                        );
                        let spawned = Arc::clone(&browser);
                        tokio::spawn(async move { spawned.run().await });
                        browser
                    })
                    .clone()
            }
        };

        if let Err((depth, max_depth)) = browser.push(task) {
            warn!(domain = %domain, depth, max_depth, "scheduler: rejected task past max depth");
        }
    }

    pub async fn get_task(&self, domain: &str, id: TaskId) -> Option<Arc<StdRwLock<Task>>> {
        self.browsers.read().await.get(domain)?.query(id)
    }

    pub async fn delete_task(&self, domain: &str, id: TaskId) -> Option<Arc<StdRwLock<Task>>> {
        self.browsers.read().await.get(domain)?.delete(id)
    }

    pub async fn set_process(&self, domain: &str, parallelism: usize) {
        if let Some(browser) = self.browsers.read().await.get(domain) {
            browser.set_parallelism(parallelism);
        }
    }

    pub async fn get_tree(&self, domain: &str) -> Vec<Arc<StdRwLock<Task>>> {
        self.browsers
            .read()
            .await
            .get(domain)
            .map(|b| b.tree())
            .unwrap_or_default()
    }

    /// Gathers rows across every browser, sorted by `(state asc, create_time desc)`.
    pub async fn get_rows(&self) -> Vec<Row> {
        let browsers = self.browsers.read().await;
        let mut rows: Vec<Row> = browsers
            .values()
            .flat_map(|b| b.list())
            .map(|t| Row::from_task(&t.read().expect("task lock poisoned")))
            .collect();

        rows.sort_by(|a, b| {
            state_rank(a.state)
                .cmp(&state_rank(b.state))
                .then_with(|| b.create_time.cmp(&a.create_time))
        });
        rows
    }
}

fn state_rank(state: TaskState) -> u8 {
    match state {
        TaskState::Init => 0,
        TaskState::Scheduling => 1,
        TaskState::Running => 2,
        TaskState::Failed => 3,
        TaskState::Successful => 4,
        TaskState::SuccessfulAll => 5,
    }
}
