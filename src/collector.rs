//! Collector / callback pipeline (§4.6): registers HTML selector callbacks,
//! parses fetched bodies, dispatches matched elements to user code, and
//! bridges `request.visit`/`request.download` calls back into the Scheduler.

use std::sync::{Arc, RwLock as StdRwLock, Weak};

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use crate::config::CollectorConfig;
use crate::error::{EngineError, EngineResult, ErrorCode};
use crate::network::{DownloadResponse, ReqwestDownloader, SharedDownloader};
use crate::scheduler::{CancelSignal, ScrapeHandler, Scheduler};
use crate::snapshot::Row;
use crate::task::{Task, TaskKind};
use crate::visited::VisitedIndex;

type HtmlCallback = Arc<dyn Fn(Arc<StdRwLock<Task>>, HtmlElement) -> Result<(), String> + Send + Sync>;

/// A single matched DOM node, copied out of the parsed document so it can
/// outlive the selector iteration and cross into user closures freely.
pub struct HtmlElement {
    pub index: usize,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub request: Arc<Request>,
    document: Arc<Html>,
}

impl HtmlElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Text of the first match of `selector` within the whole document, or
    /// `default` if nothing matches (or the selector is malformed).
    pub fn get_text(&self, selector: &str, default: &str) -> String {
        let Ok(sel) = Selector::parse(selector) else {
            return default.to_string();
        };
        self.document
            .select(&sel)
            .next()
            .map(|el| el.text().collect::<String>())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}

/// Bridge handed to user callbacks for enqueuing follow-up work, carrying the
/// response's base URL for relative-link resolution.
pub struct Request {
    collector: Weak<Collector>,
    parent: Arc<StdRwLock<Task>>,
    base_url: Url,
}

impl Request {
    /// Resolves `raw_url` per the URL resolution rules and enqueues a scrape task.
    pub async fn visit(&self, raw_url: &str) -> EngineResult<()> {
        let Some(url) = resolve_url(&self.base_url, raw_url) else {
            return Ok(());
        };
        let Some(collector) = self.collector.upgrade() else {
            return Err(EngineError::QueueClosed);
        };
        collector.visit_from(Some(&self.parent), url).await
    }

    /// Resolves `raw_url` and enqueues a download task, priority above scrape.
    pub async fn download(&self, name: &str, dir: &str, raw_url: &str) -> EngineResult<()> {
        let Some(url) = resolve_url(&self.base_url, raw_url) else {
            return Ok(());
        };
        let Some(collector) = self.collector.upgrade() else {
            return Err(EngineError::QueueClosed);
        };
        collector
            .download_from(&self.parent, name.to_string(), dir.to_string(), url)
            .await
    }
}

/// Resolves a link found in a page against `base`, per §4.6's rules:
/// `#...` fragments are dropped, `//host/...` inherits the base scheme,
/// relative paths resolve against `base`, and any fragment is stripped.
fn resolve_url(base: &Url, raw: &str) -> Option<Url> {
    if raw.starts_with('#') {
        return None;
    }

    let with_scheme = if let Some(rest) = raw.strip_prefix("//") {
        format!("{}://{}", base.scheme(), rest)
    } else {
        raw.to_string()
    };

    let mut resolved = base.join(&with_scheme).ok()?;
    resolved.set_fragment(None);
    Some(resolved)
}

struct RegisteredSelector {
    selector: Selector,
    callback: HtmlCallback,
}

pub struct Collector {
    config: CollectorConfig,
    scheduler: Arc<Scheduler>,
    visited: Arc<VisitedIndex>,
    handlers: StdRwLock<Vec<RegisteredSelector>>,
    cancel: CancelSignal,
    self_weak: Weak<Collector>,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> EngineResult<Arc<Self>> {
        let downloader: SharedDownloader =
            Arc::new(ReqwestDownloader::new().map_err(|e| EngineError::Io(std::io::Error::other(e)))?);
        Ok(Arc::new_cyclic(|weak_self: &Weak<Collector>| {
            let scrape_handler: Weak<dyn ScrapeHandler> = weak_self.clone();
            Collector {
                scheduler: Scheduler::new(config.clone(), downloader, scrape_handler),
                visited: Arc::new(VisitedIndex::new()),
                handlers: StdRwLock::new(Vec::new()),
                cancel: CancelSignal::new(),
                self_weak: weak_self.clone(),
                config,
            }
        }))
    }

    /// Registers a selector callback; callbacks fire in registration order.
    pub fn on_html<F>(&self, selector: &str, callback: F) -> EngineResult<()>
    where
        F: Fn(Arc<StdRwLock<Task>>, HtmlElement) -> Result<(), String> + Send + Sync + 'static,
    {
        let parsed =
            Selector::parse(selector).map_err(|_| EngineError::InvalidSelector(selector.to_string()))?;
        self.handlers
            .write()
            .expect("handlers lock poisoned")
            .push(RegisteredSelector { selector: parsed, callback: Arc::new(callback) });
        Ok(())
    }

    /// Enqueues a seed URL.
    pub async fn visit(self: &Arc<Self>, raw_url: &str) -> EngineResult<()> {
        let url = Url::parse(raw_url).map_err(|e| EngineError::UrlParse(raw_url.to_string(), e))?;
        self.visit_from(None, url).await
    }

    async fn visit_from(self: &Arc<Self>, parent: Option<&Arc<StdRwLock<Task>>>, url: Url) -> EngineResult<()> {
        if url.host_str().unwrap_or("").is_empty() {
            return Err(EngineError::EmptyHost(url.to_string()));
        }
        if self.visited.is_visited(url.as_str()) {
            return Ok(());
        }

        let task = Arc::new(StdRwLock::new(Task::new("scrape", parent, url, TaskKind::Scrape)));
        self.scheduler.add_task(task).await
    }

    async fn download_from(
        self: &Arc<Self>,
        parent: &Arc<StdRwLock<Task>>,
        name: String,
        dir: String,
        url: Url,
    ) -> EngineResult<()> {
        if url.host_str().unwrap_or("").is_empty() {
            return Err(EngineError::EmptyHost(url.to_string()));
        }
        let task = Arc::new(StdRwLock::new(
            Task::new("download", Some(parent), url, TaskKind::Download { name, dir }).set_priority(1),
        ));
        self.scheduler.add_task(task).await
    }

    /// Blocking run until `cancel()` is called.
    pub async fn run(self: &Arc<Self>) {
        let cancel = self.cancel.clone();
        Arc::clone(&self.scheduler).run(cancel).await;
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn get_rows(&self) -> Vec<Row> {
        self.scheduler.get_rows().await
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }
}

#[async_trait]
impl ScrapeHandler for Collector {
    async fn on_scrape(
        &self,
        task: Arc<StdRwLock<Task>>,
        response: DownloadResponse,
    ) -> Result<(), (ErrorCode, String)> {
        let body = String::from_utf8_lossy(&response.body).into_owned();
        let base_url = task.read().expect("task lock poisoned").url().clone();

        let mut first_callback_err: Option<String> = None;
        {
            let document = Arc::new(Html::parse_document(&body));
            let request = Arc::new(Request {
                collector: self.self_weak.clone(),
                parent: Arc::clone(&task),
                base_url: base_url.clone(),
            });

            let handlers = self.handlers.read().expect("handlers lock poisoned");
            for registered in handlers.iter() {
                for (i, node) in document.select(&registered.selector).enumerate() {
                    let attrs =
                        node.value().attrs().map(|(k, v)| (k.to_string(), v.to_string())).collect();
                    let element = HtmlElement {
                        index: i + 1,
                        attrs,
                        text: node.text().collect::<String>(),
                        request: Arc::clone(&request),
                        document: Arc::clone(&document),
                    };
                    if let Err(msg) = (registered.callback)(Arc::clone(&task), element) {
                        first_callback_err.get_or_insert(msg);
                    }
                }
            }
        }

        self.visited.visit(base_url.as_str()).await;

        match first_callback_err {
            Some(msg) => Err((ErrorCode::CallbackTask, msg)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_fragment_resolves_to_none() {
        let base = Url::parse("https://example.test/a").unwrap();
        assert!(resolve_url(&base, "#section").is_none());
    }

    #[test]
    fn relative_path_resolves_against_base() {
        let base = Url::parse("https://example.test/a/").unwrap();
        let resolved = resolve_url(&base, "b").unwrap();
        assert_eq!(resolved.as_str(), "https://example.test/a/b");
    }

    #[test]
    fn scheme_relative_url_inherits_base_scheme() {
        let base = Url::parse("https://example.test/a").unwrap();
        let resolved = resolve_url(&base, "//cdn.example.test/x.js").unwrap();
        assert_eq!(resolved.scheme(), "https");
        assert_eq!(resolved.host_str(), Some("cdn.example.test"));
    }

    #[test]
    fn fragment_is_stripped_from_resolved_url() {
        let base = Url::parse("https://example.test/a").unwrap();
        let resolved = resolve_url(&base, "/b#top").unwrap();
        assert_eq!(resolved.fragment(), None);
        assert_eq!(resolved.as_str(), "https://example.test/b");
    }
}
