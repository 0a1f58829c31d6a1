//! Single-operation HTTP downloader. Never mutates task state — that's the
//! DomainBrowser's job (§4.3: "Does NOT update task state").

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rand::seq::SliceRandom;
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::defaults;
use crate::error::ErrorCode;
use crate::task::{ReaderProgress, Task};

/// A fixed pool of desktop/mobile user agents, matching the original
/// downloader's "random User-Agent from a fixed pool" contract.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// A downloaded response snapshot: status and full body, nothing else.
#[derive(Debug, Clone)]
pub struct DownloadResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub final_url: reqwest::Url,
}

/// A failed fetch. `reader_progress` is populated when the body read fails
/// partway through (§4.3: "stores a reader progress {cur,total} in task meta
/// under key reader"); it is `None` for request-construction/transport
/// failures, which never reach the body-read stage.
#[derive(Debug, Clone)]
pub struct DownloadError {
    pub code: ErrorCode,
    pub msg: String,
    pub reader_progress: Option<ReaderProgress>,
}

impl DownloadError {
    fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self { code, msg: msg.into(), reader_progress: None }
    }
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.msg)
    }
}

/// Abstraction over "fetch a task's URL"; `ReqwestDownloader` is the production
/// implementation, mockable for scheduler tests via a fake.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn get(&self, task: &Task) -> Result<DownloadResponse, DownloadError>;
}

/// Builds the shared `reqwest::Client`, following the teacher's
/// `HttpClientFactory::create_default_client` pattern but with the transport
/// tuning §4.3 specifies (15s dial/TLS, 60s idle, 100/10-per-host idle conns,
/// HTTP/2 attempted, one cookie jar shared process-wide).
pub fn build_client() -> reqwest::Result<Client> {
    Client::builder()
        .cookie_store(true)
        .timeout(defaults::MAX_FETCH_TIMEOUT)
        .connect_timeout(defaults::DIAL_TIMEOUT)
        .pool_idle_timeout(defaults::IDLE_CONN_TIMEOUT)
        .pool_max_idle_per_host(defaults::MAX_IDLE_CONNS_PER_HOST)
        .build()
}

pub struct ReqwestDownloader {
    client: Client,
}

impl ReqwestDownloader {
    pub fn new() -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client()?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Downloader for ReqwestDownloader {
    async fn get(&self, task: &Task) -> Result<DownloadResponse, DownloadError> {
        let request = self
            .client
            .get(task.url().clone())
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .timeout(Duration::from_secs(10 * 60))
            .build()
            .map_err(|e| DownloadError::new(ErrorCode::NewRequest, e.to_string()))?;

        debug!(task_id = %task.id(), url = %task.url(), "downloader: issuing GET");

        let resp = self
            .client
            .execute(request)
            .await
            .map_err(|e| DownloadError::new(ErrorCode::DoRequest, e.to_string()))?;

        let status = resp.status().as_u16();
        let final_url = resp.url().clone();
        let total = resp.content_length();

        if !(200..400).contains(&status) && status != 404 {
            warn!(task_id = %task.id(), status, "downloader: non-2xx/3xx/404 status");
        }

        let mut body = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => body.extend_from_slice(&bytes),
                Err(e) => {
                    return Err(DownloadError {
                        code: ErrorCode::ReadResponse,
                        msg: e.to_string(),
                        reader_progress: Some(ReaderProgress { cur: body.len() as u64, total }),
                    });
                }
            }
        }

        Ok(DownloadResponse {
            status,
            body,
            final_url,
        })
    }
}

pub type SharedDownloader = Arc<dyn Downloader>;
