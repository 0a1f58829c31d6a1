//! Closed error taxonomy for the crawl engine.
//!
//! Codes are wire-stable integers inherited from the original collector so that
//! snapshots and persisted logs remain comparable across runs.

use thiserror::Error;

/// One entry of the closed error taxonomy, carrying its wire-stable integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    NewRequest,
    DoRequest,
    ReadResponse,
    Callback,
    CallbackTask,
    HttpUnknown,
    HttpNotFound,
}

impl ErrorCode {
    /// The wire-stable integer for this code.
    pub fn as_u32(&self) -> u32 {
        match self {
            ErrorCode::NewRequest => 512,
            ErrorCode::DoRequest => 516,
            ErrorCode::ReadResponse => 1024,
            ErrorCode::Callback => 1040,
            ErrorCode::CallbackTask => 1044,
            ErrorCode::HttpUnknown => 10_000,
            ErrorCode::HttpNotFound => 10_404,
        }
    }

    /// HTTP status mapping: 404 is its own code, other non-2xx/3xx is `HttpUnknown`.
    pub fn from_status(status: u16) -> Self {
        if status == 404 {
            ErrorCode::HttpNotFound
        } else {
            ErrorCode::HttpUnknown
        }
    }

    /// Whether the retry policy in DomainBrowser should re-queue a task failing with this code.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::DoRequest | ErrorCode::ReadResponse | ErrorCode::HttpUnknown
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Error surfaced synchronously to callers of scheduler/collector operations
/// (as opposed to `ErrorCode`, which is recorded on a task's attempt history).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("url has empty host: {0}")]
    EmptyHost(String),

    #[error("failed to parse url {0}: {1}")]
    UrlParse(String, #[source] url::ParseError),

    #[error("depth {depth} exceeds max_depth {max_depth} for domain {domain}")]
    DepthExceeded {
        domain: String,
        depth: u32,
        max_depth: u32,
    },

    #[error("task queue is full (capacity {0})")]
    QueueFull(usize),

    #[error("task queue is closed")]
    QueueClosed,

    #[error("invalid css selector {0}")]
    InvalidSelector(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
