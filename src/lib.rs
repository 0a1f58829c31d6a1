pub mod collector;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod network;
pub mod scheduler;
pub mod snapshot;
pub mod storage;
pub mod task;
pub mod visited;

pub use collector::{Collector, HtmlElement, Request};
pub use config::{CollectorConfig, ConfigBuilder};
pub use domain::registrable_domain;
pub use error::{EngineError, EngineResult, ErrorCode};
pub use logging::init_logging;
pub use network::{DownloadError, Downloader, DownloadResponse, ReqwestDownloader, SharedDownloader};
pub use scheduler::{CancelSignal, DomainBrowser, Scheduler};
pub use snapshot::Row;
pub use task::{ErrorDetail, Task, TaskId, TaskKind, TaskList, TaskState};
pub use visited::VisitedIndex;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
