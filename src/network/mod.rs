pub mod downloader;

pub use downloader::{
    build_client, random_user_agent, DownloadError, Downloader, DownloadResponse,
    ReqwestDownloader, SharedDownloader,
};
