//! Video Download Manager - Core Library
//!
//! A small web service that queues video URLs, downloads them one at a time
//! through yt-dlp, and serves the finished files back to the browser.

pub mod commands;
pub mod core;
pub mod utils;

// Re-export commonly used types
pub use core::{
    config::AppConfig,
    extractor::{Extractor, YtDlpExtractor},
    manager::DownloadManager,
    models::{AppError, AppResult, DownloadItem, DownloadStatus, QueueStats},
};

use std::sync::Arc;

/// Application state shared between HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub download_manager: DownloadManager,
    pub extractor: Arc<YtDlpExtractor>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Build the yt-dlp backed manager. The worker is not started here.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let extractor = Arc::new(YtDlpExtractor::from_config(&config.download));
        let download_manager = DownloadManager::new(config.download.clone(), extractor.clone())?;

        Ok(Self {
            download_manager,
            extractor,
            config: Arc::new(config),
        })
    }
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
