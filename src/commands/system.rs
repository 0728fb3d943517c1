//! System command handlers
//!
//! Reports the service version and whether the yt-dlp executable is usable.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub name: String,
    pub version: String,
    pub ytdlp_path: String,
    pub ytdlp_available: bool,
    pub ytdlp_version: Option<String>,
    /// yt-dlp format selector in effect
    pub format: String,
    pub download_path: String,
    pub listen_address: String,
}

pub async fn get_system_info(State(state): State<AppState>) -> Json<SystemInfo> {
    let ytdlp_version = match state.extractor.version().await {
        Ok(version) => {
            info!("📺 yt-dlp {} is available", version);
            Some(version)
        }
        Err(e) => {
            warn!("⚠️ yt-dlp is not available: {}", e);
            None
        }
    };

    Json(SystemInfo {
        name: crate::NAME.to_string(),
        version: crate::VERSION.to_string(),
        ytdlp_path: state.extractor.binary().to_string(),
        ytdlp_available: ytdlp_version.is_some(),
        ytdlp_version,
        format: state.config.download.format.clone(),
        download_path: state
            .download_manager
            .download_path()
            .display()
            .to_string(),
        listen_address: format!("{}:{}", state.config.server.host, state.config.server.port),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;
    use crate::core::extractor::YtDlpExtractor;
    use crate::core::manager::DownloadManager;
    use crate::core::test_support::MockExtractor;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reports_missing_ytdlp() {
        let temp = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.download.download_path = temp.path().join("downloads");
        config.download.queue_file = temp.path().join("queue.json");
        config.download.format = "bestaudio".to_string();
        config.server.port = 9090;

        let state = AppState {
            download_manager: DownloadManager::new(
                config.download.clone(),
                MockExtractor::succeeding("t"),
            )
            .unwrap(),
            extractor: Arc::new(YtDlpExtractor::new("/nonexistent/yt-dlp")),
            config: Arc::new(config),
        };

        let Json(info) = get_system_info(State(state)).await;
        assert_eq!(info.name, crate::NAME);
        assert!(!info.ytdlp_available);
        assert!(info.ytdlp_version.is_none());
        assert_eq!(info.ytdlp_path, "/nonexistent/yt-dlp");
        assert_eq!(info.format, "bestaudio");
        assert_eq!(info.listen_address, "127.0.0.1:9090");
        assert_eq!(
            info.download_path,
            temp.path().join("downloads").display().to_string()
        );
    }
}
