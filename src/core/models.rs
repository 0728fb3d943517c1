//! Core data models for the download manager

use serde::{Deserialize, Serialize};

/// Title used until the extractor reports a real one
pub const UNKNOWN_TITLE: &str = "Unknown";

/// Lifecycle of a queued download

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Queued,

    Downloading,

    Completed,

    Failed,
}

impl DownloadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed and failed items are the ones "Clear Completed" sweeps away
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl Default for DownloadStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_title() -> String {
    UNKNOWN_TITLE.to_string()
}

/// A single entry of the download queue

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadItem {
    pub id: String,

    pub url: String,

    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default)]
    pub status: DownloadStatus,

    /// Percent complete, 0.0..=100.0
    #[serde(default)]
    pub progress: f64,

    #[serde(default)]
    pub error_message: Option<String>,

    /// Final path of the downloaded file on disk
    #[serde(default)]
    pub filename: Option<String>,

    #[serde(default = "chrono::Utc::now")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl DownloadItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            title: default_title(),
            status: DownloadStatus::Queued,
            progress: 0.0,
            error_message: None,
            filename: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Put an interrupted download back in line
    pub fn reset_to_queued(&mut self) {
        self.status = DownloadStatus::Queued;
        self.progress = 0.0;
    }

    pub fn set_progress(&mut self, percent: f64) {
        self.progress = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
    }
}

/// Per-status counts shown above the queue

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub total: usize,

    pub queued: usize,

    pub downloading: usize,

    pub completed: usize,

    pub failed: usize,
}

impl QueueStats {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a DownloadItem>) -> Self {
        let mut stats = Self::default();
        for item in items {
            stats.total += 1;
            match item.status {
                DownloadStatus::Queued => stats.queued += 1,
                DownloadStatus::Downloading => stats.downloading += 1,
                DownloadStatus::Completed => stats.completed += 1,
                DownloadStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

/// Updates emitted by an extractor while a download runs

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractorEvent {
    Progress(f64),

    Finished { filename: Option<String> },
}

/// Application error types

#[derive(Debug, thiserror::Error)]

pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Extractor(String),
}

/// Result type alias for application operations

pub type AppResult<T> = Result<T, AppError>;
