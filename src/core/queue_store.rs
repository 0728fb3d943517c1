//! JSON persistence for the download queue

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::models::{AppResult, DownloadItem, DownloadStatus};

/// Reads and writes the queue file.
///
/// Writes go through a temporary sibling and a rename, and are serialized
/// by `write_lock` so an older snapshot can never land after a newer one.
pub struct QueueStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl QueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted queue.
    ///
    /// A missing file yields an empty queue; so does an unreadable one, after
    /// a warning. Items caught mid-download are put back to `Queued`.
    pub fn load(&self) -> Vec<DownloadItem> {
        if !self.path.exists() {
            debug!("No queue file at {:?}, starting empty", self.path);
            return Vec::new();
        }

        match self.read_items() {
            Ok(mut items) => {
                let mut interrupted = 0;
                for item in items
                    .iter_mut()
                    .filter(|item| item.status == DownloadStatus::Downloading)
                {
                    item.reset_to_queued();
                    interrupted += 1;
                }
                info!(
                    "Loaded {} queue items from {:?} ({} interrupted downloads re-queued)",
                    items.len(),
                    self.path,
                    interrupted
                );
                items
            }
            Err(e) => {
                warn!("Error loading queue from {:?}: {}", self.path, e);
                Vec::new()
            }
        }
    }

    fn read_items(&self) -> AppResult<Vec<DownloadItem>> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist the whole queue
    pub async fn save(&self, items: &[DownloadItem]) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write_snapshot(items).await
    }

    /// Persist whatever `snapshot` returns once the write lock is held.
    ///
    /// Taking the snapshot under the lock keeps concurrent saves ordered.
    pub async fn save_with<F>(&self, snapshot: F) -> AppResult<()>
    where
        F: FnOnce() -> Vec<DownloadItem>,
    {
        let _guard = self.write_lock.lock().await;
        let items = snapshot();
        self.write_snapshot(&items).await
    }

    async fn write_snapshot(&self, items: &[DownloadItem]) -> AppResult<()> {
        let content = serde_json::to_string_pretty(items)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.tmp_path();
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!("Saved {} queue items to {:?}", items.len(), self.path);
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "queue.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
