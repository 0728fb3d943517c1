//! Download Manager - queue orchestration
//!
//! Owns the ordered queue, persists it after every mutation and runs a single
//! background worker that downloads queued items one at a time through an
//! [`Extractor`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::config::DownloadConfig;
use crate::core::extractor::Extractor;
use crate::core::models::{
    AppError, AppResult, DownloadItem, DownloadStatus, ExtractorEvent, QueueStats, UNKNOWN_TITLE,
};
use crate::core::queue_store::QueueStore;
use crate::utils::file_utils::remove_file_if_exists;

/// Cheaply clonable handle to the shared queue state
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: DownloadConfig,

    /// Ordered queue, insertion order
    queue: RwLock<Vec<DownloadItem>>,

    store: QueueStore,

    extractor: Arc<dyn Extractor>,

    /// Set while the worker loop is alive
    is_processing: AtomicBool,

    /// Set by `start()`; the worker is only spawned automatically once running
    is_running: AtomicBool,

    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DownloadManager {
    /// Create the manager, making sure the download directory exists and
    /// restoring the persisted queue
    pub fn new(config: DownloadConfig, extractor: Arc<dyn Extractor>) -> AppResult<Self> {
        std::fs::create_dir_all(&config.download_path)?;

        let store = QueueStore::new(&config.queue_file);
        let queue = store.load();

        info!(
            "Download manager ready: {} items, downloads in {:?}",
            queue.len(),
            config.download_path
        );

        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                queue: RwLock::new(queue),
                store,
                extractor,
                is_processing: AtomicBool::new(false),
                is_running: AtomicBool::new(false),
                worker: Mutex::new(None),
            }),
        })
    }

    /// Start background processing, picking up anything left queued
    pub fn start(&self) {
        if self.inner.is_running.swap(true, Ordering::SeqCst) {
            warn!("Download manager is already running");
            return;
        }

        info!("🚀 Download manager started");
        if self.next_queued_id().is_some() {
            self.spawn_worker();
        }
    }

    /// Stop the worker. An in-flight yt-dlp process is killed and its item
    /// stays `Downloading` on disk, which re-queues it on the next load.
    pub fn shutdown(&self) {
        if !self.inner.is_running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.inner.worker.lock().take() {
            handle.abort();
        }
        self.inner.is_processing.store(false, Ordering::SeqCst);
        info!("🛑 Download manager stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running.load(Ordering::SeqCst)
    }

    pub fn is_processing(&self) -> bool {
        self.inner.is_processing.load(Ordering::SeqCst)
    }

    pub fn download_path(&self) -> &Path {
        &self.inner.config.download_path
    }

    /// Snapshot of the queue in order
    pub fn items(&self) -> Vec<DownloadItem> {
        self.inner.queue.read().clone()
    }

    pub fn get_item(&self, item_id: &str) -> Option<DownloadItem> {
        self.inner
            .queue
            .read()
            .iter()
            .find(|item| item.id == item_id)
            .cloned()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats::from_items(self.inner.queue.read().iter())
    }

    /// Add a URL to the end of the queue
    pub async fn add_to_queue(&self, url: &str) -> AppResult<DownloadItem> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::Validation("Please enter a URL".to_string()));
        }

        let item = DownloadItem::new(url);
        self.inner.queue.write().push(item.clone());
        self.persist().await;

        info!("➕ Queued {} ({})", item.url, item.id);
        self.spawn_worker();

        Ok(item)
    }

    /// Remove an item and delete its downloaded file
    pub async fn remove_from_queue(&self, item_id: &str) -> AppResult<DownloadItem> {
        let removed = {
            let mut queue = self.inner.queue.write();
            let position = queue
                .iter()
                .position(|item| item.id == item_id)
                .ok_or_else(|| AppError::NotFound("Item not found".to_string()))?;

            if queue[position].status == DownloadStatus::Downloading {
                return Err(AppError::InvalidState(
                    "Cannot remove an active download".to_string(),
                ));
            }

            queue.remove(position)
        };

        delete_item_file(&removed).await;
        self.persist().await;

        info!("🗑️ Removed {} from queue", removed.id);
        Ok(removed)
    }

    /// Drop all completed and failed items along with their files
    pub async fn clear_completed(&self) -> AppResult<usize> {
        let removed: Vec<DownloadItem> = {
            let mut queue = self.inner.queue.write();
            let (finished, remaining): (Vec<_>, Vec<_>) = queue
                .drain(..)
                .partition(|item| item.status.is_finished());
            *queue = remaining;
            finished
        };

        for item in &removed {
            delete_item_file(item).await;
        }
        self.persist().await;

        info!("🧹 Cleared {} finished items", removed.len());
        Ok(removed.len())
    }

    /// Put every failed item back in line
    pub async fn retry_failed(&self) -> AppResult<usize> {
        let retried = {
            let mut queue = self.inner.queue.write();
            let mut count = 0;
            for item in queue
                .iter_mut()
                .filter(|item| item.status == DownloadStatus::Failed)
            {
                item.reset_to_queued();
                item.error_message = None;
                count += 1;
            }
            count
        };

        if retried > 0 {
            self.persist().await;
            self.spawn_worker();
        }

        info!("🔄 Re-queued {} failed items", retried);
        Ok(retried)
    }

    /// Resolve the on-disk file of a completed item
    pub fn download_file_path(&self, item_id: &str) -> AppResult<PathBuf> {
        let item = self
            .get_item(item_id)
            .ok_or_else(|| AppError::NotFound("Item not found".to_string()))?;

        let filename = match (&item.status, &item.filename) {
            (DownloadStatus::Completed, Some(filename)) => filename,
            _ => {
                return Err(AppError::InvalidState(
                    "File not available for download".to_string(),
                ))
            }
        };

        let path = PathBuf::from(filename);
        if !path.is_file() {
            return Err(AppError::NotFound("File not found on disk".to_string()));
        }

        Ok(path)
    }

    /// Work through the queue until no `Queued` item is left.
    ///
    /// Returns immediately if another worker is already running.
    pub async fn process_queue(&self) {
        if self.inner.is_processing.swap(true, Ordering::SeqCst) {
            debug!("Queue is already being processed");
            return;
        }
        self.run_worker().await;
    }

    fn spawn_worker(&self) {
        if !self.is_running() {
            return;
        }
        if self
            .inner
            .is_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            manager.run_worker().await;
        });
        *self.inner.worker.lock() = Some(handle);
    }

    async fn run_worker(&self) {
        debug!("Queue worker started");
        let delay = self.inner.config.delay_between_downloads();

        loop {
            match self.next_queued_id() {
                Some(item_id) => {
                    if let Err(e) = self.download_video(&item_id).await {
                        warn!("Skipping {}: {}", item_id, e);
                    }
                    tokio::time::sleep(delay).await;
                }
                None => {
                    self.inner.is_processing.store(false, Ordering::SeqCst);

                    // An add may have slipped in between the check and the store
                    let reclaimed = self.next_queued_id().is_some()
                        && self
                            .inner
                            .is_processing
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok();
                    if !reclaimed {
                        break;
                    }
                }
            }
        }

        debug!("Queue worker idle");
    }

    fn next_queued_id(&self) -> Option<String> {
        self.inner
            .queue
            .read()
            .iter()
            .find(|item| item.status == DownloadStatus::Queued)
            .map(|item| item.id.clone())
    }

    /// Download a single item, recording the outcome on it.
    ///
    /// Extractor failures end up in the item's `error_message`; the returned
    /// error only covers the item having disappeared.
    pub async fn download_video(&self, item_id: &str) -> AppResult<DownloadItem> {
        let url = self
            .update_item(item_id, |item| {
                item.status = DownloadStatus::Downloading;
                item.progress = 0.0;
                item.error_message = None;
                item.url.clone()
            })
            .ok_or_else(|| AppError::NotFound(format!("Item not found: {}", item_id)))?;
        self.persist().await;

        info!("⬇️ Downloading {} ({})", url, item_id);
        let outcome = self.run_extractor(item_id, &url).await;

        let finished = self.update_item(item_id, |item| {
            match outcome {
                Ok(filename) => {
                    item.status = DownloadStatus::Completed;
                    item.progress = 100.0;
                    if filename.is_some() {
                        item.filename = filename;
                    }
                }
                Err(e) => {
                    item.status = DownloadStatus::Failed;
                    item.error_message = Some(e.to_string());
                }
            }
            item.clone()
        });
        self.persist().await;

        match finished {
            Some(item) => {
                match item.status {
                    DownloadStatus::Completed => info!("✅ Completed {} ({})", item.title, item.id),
                    _ => error!(
                        "❌ Failed {} ({}): {}",
                        item.url,
                        item.id,
                        item.error_message.as_deref().unwrap_or_default()
                    ),
                }
                Ok(item)
            }
            None => Err(AppError::NotFound(format!(
                "Item removed during download: {}",
                item_id
            ))),
        }
    }

    async fn run_extractor(&self, item_id: &str, url: &str) -> AppResult<Option<String>> {
        let title = self.inner.extractor.fetch_title(url).await?;
        let title = if title.trim().is_empty() {
            UNKNOWN_TITLE.to_string()
        } else {
            title
        };
        self.update_item(item_id, |item| item.title = title);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let download = self
            .inner
            .extractor
            .download(url, &self.inner.config.download_path, tx);
        tokio::pin!(download);

        let result = loop {
            tokio::select! {
                Some(event) = rx.recv() => self.apply_event(item_id, event),
                result = &mut download => break result,
            }
        };

        while let Ok(event) = rx.try_recv() {
            self.apply_event(item_id, event);
        }

        result
    }

    fn apply_event(&self, item_id: &str, event: ExtractorEvent) {
        self.update_item(item_id, |item| match event {
            ExtractorEvent::Progress(percent) => item.set_progress(percent),
            ExtractorEvent::Finished { filename } => {
                item.progress = 100.0;
                if filename.is_some() {
                    item.filename = filename;
                }
            }
        });
    }

    /// Mutate an item in place; `None` when it no longer exists
    fn update_item<T>(&self, item_id: &str, f: impl FnOnce(&mut DownloadItem) -> T) -> Option<T> {
        let mut queue = self.inner.queue.write();
        queue.iter_mut().find(|item| item.id == item_id).map(f)
    }

    async fn persist(&self) {
        let inner = &self.inner;
        if let Err(e) = inner.store.save_with(|| inner.queue.read().clone()).await {
            error!("Error saving queue to {:?}: {}", inner.store.path(), e);
        }
    }
}

async fn delete_item_file(item: &DownloadItem) {
    let Some(filename) = item.filename.as_deref() else {
        return;
    };

    match remove_file_if_exists(Path::new(filename)).await {
        Ok(true) => info!("Deleted file: {}", filename),
        Ok(false) => debug!("File already gone: {}", filename),
        Err(e) => warn!("Error deleting file {}: {}", filename, e),
    }
}
