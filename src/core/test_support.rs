//! Scriptable extractor shared by the unit tests

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::extractor::{EventSender, Extractor};
use crate::core::models::{AppError, AppResult, ExtractorEvent};

pub enum Behavior {
    /// Report `title`, emit 50% then write a small file
    Succeed { title: String },
    FailTitle(String),
    /// Emit 30% then fail
    FailDownload(String),
    /// Emit 10% and never finish
    Hang,
}

pub struct MockExtractor {
    behavior: Behavior,
    pub title_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
}

impl MockExtractor {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            title_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
        })
    }

    pub fn succeeding(title: &str) -> Arc<Self> {
        Self::new(Behavior::Succeed {
            title: title.to_string(),
        })
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn fetch_title(&self, _url: &str) -> AppResult<String> {
        self.title_calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::FailTitle(msg) => Err(AppError::Extractor(msg.clone())),
            Behavior::Succeed { title } => Ok(title.clone()),
            _ => Ok(String::new()),
        }
    }

    async fn download(
        &self,
        _url: &str,
        output_dir: &Path,
        events: EventSender,
    ) -> AppResult<Option<String>> {
        let n = self.download_calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::FailDownload(msg) => {
                let _ = events.send(ExtractorEvent::Progress(30.0));
                Err(AppError::Extractor(msg.clone()))
            }
            Behavior::Hang => {
                let _ = events.send(ExtractorEvent::Progress(10.0));
                std::future::pending::<AppResult<Option<String>>>().await
            }
            _ => {
                let _ = events.send(ExtractorEvent::Progress(50.0));
                let path = output_dir.join(format!("video-{}.mp4", n));
                tokio::fs::write(&path, b"fake video content").await?;
                let filename = path.to_string_lossy().into_owned();
                let _ = events.send(ExtractorEvent::Finished {
                    filename: Some(filename.clone()),
                });
                Ok(Some(filename))
            }
        }
    }
}
