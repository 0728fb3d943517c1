//! Core business logic module
//!
//! This module contains the domain models, queue persistence, the extractor
//! backend and the download manager.

pub mod config;
pub mod extractor;
pub mod manager;
pub mod models;
pub mod queue_store;

#[cfg(test)]
pub(crate) mod test_support;


// Re-export commonly used types
pub use config::AppConfig;
pub use manager::DownloadManager;
