use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::core::config::LoggingConfig;

pub const DEFAULT_LOG_FILTER: &str = "video_download_manager=info";

fn resolve_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = config.level.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
        EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!("Invalid log filter {:?}: {err}", directive);
            EnvFilter::new(DEFAULT_LOG_FILTER)
        })
    })
}

/// Install the global subscriber.
///
/// With `logging.directory` set, output goes to `backend.log` there and the
/// returned guard must be kept alive to flush it. Repeated calls are no-ops.
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = resolve_filter(config);

    if let Some(log_dir) = config.directory.as_deref() {
        match open_log_dir(log_dir) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::never(log_dir, "backend.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .try_init();
                return Some(guard);
            }
            Err(err) => eprintln!("{err}"),
        }
    }

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    None
}

fn open_log_dir(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| format!("Failed to create log directory {}: {e}", log_dir.display()))
}
