use std::env;
use std::path::PathBuf;

use anyhow::Context;
use tracing::{info, warn};

use video_download_manager::commands::router;
use video_download_manager::utils::logging::init_tracing;
use video_download_manager::{AppConfig, AppState, NAME, VERSION};

fn parse_config_arg() -> Option<PathBuf> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => return args.next().map(PathBuf::from),
            "--help" | "-h" => {
                println!("Usage: {NAME} [--config <path>]");
                std::process::exit(0);
            }
            other => eprintln!("Ignoring unknown argument: {other}"),
        }
    }
    None
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = parse_config_arg();
    let loaded = AppConfig::load_or_default(config_path.as_deref());
    let config = loaded.config;
    let _log_guard = init_tracing(&config.logging);

    info!("🚀 Starting {} v{}", NAME, VERSION);
    match &loaded.source {
        Some(path) => info!("Loading configuration from: {:?}", path),
        None => info!("No config file found, using defaults and environment"),
    }
    if let Some(err) = loaded.error {
        warn!("{:#}. Using defaults", err);
    }

    let addr = config.server.socket_addr()?;
    let state = AppState::new(config).context("Failed to initialize download manager")?;

    if !state.extractor.is_available().await {
        warn!(
            "yt-dlp not found at '{}'; downloads will fail until it is installed",
            state.extractor.binary()
        );
    }

    let manager = state.download_manager.clone();
    manager.start();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🌐 Web UI available at http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    manager.shutdown();
    info!("👋 {} stopped", NAME);
    Ok(())
}
