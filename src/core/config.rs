//! Application configuration management
//!
//! Configuration is layered: built-in defaults, then an optional JSON/TOML
//! file, then `VDM__SECTION__KEY` environment variables.

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment overrides, e.g. `VDM__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "VDM";

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "VDM_CONFIG";

/// Main application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub download: DownloadConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Download queue and extractor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloadConfig {
    pub download_path: PathBuf,
    pub queue_file: PathBuf,
    /// yt-dlp executable, looked up on PATH unless absolute
    pub ytdlp_path: String,
    /// yt-dlp format selector
    pub format: String,
    /// yt-dlp output template, relative to `download_path`
    pub filename_template: String,
    pub delay_between_downloads_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive, overridden by RUST_LOG
    pub level: Option<String>,
    /// When set, logs go to `<directory>/backend.log` instead of stdout
    pub directory: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_path: PathBuf::from("./downloads"),
            queue_file: PathBuf::from("queue.json"),
            ytdlp_path: "yt-dlp".to_string(),
            format: "best".to_string(),
            filename_template: "%(title)s.%(ext)s".to_string(),
            delay_between_downloads_ms: 500,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse()
            .with_context(|| format!("Invalid listen address: {}", raw))
    }
}

impl DownloadConfig {
    pub fn delay_between_downloads(&self) -> Duration {
        Duration::from_millis(self.delay_between_downloads_ms)
    }
}

/// Outcome of [`AppConfig::load_or_default`].
///
/// Nothing is logged while loading since this runs before the tracing
/// subscriber exists; the caller reports `source` and `error` afterwards.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,
    /// Config file that was read, if any
    pub source: Option<PathBuf>,
    /// Why the defaults are in use
    pub error: Option<anyhow::Error>,
}

impl AppConfig {
    /// Pick the config file: an explicit path, then `VDM_CONFIG`, then the
    /// per-user config file when it exists
    pub fn resolve_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
        match explicit_path {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var_os(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .or_else(|| Self::get_config_path().ok().filter(|p| p.exists())),
        }
    }

    /// Load configuration from the resolved file, then apply environment
    /// overrides
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(explicit_path);
        Self::load_with(path.as_deref(), ENV_PREFIX)
    }

    /// Layered load with a caller-chosen environment prefix
    pub fn load_with(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                bail!("Config file not found: {:?}", path);
            }
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .with_context(|| "Failed to assemble configuration")?
            .try_deserialize()
            .with_context(|| "Failed to parse configuration")?;

        Ok(config)
    }

    /// Load and validate, falling back to defaults on any problem
    pub fn load_or_default(explicit_path: Option<&Path>) -> LoadedConfig {
        let source = Self::resolve_path(explicit_path);
        let loaded = Self::load_with(source.as_deref(), ENV_PREFIX).and_then(|cfg| {
            cfg.validate()
                .context("Invalid configuration detected")
                .map(|()| cfg)
        });

        match loaded {
            Ok(config) => LoadedConfig {
                config,
                source,
                error: None,
            },
            Err(err) => LoadedConfig {
                config: Self::default(),
                source,
                error: Some(err),
            },
        }
    }

    /// Get the path to the per-user configuration file
    pub fn get_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "videodownloader", "manager")
            .with_context(|| "Failed to get project directories")?;

        Ok(project_dirs.config_dir().join("config.json"))
    }

    /// Export configuration as JSON string
    pub fn export(&self) -> Result<String> {
        serde_json::to_string_pretty(self).with_context(|| "Failed to export configuration")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be greater than 0");
        }
        if self.server.host.trim().is_empty() {
            bail!("server.host cannot be empty");
        }
        if self.download.download_path.as_os_str().is_empty() {
            bail!("download.download_path cannot be empty");
        }
        if self.download.queue_file.as_os_str().is_empty() {
            bail!("download.queue_file cannot be empty");
        }
        if self.download.ytdlp_path.trim().is_empty() {
            bail!("download.ytdlp_path cannot be empty");
        }
        if self.download.format.trim().is_empty() {
            bail!("download.format cannot be empty");
        }
        if self.download.filename_template.trim().is_empty() {
            bail!("download.filename_template cannot be empty");
        }
        Ok(())
    }
}
