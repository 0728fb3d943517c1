//! Video extraction backend
//!
//! The actual site handling, format selection and muxing are delegated to the
//! `yt-dlp` executable. This module only spawns it, scrapes its progress
//! output and reports back through [`ExtractorEvent`]s.

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::config::DownloadConfig;
use crate::core::models::{AppError, AppResult, ExtractorEvent, UNKNOWN_TITLE};

/// Sender half handed to [`Extractor::download`]
pub type EventSender = mpsc::UnboundedSender<ExtractorEvent>;

const PROGRESS_MARKER: &str = "vdm-progress:";
const FILEPATH_MARKER: &str = "vdm-filepath:";

/// Something that can resolve a title and download a URL
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Metadata-only lookup of the video title
    async fn fetch_title(&self, url: &str) -> AppResult<String>;

    /// Download `url` into `output_dir`, streaming progress into `events`.
    ///
    /// Returns the final file path when the tool reported one.
    async fn download(
        &self,
        url: &str,
        output_dir: &Path,
        events: EventSender,
    ) -> AppResult<Option<String>>;
}

/// One classified line of yt-dlp output
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    Progress(f64),
    FilePath(String),
    Other,
}

fn progress_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^vdm-progress:(?P<done>[^:]+):(?P<total>[^:]+):(?P<estimate>[^:]+)$").ok()
    })
    .as_ref()
}

fn parse_bytes(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Turn the downloaded/total/estimate triple into a percentage.
///
/// `total_bytes` wins over the estimate; with neither (or a zero total) the
/// line carries no usable progress.
pub fn progress_percent(downloaded: f64, total: Option<f64>, estimate: Option<f64>) -> Option<f64> {
    let total = total.filter(|t| *t > 0.0).or(estimate.filter(|t| *t > 0.0))?;
    Some((downloaded / total * 100.0).clamp(0.0, 100.0))
}

/// Classify a line printed by yt-dlp under our progress/print templates
pub fn parse_output_line(line: &str) -> OutputLine {
    let line = line.trim();

    if let Some(path) = line.strip_prefix(FILEPATH_MARKER) {
        let path = path.trim();
        if !path.is_empty() && path != "NA" {
            return OutputLine::FilePath(path.to_string());
        }
        return OutputLine::Other;
    }

    if let Some(caps) = progress_regex().and_then(|re| re.captures(line)) {
        let downloaded = caps.name("done").and_then(|m| parse_bytes(m.as_str()));
        let total = caps.name("total").and_then(|m| parse_bytes(m.as_str()));
        let estimate = caps.name("estimate").and_then(|m| parse_bytes(m.as_str()));

        if let Some(percent) = downloaded.and_then(|d| progress_percent(d, total, estimate)) {
            return OutputLine::Progress(percent);
        }
    }

    OutputLine::Other
}

/// Extractor backed by the `yt-dlp` command line tool
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    binary: String,
    format: String,
    filename_template: String,
}

#[derive(Debug, Default)]
struct StreamSummary {
    filename: Option<String>,
    last_message: Option<String>,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<String>) -> Self {
        let defaults = DownloadConfig::default();
        Self {
            binary: binary.into(),
            format: defaults.format,
            filename_template: defaults.filename_template,
        }
    }

    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            binary: config.ytdlp_path.clone(),
            format: config.format.clone(),
            filename_template: config.filename_template.clone(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// `yt-dlp --version`
    pub async fn version(&self) -> AppResult<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(AppError::Extractor(format!(
                "{} --version exited with {}",
                self.binary, output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub async fn is_available(&self) -> bool {
        self.version().await.is_ok()
    }

    fn spawn_error(&self, e: std::io::Error) -> AppError {
        AppError::Extractor(format!("Failed to start {}: {}", self.binary, e))
    }

    fn download_args(&self, url: &str, output_dir: &Path) -> Vec<String> {
        let template = output_dir.join(&self.filename_template);
        vec![
            "-f".to_string(),
            self.format.clone(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--newline".to_string(),
            // --print turns on quiet mode, so progress has to be forced back on
            "--no-simulate".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{}%(progress.downloaded_bytes)s:%(progress.total_bytes)s:%(progress.total_bytes_estimate)s",
                PROGRESS_MARKER
            ),
            "--print".to_string(),
            format!("after_move:{}%(filepath)s", FILEPATH_MARKER),
            "--".to_string(),
            url.to_string(),
        ]
    }
}

/// Read `reader` to EOF, forwarding progress and remembering the final path
/// and the last plain message.
///
/// Lines are decoded lossily; the pipe must stay drained or yt-dlp dies of
/// SIGPIPE.
async fn scan_stream<R>(reader: R, events: EventSender) -> StreamSummary
where
    R: AsyncRead + Unpin,
{
    let mut summary = StreamSummary::default();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Error reading yt-dlp output: {}", e);
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf);
        match parse_output_line(&line) {
            OutputLine::Progress(percent) => {
                let _ = events.send(ExtractorEvent::Progress(percent));
            }
            OutputLine::FilePath(path) => summary.filename = Some(path),
            OutputLine::Other => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    debug!("yt-dlp: {}", trimmed);
                    summary.last_message = Some(trimmed.to_string());
                }
            }
        }
    }

    summary
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn fetch_title(&self, url: &str) -> AppResult<String> {
        debug!("Fetching title for {}", url);

        let output = Command::new(&self.binary)
            .args([
                "--dump-single-json",
                "--skip-download",
                "--no-playlist",
                "--no-warnings",
                "--",
                url,
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .last()
                .map(str::to_string)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            return Err(AppError::Extractor(message));
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        let title = info
            .get("title")
            .and_then(|t| t.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(UNKNOWN_TITLE)
            .to_string();

        Ok(title)
    }

    async fn download(
        &self,
        url: &str,
        output_dir: &Path,
        events: EventSender,
    ) -> AppResult<Option<String>> {
        info!("Starting yt-dlp for {}", url);

        let mut child = Command::new(&self.binary)
            .args(self.download_args(url, output_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Extractor("yt-dlp stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Extractor("yt-dlp stderr unavailable".to_string()))?;

        let (out_summary, err_summary, status) = tokio::join!(
            scan_stream(stdout, events.clone()),
            scan_stream(stderr, events.clone()),
            child.wait(),
        );
        let status = status?;

        if !status.success() {
            let message = err_summary
                .last_message
                .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
            warn!("yt-dlp failed for {}: {}", url, message);
            return Err(AppError::Extractor(message));
        }

        let filename = out_summary.filename.or(err_summary.filename);
        let _ = events.send(ExtractorEvent::Finished {
            filename: filename.clone(),
        });

        info!("yt-dlp finished {} -> {:?}", url, filename);
        Ok(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_progress_with_total() {
        assert_eq!(
            parse_output_line("vdm-progress:512:1024:NA"),
            OutputLine::Progress(50.0)
        );
    }

    #[test]
    fn falls_back_to_estimate() {
        assert_eq!(
            parse_output_line("vdm-progress:250:NA:1000.0"),
            OutputLine::Progress(25.0)
        );
    }

    #[test]
    fn ignores_progress_without_any_total() {
        assert_eq!(parse_output_line("vdm-progress:250:NA:NA"), OutputLine::Other);
        assert_eq!(parse_output_line("vdm-progress:250:0:0"), OutputLine::Other);
        assert_eq!(parse_output_line("vdm-progress:NA:100:NA"), OutputLine::Other);
    }

    #[test]
    fn clamps_overshooting_estimate() {
        assert_eq!(
            parse_output_line("vdm-progress:1200:NA:1000"),
            OutputLine::Progress(100.0)
        );
    }

    #[test]
    fn parses_final_filepath() {
        assert_eq!(
            parse_output_line("vdm-filepath:/tmp/downloads/My Clip: part 1.mp4"),
            OutputLine::FilePath("/tmp/downloads/My Clip: part 1.mp4".to_string())
        );
        assert_eq!(parse_output_line("vdm-filepath:NA"), OutputLine::Other);
    }

    #[test]
    fn other_lines_are_other() {
        assert_eq!(
            parse_output_line("[youtube] 2PuFyjAs7JA: Downloading webpage"),
            OutputLine::Other
        );
        assert_eq!(parse_output_line(""), OutputLine::Other);
    }

    #[test]
    fn download_args_use_configured_template() {
        let extractor = YtDlpExtractor::new("yt-dlp");
        let args = extractor.download_args("https://example.com/v", Path::new("/data"));

        let format_at = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[format_at + 1], "best");
        let output_at = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(
            Path::new(&args[output_at + 1]),
            Path::new("/data").join("%(title)s.%(ext)s")
        );
        assert_eq!(args.last().unwrap(), "https://example.com/v");
    }

    #[tokio::test]
    async fn missing_binary_is_extractor_error() {
        let extractor = YtDlpExtractor::new("/nonexistent/yt-dlp-binary");
        let err = extractor
            .fetch_title("https://example.com/video")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Extractor(_)));
        assert!(!extractor.is_available().await);
    }

    /// Install a shell script standing in for yt-dlp
    #[cfg(unix)]
    fn fake_ytdlp(dir: &tempfile::TempDir, body: &str) -> YtDlpExtractor {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        YtDlpExtractor::new(path.to_string_lossy().into_owned())
    }

    #[cfg(unix)]
    async fn run_download(
        extractor: &YtDlpExtractor,
        dir: &tempfile::TempDir,
    ) -> (AppResult<Option<String>>, Vec<ExtractorEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = extractor
            .download("https://example.com/v", dir.path(), tx)
            .await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (result, events)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn download_reports_progress_and_final_path() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = fake_ytdlp(
            &dir,
            r#"echo "[youtube] abc: Downloading webpage"
echo "vdm-progress:25:100:NA"
echo "vdm-progress:50:NA:200"
echo "vdm-filepath:/tmp/downloads/My Clip.mp4"
exit 0"#,
        );

        let (result, events) = run_download(&extractor, &dir).await;

        assert_eq!(
            result.unwrap().as_deref(),
            Some("/tmp/downloads/My Clip.mp4")
        );
        assert_eq!(
            events,
            vec![
                ExtractorEvent::Progress(25.0),
                ExtractorEvent::Progress(25.0),
                ExtractorEvent::Finished {
                    filename: Some("/tmp/downloads/My Clip.mp4".to_string())
                },
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn download_survives_non_utf8_output() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = fake_ytdlp(
            &dir,
            r#"printf '[download] Destination: caf\351.mp4\n'
printf 'caf\351 warning\n' >&2
echo "vdm-progress:50:100:NA"
echo "vdm-filepath:/tmp/x.mp4"
exit 0"#,
        );

        let (result, events) = run_download(&extractor, &dir).await;

        assert_eq!(result.unwrap().as_deref(), Some("/tmp/x.mp4"));
        assert!(events.contains(&ExtractorEvent::Progress(50.0)));
        assert_eq!(
            events.last(),
            Some(&ExtractorEvent::Finished {
                filename: Some("/tmp/x.mp4".to_string())
            })
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn download_failure_uses_last_stderr_line() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = fake_ytdlp(
            &dir,
            r#"echo "vdm-progress:10:100:NA"
echo "WARNING: slow connection" >&2
echo "ERROR: Unsupported URL: https://example.com/v" >&2
echo "" >&2
exit 1"#,
        );

        let (result, events) = run_download(&extractor, &dir).await;

        match result {
            Err(AppError::Extractor(message)) => {
                assert_eq!(message, "ERROR: Unsupported URL: https://example.com/v")
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(events, vec![ExtractorEvent::Progress(10.0)]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn download_failure_without_stderr_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = fake_ytdlp(&dir, "exit 3");

        let (result, events) = run_download(&extractor, &dir).await;

        match result {
            Err(AppError::Extractor(message)) => {
                assert!(message.starts_with("yt-dlp exited with"), "{}", message);
                assert!(message.contains('3'), "{}", message);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(events.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn title_is_read_from_json_dump() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = fake_ytdlp(&dir, r#"echo '{"id": "abc", "title": "  My Clip  "}'"#);
        assert_eq!(
            extractor.fetch_title("https://example.com/v").await.unwrap(),
            "My Clip"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn empty_title_becomes_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = fake_ytdlp(&dir, r#"echo '{"id": "abc", "title": ""}'"#);
        assert_eq!(
            extractor.fetch_title("https://example.com/v").await.unwrap(),
            UNKNOWN_TITLE
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn title_failure_uses_last_stderr_line() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = fake_ytdlp(
            &dir,
            r#"echo "ERROR: Video unavailable" >&2
exit 1"#,
        );
        match extractor.fetch_title("https://example.com/v").await {
            Err(AppError::Extractor(message)) => assert_eq!(message, "ERROR: Video unavailable"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    #[ignore = "requires yt-dlp on PATH and network access"]
    async fn real_title_lookup() {
        let extractor = YtDlpExtractor::new("yt-dlp");
        let title = extractor
            .fetch_title("https://www.youtube.com/watch?v=2PuFyjAs7JA")
            .await
            .unwrap();
        assert_ne!(title, UNKNOWN_TITLE);
    }
}
