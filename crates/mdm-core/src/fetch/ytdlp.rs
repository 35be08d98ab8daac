//! Fetcher backed by the bundled `yt-dlp` executable.
//!
//! Drives the tool as a subprocess with `--newline` so progress arrives as
//! parseable lines on stdout. Filename strategy (title plus source id to
//! dodge collisions) is owned here, not by the core.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::retry::{classify, ErrorCategory};

use super::{AbortToken, EventSink, FetchEvent, FetchFailure, FetchOptions, FetchOutcome, Fetcher, Format};

/// How often the abort flag is checked while the tool is quiet.
const ABORT_POLL: Duration = Duration::from_millis(250);

/// Local-executable fetch backend.
pub struct YtDlpFetcher {
    program: PathBuf,
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific executable instead of `yt-dlp` from `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        YtDlpFetcher {
            program: program.into(),
        }
    }
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        YtDlpFetcher {
            program: PathBuf::from("yt-dlp"),
        }
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn probe_title(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<Option<String>, FetchFailure> {
        let mut cmd = Command::new(&self.program);
        if !options.allow_playlists {
            cmd.arg("--no-playlist");
        }
        cmd.args(["--skip-download", "--no-warnings", "--print", "%(title)s"]);
        cmd.arg(url);

        let output = cmd.output().await.map_err(|e| FetchFailure {
            category: ErrorCategory::Configuration,
            message: format!("cannot launch {}: {e}", self.program.display()),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = last_error_line(&stderr)
                .unwrap_or_else(|| format!("{} exited with {}", self.program.display(), output.status));
            return Err(FetchFailure {
                category: classify(&message),
                message,
            });
        }

        let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if title.is_empty() || title == "NA" {
            return Ok(None);
        }
        Ok(Some(title))
    }

    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        events: EventSink,
        abort: AbortToken,
    ) -> FetchOutcome {
        let args = download_args(url, options);
        tracing::debug!(program = %self.program.display(), ?args, "launching fetch tool");

        let mut child = match Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return FetchOutcome::failure(
                    ErrorCategory::Configuration,
                    format!("cannot launch {}: {e}", self.program.display()),
                )
            }
        };

        // Collect stderr on the side; the tool writes its errors there while
        // progress stays on stdout.
        let stderr_lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let stderr_task = child.stderr.take().map(|stderr| {
            let sink = stderr_lines.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    sink.lock().unwrap().push(line);
                }
            })
        });

        let mut produced: Vec<PathBuf> = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if let Some(path) = parse_destination(&line) {
                                produced.push(path);
                            } else if let Some((percent, eta_secs)) = parse_progress(&line) {
                                events(FetchEvent::Progress {
                                    percent,
                                    eta_secs,
                                    message: line,
                                });
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "error reading fetch tool output");
                            break;
                        }
                    },
                    _ = tokio::time::sleep(ABORT_POLL) => {
                        if abort.is_aborted() {
                            tracing::debug!("abort requested, killing fetch tool");
                            let _ = child.start_kill();
                            let _ = child.wait().await;
                            return FetchOutcome::failure(ErrorCategory::Unknown, "fetch aborted");
                        }
                    }
                }
            }
        }

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => {
                return FetchOutcome::failure(
                    ErrorCategory::Unknown,
                    format!("waiting for fetch tool: {e}"),
                )
            }
        };
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        if abort.is_aborted() {
            return FetchOutcome::failure(ErrorCategory::Unknown, "fetch aborted");
        }

        if status.success() {
            let Some(primary) = produced.last() else {
                return FetchOutcome::failure(
                    ErrorCategory::Unknown,
                    "fetch tool finished without reporting an output file",
                );
            };
            let files = produced
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect();
            FetchOutcome::Success {
                files,
                saved_locator: primary.to_string_lossy().into_owned(),
            }
        } else {
            let stderr = stderr_lines.lock().unwrap().join("\n");
            let message = last_error_line(&stderr)
                .unwrap_or_else(|| format!("{} exited with {}", self.program.display(), status));
            FetchOutcome::Failure {
                category: classify(&message),
                message,
            }
        }
    }
}

/// Command line for one download attempt.
fn download_args(url: &str, options: &FetchOptions) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--newline".into(),
        "--no-warnings".into(),
        "--restrict-filenames".into(),
        "--fragment-retries".into(),
        "3".into(),
        "--skip-unavailable-fragments".into(),
    ];
    if options.allow_playlists {
        args.push("--yes-playlist".into());
    } else {
        args.push("--no-playlist".into());
    }
    args.push("-o".into());
    args.push(
        options
            .download_dir
            .join("%(title)s-%(id)s.%(ext)s")
            .to_string_lossy()
            .into_owned(),
    );
    if let Some(selector) = format_selector(options) {
        args.push("-f".into());
        args.push(selector);
    }
    args.push(url.into());
    args
}

/// Format selection, mirroring what the source site variants tolerate:
/// audio-only, height-capped mp4-preferred video, or no selector at all so
/// the tool picks.
fn format_selector(options: &FetchOptions) -> Option<String> {
    match options.format {
        Format::Audio => Some("bestaudio[ext=m4a]/bestaudio/best".to_string()),
        Format::Video => match options.quality.height_limit() {
            Some(h) => Some(format!(
                "best[height<={h}][ext=mp4]/best[height<={h}]/best"
            )),
            None => Some("best[ext=mp4]/best".to_string()),
        },
        Format::Best => None,
    }
}

/// Extract the output path from destination-style lines:
/// `[download] Destination: <path>`, `[Merger] Merging formats into "<path>"`,
/// `[download] <path> has already been downloaded`.
fn parse_destination(line: &str) -> Option<PathBuf> {
    if let Some(rest) = line.strip_prefix("[download] Destination: ") {
        return Some(PathBuf::from(rest.trim()));
    }
    if let Some(rest) = line.strip_prefix("[Merger] Merging formats into ") {
        return Some(PathBuf::from(rest.trim().trim_matches('"')));
    }
    if let Some(rest) = line.strip_prefix("[download] ") {
        if let Some(path) = rest.strip_suffix(" has already been downloaded") {
            return Some(PathBuf::from(path.trim()));
        }
    }
    None
}

/// Parse a `--newline` progress line into (percent, eta seconds).
/// Returns `None` for non-progress lines.
fn parse_progress(line: &str) -> Option<(Option<f32>, Option<u64>)> {
    let rest = line.strip_prefix("[download]")?;
    let percent = rest
        .split_whitespace()
        .find_map(|tok| tok.strip_suffix('%'))
        .and_then(|n| n.parse::<f32>().ok());
    percent?;
    let eta_secs = rest
        .split_whitespace()
        .skip_while(|tok| *tok != "ETA")
        .nth(1)
        .and_then(parse_clock);
    Some((percent, eta_secs))
}

/// `mm:ss` or `hh:mm:ss` to seconds.
fn parse_clock(s: &str) -> Option<u64> {
    let mut total: u64 = 0;
    for part in s.split(':') {
        total = total * 60 + part.parse::<u64>().ok()?;
    }
    Some(total)
}

/// Last line starting with `ERROR` from tool stderr, or the last non-empty
/// line as a fallback.
fn last_error_line(stderr: &str) -> Option<String> {
    let mut fallback = None;
    let mut error = None;
    for line in stderr.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        fallback = Some(line);
        if line.starts_with("ERROR") {
            error = Some(line);
        }
    }
    error.or(fallback).map(|s| s.to_string())
}
