//! The fetch capability boundary.
//!
//! The core only needs "fetch(url, options) → stream of progress events,
//! terminal success/failure"; whether that is a local `yt-dlp` subprocess or
//! a remote job server is a fetcher implementation detail. Filename and
//! locator assignment belong to the fetcher, not the core.

mod remote;
mod ytdlp;

pub use remote::RemoteFetcher;
pub use ytdlp::YtDlpFetcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::retry::ErrorCategory;

/// Cooperative cancellation signal handed to each dispatched fetch.
///
/// Cancellation is cooperative: the fetcher is expected to notice the flag
/// and stop within a bounded time. Late outcomes from an aborted fetch are
/// discarded by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct AbortToken(Arc<AtomicBool>);

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Output container selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Audio-only download.
    Audio,
    /// Video constrained by the configured quality ceiling.
    Video,
    /// Whatever the source serves best.
    #[default]
    Best,
}

/// Resolution ceiling for constrained video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "480p")]
    Q480,
    #[serde(rename = "720p")]
    Q720,
    #[serde(rename = "1080p")]
    Q1080,
    #[serde(rename = "best")]
    #[default]
    Best,
}

impl Quality {
    /// Height ceiling in pixels; `None` means unconstrained.
    pub fn height_limit(self) -> Option<u32> {
        match self {
            Quality::Q480 => Some(480),
            Quality::Q720 => Some(720),
            Quality::Q1080 => Some(1080),
            Quality::Best => None,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Q480 => f.write_str("480p"),
            Quality::Q720 => f.write_str("720p"),
            Quality::Q1080 => f.write_str("1080p"),
            Quality::Best => f.write_str("best"),
        }
    }
}

/// Per-fetch options, resolved from configuration by the orchestrator.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub format: Format,
    pub quality: Quality,
    pub allow_playlists: bool,
    /// Directory the artifact should end up in.
    pub download_dir: PathBuf,
}

impl FetchOptions {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        FetchOptions {
            format: Format::default(),
            quality: Quality::default(),
            allow_playlists: false,
            download_dir: download_dir.into(),
        }
    }
}

/// Non-terminal event emitted while a fetch is in flight.
#[derive(Debug, Clone)]
pub enum FetchEvent {
    /// A progress tick. Never changes job status.
    Progress {
        percent: Option<f32>,
        eta_secs: Option<u64>,
        message: String,
    },
    /// The source side finished but the artifact is still being transferred
    /// to local storage. Emitted only by the server-backed fetcher.
    SourceComplete,
}

/// Terminal outcome of one fetch attempt.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success {
        /// Output filenames, as reported by the fetch tool.
        files: Vec<String>,
        /// Locator of the saved artifact (path or URI).
        saved_locator: String,
    },
    Failure {
        category: ErrorCategory,
        message: String,
    },
}

impl FetchOutcome {
    pub fn failure(category: ErrorCategory, message: impl Into<String>) -> Self {
        FetchOutcome::Failure {
            category,
            message: message.into(),
        }
    }
}

/// Error from a metadata probe. Probe failures are non-fatal to the job.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct FetchFailure {
    pub category: ErrorCategory,
    pub message: String,
}

/// Fire-and-forget sink for in-flight events. Must not block the fetch.
pub type EventSink = Arc<dyn Fn(FetchEvent) + Send + Sync>;

/// External capability that performs one job's actual media retrieval.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Best-effort title extraction before the download starts. `Ok(None)`
    /// when the backend cannot provide one.
    async fn probe_title(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<Option<String>, FetchFailure>;

    /// Run one download attempt to its terminal outcome, emitting progress
    /// through `events` and honoring `abort`.
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        events: EventSink,
        abort: AbortToken,
    ) -> FetchOutcome;
}
