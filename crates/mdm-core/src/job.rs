//! Job model: stable ids, the status state machine, and immutable job snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Opaque, stable job identifier. Assigned once at creation and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh id: `job_<unix-millis>_<uuid prefix>`.
    ///
    /// The millis prefix keeps ids roughly sortable in logs; uniqueness comes
    /// from the uuid suffix.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let suffix = Uuid::new_v4().simple().to_string();
        JobId(format!("job_{}_{}", millis, &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        JobId(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// Lifecycle state of a job.
///
/// `queued → fetching-info (optional) → running → {finished-remote |
/// downloaded | error | stopped}`. Progress ticks never change the status;
/// `finished-remote` is emitted only by the server-backed fetcher while the
/// artifact is still in transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Queued,
    FetchingInfo,
    Running,
    FinishedRemote,
    Downloaded,
    Error,
    Stopped,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::FetchingInfo => "fetching-info",
            JobStatus::Running => "running",
            JobStatus::FinishedRemote => "finished-remote",
            JobStatus::Downloaded => "downloaded",
            JobStatus::Error => "error",
            JobStatus::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "fetching-info" => Some(JobStatus::FetchingInfo),
            "running" => Some(JobStatus::Running),
            "finished-remote" => Some(JobStatus::FinishedRemote),
            "downloaded" => Some(JobStatus::Downloaded),
            "error" => Some(JobStatus::Error),
            "stopped" => Some(JobStatus::Stopped),
            _ => None,
        }
    }

    /// True for states from which no further automatic transition occurs.
    ///
    /// `finished-remote` is not terminal: the fetcher still owes a terminal
    /// outcome once the artifact transfer ends.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Downloaded | JobStatus::Error | JobStatus::Stopped
        )
    }

    pub fn is_success(self) -> bool {
        matches!(self, JobStatus::Downloaded)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user-requested download and its tracked lifecycle state.
///
/// Jobs are immutable snapshots: every mutation goes through the `with_*`
/// helpers and replaces the whole record in the store (copy-on-write), so no
/// field is ever observed mid-update from another thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub source_url: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result_files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub local_locator: Option<String>,
    #[serde(default)]
    pub download_triggered: bool,
}

impl Job {
    /// New job in the initial `queued` state.
    pub fn new(id: JobId, source_url: impl Into<String>) -> Self {
        Job {
            id,
            source_url: source_url.into(),
            status: JobStatus::Queued,
            title: None,
            info: None,
            result_files: None,
            local_locator: None,
            download_triggered: false,
        }
    }

    pub fn with_status(&self, status: JobStatus) -> Job {
        Job {
            status,
            ..self.clone()
        }
    }

    pub fn with_info(&self, info: impl Into<String>) -> Job {
        Job {
            info: Some(info.into()),
            ..self.clone()
        }
    }

    pub fn with_title(&self, title: impl Into<String>) -> Job {
        Job {
            title: Some(title.into()),
            ..self.clone()
        }
    }

    pub fn with_download_triggered(&self) -> Job {
        Job {
            download_triggered: true,
            ..self.clone()
        }
    }

    /// Successful terminal snapshot: `downloaded`, with the produced files and
    /// the locator of the saved artifact.
    pub fn with_completed(&self, files: Vec<String>, locator: impl Into<String>) -> Job {
        let locator = locator.into();
        Job {
            status: JobStatus::Downloaded,
            info: Some(format!("saved to {locator}")),
            result_files: Some(files),
            local_locator: Some(locator),
            ..self.clone()
        }
    }

    /// True when the persisted snapshot should skip this job: a bare transient
    /// `running` entry would resurrect as a "downloading" ghost after a crash.
    pub(crate) fn is_transient_ghost(&self) -> bool {
        self.status == JobStatus::Running && self.info.as_deref().unwrap_or("").is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("job_"));
    }

    #[test]
    fn status_string_roundtrip() {
        for s in [
            JobStatus::Queued,
            JobStatus::FetchingInfo,
            JobStatus::Running,
            JobStatus::FinishedRemote,
            JobStatus::Downloaded,
            JobStatus::Error,
            JobStatus::Stopped,
        ] {
            assert_eq!(JobStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(JobStatus::parse("paused"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Downloaded.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Stopped.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::FinishedRemote.is_terminal());
    }

    #[test]
    fn copy_on_write_preserves_identity() {
        let job = Job::new(JobId::from("job_1"), "https://example.com/v");
        let updated = job.with_status(JobStatus::Running).with_info("downloading");
        assert_eq!(updated.id, job.id);
        assert_eq!(updated.source_url, job.source_url);
        assert_eq!(job.status, JobStatus::Queued, "original snapshot untouched");
        assert_eq!(updated.status, JobStatus::Running);
    }

    #[test]
    fn completed_sets_result_fields() {
        let job = Job::new(JobId::from("job_2"), "https://example.com/v");
        let done = job.with_completed(vec!["a.mp4".into()], "/downloads/a.mp4");
        assert_eq!(done.status, JobStatus::Downloaded);
        assert_eq!(done.result_files.as_deref(), Some(&["a.mp4".to_string()][..]));
        assert_eq!(done.local_locator.as_deref(), Some("/downloads/a.mp4"));
    }

    #[test]
    fn transient_ghost_is_running_without_info() {
        let job = Job::new(JobId::from("job_3"), "u");
        assert!(job.with_status(JobStatus::Running).is_transient_ghost());
        assert!(!job
            .with_status(JobStatus::Running)
            .with_info("downloading: 10%")
            .is_transient_ghost());
        assert!(!job.is_transient_ghost());
    }
}
