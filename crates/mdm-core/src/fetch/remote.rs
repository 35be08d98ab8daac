//! Fetcher backed by a remote download server.
//!
//! Wire protocol: `POST /download {url}` returns `{job_id}`; `GET
//! /status/{job_id}` is polled on a fixed interval until a terminal status;
//! `GET /file/{job_id}` then streams the artifact. Polling for an id stops
//! exactly once, on the first terminal status observed.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::retry::{classify, ErrorCategory};

use super::{AbortToken, EventSink, FetchEvent, FetchFailure, FetchOptions, FetchOutcome, Fetcher};

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    progress: Option<ProgressBody>,
}

#[derive(Debug, Deserialize)]
struct ProgressBody {
    #[serde(default)]
    downloaded: Option<u64>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    speed: Option<f64>,
}

impl ProgressBody {
    fn percent(&self) -> Option<f32> {
        match (self.downloaded, self.total) {
            (Some(done), Some(total)) if total > 0 => {
                Some((done as f64 / total as f64 * 100.0) as f32)
            }
            _ => None,
        }
    }

    fn eta_secs(&self) -> Option<u64> {
        let (done, total, speed) = (self.downloaded?, self.total?, self.speed?);
        if speed <= 0.0 {
            return None;
        }
        Some((total.saturating_sub(done) as f64 / speed) as u64)
    }
}

/// Server-backed fetch backend.
pub struct RemoteFetcher {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl RemoteFetcher {
    /// `base_url` is the server root, e.g. `http://host:5000`.
    pub fn new(base_url: impl Into<String>, poll_interval: Duration) -> Self {
        RemoteFetcher {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval,
        }
    }

    /// Abort-aware sleep: wakes early when the token flips so cancellation
    /// latency stays well under the poll interval.
    async fn pause(&self, abort: &AbortToken) {
        let step = Duration::from_millis(100).min(self.poll_interval);
        let mut remaining = self.poll_interval;
        while !abort.is_aborted() && remaining > Duration::ZERO {
            let chunk = step.min(remaining);
            tokio::time::sleep(chunk).await;
            remaining = remaining.saturating_sub(chunk);
        }
    }

    /// Poll until the server reports a terminal status; returns the file list
    /// from the terminal response.
    async fn poll_until_done(
        &self,
        job_id: &str,
        events: &EventSink,
        abort: &AbortToken,
    ) -> Result<Vec<String>, FetchOutcome> {
        let status_url = format!("{}/status/{}", self.base_url, job_id);
        loop {
            if abort.is_aborted() {
                return Err(FetchOutcome::failure(ErrorCategory::Unknown, "fetch aborted"));
            }

            let response = match self.client.get(&status_url).send().await {
                Ok(r) => r,
                Err(e) => {
                    return Err(FetchOutcome::failure(
                        ErrorCategory::Network,
                        format!("status poll failed: {e}"),
                    ))
                }
            };
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(FetchOutcome::failure(
                    ErrorCategory::NotFound,
                    "server does not know this job",
                ));
            }
            let status: StatusResponse = match response.json().await {
                Ok(s) => s,
                Err(e) => {
                    return Err(FetchOutcome::failure(
                        ErrorCategory::Network,
                        format!("bad status payload: {e}"),
                    ))
                }
            };

            match status.status.as_str() {
                "finished" => return Ok(status.files),
                "error" => {
                    let message = status
                        .error
                        .unwrap_or_else(|| "server reported an error".to_string());
                    return Err(FetchOutcome::Failure {
                        category: classify(&message),
                        message,
                    });
                }
                "queued" => events(FetchEvent::Progress {
                    percent: None,
                    eta_secs: None,
                    message: "queued on server".to_string(),
                }),
                other => {
                    let (percent, eta_secs) = status
                        .progress
                        .as_ref()
                        .map(|p| (p.percent(), p.eta_secs()))
                        .unwrap_or((None, None));
                    let message = match percent {
                        Some(p) => format!("downloading on server: {p:.0}%"),
                        None => format!("server status: {other}"),
                    };
                    events(FetchEvent::Progress {
                        percent,
                        eta_secs,
                        message,
                    });
                }
            }

            self.pause(abort).await;
        }
    }

    /// Stream `GET /file/{id}` into the download directory.
    async fn transfer_artifact(
        &self,
        job_id: &str,
        remote_files: &[String],
        options: &FetchOptions,
    ) -> Result<PathBuf, FetchOutcome> {
        let file_url = format!("{}/file/{}", self.base_url, job_id);
        let response = match self.client.get(&file_url).send().await {
            Ok(r) => r,
            Err(e) => {
                return Err(FetchOutcome::failure(
                    ErrorCategory::Network,
                    format!("artifact transfer failed: {e}"),
                ))
            }
        };
        if !response.status().is_success() {
            let category = if response.status() == reqwest::StatusCode::NOT_FOUND {
                ErrorCategory::NotFound
            } else {
                ErrorCategory::Network
            };
            return Err(FetchOutcome::failure(
                category,
                format!("artifact request returned {}", response.status()),
            ));
        }

        let filename = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(content_disposition_filename)
            .or_else(|| remote_files.first().cloned())
            .unwrap_or_else(|| format!("{job_id}.bin"));
        let path = options.download_dir.join(filename);

        if let Err(e) = tokio::fs::create_dir_all(&options.download_dir).await {
            return Err(FetchOutcome::failure(
                ErrorCategory::Storage,
                format!("cannot create download directory: {e}"),
            ));
        }
        let mut file = match tokio::fs::File::create(&path).await {
            Ok(f) => f,
            Err(e) => {
                return Err(FetchOutcome::failure(
                    ErrorCategory::Storage,
                    format!("cannot create {}: {e}", path.display()),
                ))
            }
        };

        let mut response = response;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = file.write_all(&chunk).await {
                        return Err(FetchOutcome::failure(
                            ErrorCategory::Storage,
                            format!("cannot write {}: {e}", path.display()),
                        ));
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    return Err(FetchOutcome::failure(
                        ErrorCategory::Network,
                        format!("artifact stream interrupted: {e}"),
                    ))
                }
            }
        }
        if let Err(e) = file.flush().await {
            return Err(FetchOutcome::failure(
                ErrorCategory::Storage,
                format!("cannot flush {}: {e}", path.display()),
            ));
        }
        Ok(path)
    }
}

#[async_trait]
impl Fetcher for RemoteFetcher {
    /// The server has no metadata endpoint; titles stay unset.
    async fn probe_title(
        &self,
        _url: &str,
        _options: &FetchOptions,
    ) -> Result<Option<String>, FetchFailure> {
        Ok(None)
    }

    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        events: EventSink,
        abort: AbortToken,
    ) -> FetchOutcome {
        let submit_url = format!("{}/download", self.base_url);
        let response = match self
            .client
            .post(&submit_url)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return FetchOutcome::failure(
                    ErrorCategory::Network,
                    format!("cannot reach download server: {e}"),
                )
            }
        };
        if !response.status().is_success() {
            let category = if response.status().is_client_error() {
                ErrorCategory::Configuration
            } else {
                ErrorCategory::Network
            };
            return FetchOutcome::failure(
                category,
                format!("submit returned {}", response.status()),
            );
        }
        let submit: SubmitResponse = match response.json().await {
            Ok(s) => s,
            Err(e) => {
                return FetchOutcome::failure(
                    ErrorCategory::Network,
                    format!("bad submit payload: {e}"),
                )
            }
        };
        tracing::debug!(remote_id = %submit.job_id, "job submitted to server");

        let remote_files = match self.poll_until_done(&submit.job_id, &events, &abort).await {
            Ok(files) => files,
            Err(outcome) => return outcome,
        };

        // Source side is done; the artifact still has to reach local storage.
        events(FetchEvent::SourceComplete);

        let path = match self
            .transfer_artifact(&submit.job_id, &remote_files, options)
            .await
        {
            Ok(path) => path,
            Err(outcome) => return outcome,
        };

        let files = if remote_files.is_empty() {
            path.file_name()
                .map(|n| vec![n.to_string_lossy().into_owned()])
                .unwrap_or_default()
        } else {
            remote_files
        };
        FetchOutcome::Success {
            files,
            saved_locator: path.to_string_lossy().into_owned(),
        }
    }
}

/// Filename from a `Content-Disposition` header value. Handles the common
/// `filename="x"` and bare `filename=x` forms.
fn content_disposition_filename(value: &str) -> Option<String> {
    let lower = value.to_lowercase();
    let idx = lower.find("filename=")?;
    let raw = value[idx + "filename=".len()..]
        .split(';')
        .next()?
        .trim()
        .trim_matches('"');
    if raw.is_empty() {
        return None;
    }
    // Strip any path the server may have leaked in.
    let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    Some(name.to_string())
}
