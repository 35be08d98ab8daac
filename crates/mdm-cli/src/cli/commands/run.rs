//! `mdm run` – process queued jobs until the queue drains.

use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use mdm_core::config::MdmConfig;
use mdm_core::fetch::{Fetcher, RemoteFetcher, YtDlpFetcher};
use mdm_core::job::{Job, JobId, JobStatus};
use mdm_core::notify::JobChangeListener;
use mdm_core::orchestrator::Orchestrator;
use mdm_core::store::JobStore;

/// Prints one line per status transition; progress ticks go to the log only.
#[derive(Default)]
struct StatusPrinter {
    seen: Mutex<HashMap<JobId, JobStatus>>,
}

impl JobChangeListener for StatusPrinter {
    fn on_added(&self, _job: &Job, _position: usize) {}

    fn on_updated(&self, job: &Job, _position: usize) {
        let changed = self
            .seen
            .lock()
            .unwrap()
            .insert(job.id.clone(), job.status)
            != Some(job.status);
        if !changed {
            tracing::debug!(id = %job.id, info = ?job.info, "progress");
            return;
        }
        let label = job.title.as_deref().unwrap_or(job.source_url.as_str());
        match &job.info {
            Some(info) => println!("[{}] {} - {}", job.status, label, info),
            None => println!("[{}] {}", job.status, label),
        }
    }

    fn on_removed(&self, _id: &JobId, _position: usize) {}

    fn on_cleared(&self) {}
}

pub async fn run_downloads(
    store: Arc<JobStore>,
    cfg: &MdmConfig,
    jobs: Option<usize>,
    download_dir: Option<PathBuf>,
) -> Result<()> {
    let pending = store.jobs_with_status(JobStatus::Queued).len();
    if pending == 0 {
        println!("no queued jobs.");
        return Ok(());
    }

    let mut options = cfg.fetch_options(std::env::current_dir()?);
    if let Some(dir) = download_dir {
        options.download_dir = dir;
    }

    let fetcher: Arc<dyn Fetcher> = match &cfg.server_url {
        Some(server) => Arc::new(RemoteFetcher::new(
            server.clone(),
            cfg.status_poll_interval(),
        )),
        None => Arc::new(YtDlpFetcher::new()),
    };

    let max_concurrent = jobs.unwrap_or(cfg.max_concurrent_downloads);
    let orchestrator = Orchestrator::new(
        store.clone(),
        fetcher,
        cfg.retry_policy(),
        options,
        max_concurrent,
    );
    store.add_listener(Arc::new(StatusPrinter::default()));

    println!("running {pending} queued job(s), up to {max_concurrent} at a time");
    orchestrator.resume_pending();
    orchestrator.wait_idle().await;

    let all = store.all();
    let downloaded = all
        .iter()
        .filter(|j| j.status == JobStatus::Downloaded)
        .count();
    let failed = all.iter().filter(|j| j.status == JobStatus::Error).count();
    println!("done: {downloaded} downloaded, {failed} failed");
    Ok(())
}
