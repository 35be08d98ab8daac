//! `mdm add <url>` – queue a new download job.

use anyhow::Result;
use mdm_core::job::{Job, JobId};
use mdm_core::store::JobStore;
use std::sync::Arc;

pub fn run_add(store: &Arc<JobStore>, url: &str) -> Result<()> {
    let job = Job::new(JobId::generate(), url.trim());
    store.put(job.clone());
    println!("added {} for {}", job.id, job.source_url);
    println!("run `mdm run` to start downloading");
    Ok(())
}
