//! `mdm status` – show jobs, optionally filtered.

use anyhow::Result;
use mdm_core::filter::JobFilter;
use mdm_core::store::JobStore;
use std::sync::Arc;

pub fn run_status(
    store: &Arc<JobStore>,
    query: Option<String>,
    extensions: Vec<String>,
    domains: Vec<String>,
) -> Result<()> {
    let filter = JobFilter {
        query,
        extensions: (!extensions.is_empty()).then_some(extensions),
        domains: (!domains.is_empty()).then_some(domains),
    };
    let jobs = store.filter(&filter);
    if jobs.is_empty() {
        println!("no jobs.");
        return Ok(());
    }

    println!("{:<28} {:<16} {}", "ID", "STATUS", "TITLE / URL");
    for job in jobs {
        let label = job.title.as_deref().unwrap_or(job.source_url.as_str());
        match &job.info {
            Some(info) => println!(
                "{:<28} {:<16} {} ({info})",
                job.id.as_str(),
                job.status.as_str(),
                label
            ),
            None => println!(
                "{:<28} {:<16} {}",
                job.id.as_str(),
                job.status.as_str(),
                label
            ),
        }
    }
    Ok(())
}
