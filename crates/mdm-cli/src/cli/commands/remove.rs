//! `mdm remove <id>` – delete one job.

use anyhow::{bail, Result};
use mdm_core::job::JobId;
use mdm_core::store::JobStore;
use std::sync::Arc;

pub fn run_remove(store: &Arc<JobStore>, id: &str) -> Result<()> {
    let id = JobId::from(id);
    if !store.remove(&id) {
        bail!("no job with id {id}");
    }
    println!("removed {id}");
    Ok(())
}
