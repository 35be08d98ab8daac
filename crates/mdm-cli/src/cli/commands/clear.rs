//! `mdm clear` – delete all jobs.

use anyhow::Result;
use mdm_core::store::JobStore;
use std::sync::Arc;

pub fn run_clear(store: &Arc<JobStore>) -> Result<()> {
    let count = store.len();
    store.clear();
    println!("removed {count} job(s)");
    Ok(())
}
