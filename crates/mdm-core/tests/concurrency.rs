//! The concurrency bound holds for arbitrary interleavings of submissions
//! and completions.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::fetchers::CountingFetcher;
use mdm_core::fetch::FetchOptions;
use mdm_core::job::JobStatus;
use mdm_core::orchestrator::Orchestrator;
use mdm_core::persist::MemorySnapshotStore;
use mdm_core::retry::RetryPolicy;
use mdm_core::store::JobStore;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn running_jobs_never_exceed_the_limit() {
    const LIMIT: usize = 3;
    const JOBS: usize = 24;

    let fetcher = CountingFetcher::new(Duration::from_millis(10));
    let store = Arc::new(JobStore::open(Box::new(MemorySnapshotStore::new())).unwrap());
    let orch = Orchestrator::new(
        store.clone(),
        fetcher.clone(),
        RetryPolicy::default(),
        FetchOptions::new("/downloads"),
        LIMIT,
    );

    // Submit from several tasks at once so admissions race with completions.
    let mut submitters = Vec::new();
    for n in 0..JOBS {
        let orch = orch.clone();
        submitters.push(tokio::spawn(async move {
            // Stagger some submissions into the middle of the run.
            if n % 3 == 0 {
                tokio::time::sleep(Duration::from_millis((n % 7) as u64)).await;
            }
            orch.submit(&format!("https://example.com/v/{n}"));
        }));
    }
    for s in submitters {
        s.await.unwrap();
    }
    orch.wait_idle().await;

    assert_eq!(fetcher.completed() as usize, JOBS, "every job ran");
    assert!(
        fetcher.peak_concurrency() <= LIMIT,
        "peak concurrency {} exceeded limit {}",
        fetcher.peak_concurrency(),
        LIMIT
    );
    assert_eq!(store.len(), JOBS);
    assert!(store
        .all()
        .iter()
        .all(|j| j.status == JobStatus::Downloaded));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn limit_of_one_serializes_everything() {
    let fetcher = CountingFetcher::new(Duration::from_millis(5));
    let store = Arc::new(JobStore::open(Box::new(MemorySnapshotStore::new())).unwrap());
    let orch = Orchestrator::new(
        store,
        fetcher.clone(),
        RetryPolicy::default(),
        FetchOptions::new("/downloads"),
        1,
    );

    for n in 0..8 {
        orch.submit(&format!("https://example.com/v/{n}"));
    }
    orch.wait_idle().await;

    assert_eq!(fetcher.completed(), 8);
    assert_eq!(fetcher.peak_concurrency(), 1);
}
