//! The facade binding store, queue, retry policy and fetcher together.
//!
//! Callers submit URLs and observe jobs; failures never cross this boundary
//! as errors, only as job state. Workers run one per admitted job, capped by
//! the queue's concurrency limit; the only cross-component calls made under
//! a lock are the store's own snapshot writes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::fetch::{AbortToken, EventSink, FetchEvent, FetchOptions, FetchOutcome, Fetcher};
use crate::job::{Job, JobId, JobStatus};
use crate::queue::{Admission, DownloadQueue};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::store::{JobStore, UpdateOutcome};

/// Facade over the download engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<JobStore>,
    queue: DownloadQueue,
    policy: RetryPolicy,
    fetcher: Arc<dyn Fetcher>,
    options: FetchOptions,
    /// Signalled whenever the queue drains; `wait_idle` parks on this.
    idle: Notify,
}

impl Orchestrator {
    pub fn new(
        store: Arc<JobStore>,
        fetcher: Arc<dyn Fetcher>,
        policy: RetryPolicy,
        options: FetchOptions,
        max_concurrent: usize,
    ) -> Self {
        Orchestrator {
            inner: Arc::new(Inner {
                store,
                queue: DownloadQueue::new(max_concurrent),
                policy,
                fetcher,
                options,
                idle: Notify::new(),
            }),
        }
    }

    pub fn store(&self) -> Arc<JobStore> {
        Arc::clone(&self.inner.store)
    }

    /// Create a job for the URL and schedule it. The returned snapshot is the
    /// job as stored: `queued`, at position 0 of the display order.
    pub fn submit(&self, url: &str) -> Job {
        let job = Job::new(JobId::generate(), url.trim());
        tracing::info!(id = %job.id, url = %job.source_url, "job submitted");
        self.inner.store.put(job.clone());
        self.inner.queue.enqueue(job.id.clone());
        pump(&self.inner);
        job
    }

    /// Re-enqueue persisted `queued` jobs, oldest first so a restart keeps
    /// the original submission order. Call once at startup.
    pub fn resume_pending(&self) {
        let pending = self.inner.store.jobs_with_status(JobStatus::Queued);
        for job in pending.into_iter().rev() {
            self.inner.queue.enqueue(job.id);
        }
        pump(&self.inner);
    }

    /// Merge an in-flight event into the job. Progress ticks only ever touch
    /// `info`; they never change status, and ticks for jobs no longer running
    /// (stopped, removed) are dropped.
    pub fn mark_progress(&self, id: &JobId, event: FetchEvent) {
        self.inner.apply_progress(id, event);
    }

    /// Apply a terminal outcome. Idempotent: for a job already in a terminal
    /// state the call is discarded, which also covers outcomes arriving late
    /// after a cancel.
    pub fn mark_terminal(&self, id: &JobId, outcome: FetchOutcome) {
        self.inner.apply_terminal(id, outcome);
    }

    /// Cancel one job: drop it from the backlog or signal its fetch, and mark
    /// it `stopped` right away (optimistic; any later outcome is discarded).
    pub fn cancel(&self, id: &JobId) {
        let outcome = self.inner.queue.cancel(id);
        tracing::info!(%id, ?outcome, "cancel requested");
        self.inner.mark_stopped(id);
        pump(&self.inner);
    }

    /// Cancel everything: drain the backlog and signal every in-flight fetch.
    pub fn cancel_all(&self) {
        let (dequeued, signalled) = self.inner.queue.cancel_all();
        tracing::info!(
            dequeued = dequeued.len(),
            signalled = signalled.len(),
            "cancelling all jobs"
        );
        for id in dequeued.iter().chain(signalled.iter()) {
            self.inner.mark_stopped(id);
        }
        pump(&self.inner);
    }

    /// Delete a job. Cancels any in-flight fetch first so no orphan download
    /// keeps running for a record that no longer exists.
    pub fn remove(&self, id: &JobId) -> bool {
        self.inner.queue.cancel(id);
        let removed = self.inner.store.remove(id);
        pump(&self.inner);
        removed
    }

    /// Cancel everything and empty the store.
    pub fn clear(&self) {
        self.inner.queue.cancel_all();
        self.inner.store.clear();
        pump(&self.inner);
    }

    /// Change the concurrency limit. A raise admits waiting jobs right away;
    /// a reduction applies as slots free up.
    pub fn set_max_concurrent(&self, max_concurrent: usize) {
        self.inner.queue.set_max_concurrent(max_concurrent);
        pump(&self.inner);
    }

    pub fn is_idle(&self) -> bool {
        self.inner.queue.is_idle()
    }

    /// Wait until no job is active or backlogged. Jobs submitted while
    /// waiting extend the wait.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

/// Admit and dispatch whatever fits under the concurrency limit. Safe to
/// call from anywhere; admission itself is a single critical section in
/// the queue.
fn pump(inner: &Arc<Inner>) {
    loop {
        let admissions = inner.queue.try_admit();
        if admissions.is_empty() {
            break;
        }
        let mut reclaimed_slot = false;
        for admission in admissions {
            if inner.arm_dispatch_guard(&admission.id) {
                tokio::spawn(run_job(Arc::clone(inner), admission));
            } else {
                inner.queue.settle(&admission.id);
                reclaimed_slot = true;
            }
        }
        if !reclaimed_slot {
            break;
        }
    }
    if inner.queue.is_idle() {
        inner.idle.notify_waiters();
    }
}

impl Inner {
    /// Flip `download_triggered` under the store lock. Exactly one caller
    /// wins even when submit/resume race; a job already dispatched, finished
    /// or stopped is not dispatched again.
    fn arm_dispatch_guard(&self, id: &JobId) -> bool {
        let outcome = self.store.update(id, |job| {
            if job.download_triggered || job.status.is_terminal() {
                None
            } else {
                Some(job.with_download_triggered())
            }
        });
        match outcome {
            UpdateOutcome::Updated(_) => true,
            UpdateOutcome::Unchanged => {
                tracing::debug!(%id, "dispatch suppressed by trigger guard");
                false
            }
            UpdateOutcome::NotFound => false,
        }
    }

    fn apply_progress(&self, id: &JobId, event: FetchEvent) {
        match event {
            FetchEvent::Progress {
                percent,
                eta_secs,
                message,
            } => {
                let info = render_progress(percent, eta_secs, &message);
                self.store.update(id, |job| match job.status {
                    JobStatus::Running | JobStatus::FinishedRemote => Some(job.with_info(info)),
                    _ => None,
                });
            }
            FetchEvent::SourceComplete => {
                self.store.update(id, |job| match job.status {
                    JobStatus::Running => Some(
                        job.with_status(JobStatus::FinishedRemote)
                            .with_info("finished at source, transferring"),
                    ),
                    _ => None,
                });
            }
        }
    }

    fn apply_terminal(&self, id: &JobId, outcome: FetchOutcome) {
        let result = self.store.update(id, |job| {
            if job.status.is_terminal() {
                return None;
            }
            Some(match &outcome {
                FetchOutcome::Success {
                    files,
                    saved_locator,
                } => job.with_completed(files.clone(), saved_locator.clone()),
                FetchOutcome::Failure { category, message } => job
                    .with_status(JobStatus::Error)
                    .with_info(format!("{}: {message}", category.describe())),
            })
        });
        match result {
            UpdateOutcome::Updated(job) => {
                tracing::info!(id = %job.id, status = %job.status, "job reached terminal state");
            }
            UpdateOutcome::Unchanged => {
                tracing::debug!(%id, "terminal outcome discarded, job already settled");
            }
            UpdateOutcome::NotFound => {
                tracing::debug!(%id, "terminal outcome for removed job discarded");
            }
        }
    }

    fn mark_stopped(&self, id: &JobId) {
        self.store.update(id, |job| {
            if job.status.is_terminal() {
                None
            } else {
                Some(job.with_status(JobStatus::Stopped).with_info("stopped by user"))
            }
        });
    }

    /// Non-terminal update, skipped once the job has settled (e.g. stopped
    /// while the worker was between phases).
    fn update_active(&self, id: &JobId, f: impl FnOnce(&Job) -> Job) {
        self.store.update(id, |job| {
            if job.status.is_terminal() {
                None
            } else {
                Some(f(job))
            }
        });
    }
}

/// One worker: drive the job to a terminal state, then free the slot and
/// re-admit from the backlog. `settle → pump` here is the sole re-entry point
/// that drains the queue.
async fn run_job(inner: Arc<Inner>, admission: Admission) {
    let Admission { id, abort } = admission;
    drive_job(&inner, &id, &abort).await;
    inner.queue.settle(&id);
    pump(&inner);
}

async fn drive_job(inner: &Arc<Inner>, id: &JobId, abort: &AbortToken) {
    let Some(job) = inner.store.get(id) else {
        // Removed between admission and dispatch.
        return;
    };
    let url = job.source_url.clone();

    // Title extraction always settles before the job transitions to running.
    // A failed probe is logged and the download proceeds untitled.
    if job.title.is_none() {
        inner.update_active(id, |j| {
            j.with_status(JobStatus::FetchingInfo)
                .with_info("fetching media info")
        });
        match inner.fetcher.probe_title(&url, &inner.options).await {
            Ok(Some(title)) => {
                tracing::debug!(%id, %title, "title extracted");
                inner.update_active(id, |j| j.with_title(title));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%id, error = %e, "title probe failed, continuing"),
        }
    }
    if abort.is_aborted() {
        return;
    }

    inner.update_active(id, |j| {
        j.with_status(JobStatus::Running).with_info("starting download")
    });

    let mut attempt: u32 = 1;
    loop {
        let events: EventSink = {
            let inner = Arc::clone(inner);
            let id = id.clone();
            Arc::new(move |event| inner.apply_progress(&id, event))
        };
        let outcome = inner
            .fetcher
            .fetch(&url, &inner.options, events, abort.clone())
            .await;

        match outcome {
            FetchOutcome::Success { .. } => {
                inner.apply_terminal(id, outcome);
                return;
            }
            FetchOutcome::Failure { category, message } => {
                if abort.is_aborted() {
                    tracing::debug!(%id, "fetch aborted, outcome discarded");
                    return;
                }
                match inner.policy.decide(attempt, category) {
                    RetryDecision::Retry { delay } => {
                        tracing::info!(%id, attempt, ?delay, %category, "attempt failed, retrying");
                        let info = format!(
                            "attempt {attempt}/{} failed ({}), retrying in {}s",
                            inner.policy.max_attempts,
                            category.describe(),
                            delay.as_secs()
                        );
                        inner.update_active(id, |j| j.with_info(info));
                        sleep_unless_aborted(delay, abort).await;
                        if abort.is_aborted() {
                            return;
                        }
                        attempt += 1;
                    }
                    RetryDecision::Fail(category) => {
                        inner.apply_terminal(
                            id,
                            FetchOutcome::Failure { category, message },
                        );
                        return;
                    }
                }
            }
        }
    }
}

/// Backoff sleep that wakes early when the abort flag flips.
async fn sleep_unless_aborted(delay: Duration, abort: &AbortToken) {
    let step = Duration::from_millis(100);
    let mut remaining = delay;
    while !abort.is_aborted() && remaining > Duration::ZERO {
        let chunk = step.min(remaining);
        tokio::time::sleep(chunk).await;
        remaining = remaining.saturating_sub(chunk);
    }
}

fn render_progress(percent: Option<f32>, eta_secs: Option<u64>, message: &str) -> String {
    match (percent, eta_secs) {
        (Some(p), Some(eta)) => format!("downloading: {p:.0}% (eta {eta}s)"),
        (Some(p), None) => format!("downloading: {p:.0}%"),
        _ => message.to_string(),
    }
}
