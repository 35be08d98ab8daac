//! Keyed, order-preserving job store with write-through persistence.
//!
//! One `RwLock` serializes all mutations; reads run concurrently with each
//! other but never with a write in progress. Every mutating operation saves
//! the full snapshot before listeners are told, so a crash immediately after
//! any call recovers the same state on reload.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::filter::JobFilter;
use crate::job::{Job, JobId, JobStatus};
use crate::notify::{ChangeEvent, ChangeNotifier, JobChangeListener};
use crate::persist::{SnapshotError, SnapshotStore};

/// Result of [`JobStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Updated,
}

/// Result of [`JobStore::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The closure produced a new snapshot; it was stored, persisted and
    /// broadcast.
    Updated(Job),
    /// The closure declined (returned `None`): nothing persisted, nothing
    /// notified.
    Unchanged,
    NotFound,
}

struct StoreInner {
    jobs: HashMap<JobId, Job>,
    /// Display order, newest first. Every id here has an entry in `jobs`.
    order: Vec<JobId>,
}

impl StoreInner {
    fn position_of(&self, id: &JobId) -> Option<usize> {
        self.order.iter().position(|j| j == id)
    }

    fn ordered_jobs(&self) -> Vec<Job> {
        self.order
            .iter()
            .filter_map(|id| self.jobs.get(id).cloned())
            .collect()
    }
}

/// Order-preserving collection of job records with atomic CRUD and durable
/// snapshotting.
pub struct JobStore {
    inner: RwLock<StoreInner>,
    snapshots: Box<dyn SnapshotStore>,
    notifier: ChangeNotifier,
}

impl JobStore {
    /// Open the store over a snapshot backend and reload the last snapshot.
    ///
    /// Reload policy: jobs that ended in `error` are dropped silently (never
    /// resurrected); jobs caught in a transient state by a crash are
    /// normalized back to `queued` with the dispatch guard reset, so the next
    /// run can pick them up.
    pub fn open(snapshots: Box<dyn SnapshotStore>) -> Result<Self, SnapshotError> {
        let loaded = snapshots.load_snapshot()?;
        let mut jobs = HashMap::new();
        let mut order = Vec::new();
        for job in loaded.into_iter().filter_map(recover) {
            if jobs.contains_key(&job.id) {
                tracing::warn!(id = %job.id, "duplicate id in snapshot, keeping first");
                continue;
            }
            order.push(job.id.clone());
            jobs.insert(job.id.clone(), job);
        }
        tracing::debug!(count = jobs.len(), "job store loaded");
        Ok(JobStore {
            inner: RwLock::new(StoreInner { jobs, order }),
            snapshots,
            notifier: ChangeNotifier::new(),
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn JobChangeListener>) {
        self.notifier.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn JobChangeListener>) {
        self.notifier.remove_listener(listener);
    }

    /// Insert-or-replace by id. New jobs go to the front of the display
    /// order; replacing keeps the job's position.
    pub fn put(&self, job: Job) -> PutOutcome {
        let (outcome, event) = {
            let mut inner = self.inner.write().unwrap();
            if inner.jobs.contains_key(&job.id) {
                let pos = inner.position_of(&job.id).unwrap_or(0);
                inner.jobs.insert(job.id.clone(), job.clone());
                self.persist(&inner);
                (PutOutcome::Updated, ChangeEvent::Updated(job, pos))
            } else {
                inner.order.insert(0, job.id.clone());
                inner.jobs.insert(job.id.clone(), job.clone());
                self.persist(&inner);
                (PutOutcome::Inserted, ChangeEvent::Added(job, 0))
            }
        };
        self.notifier.notify(&event);
        outcome
    }

    /// Atomic read-modify-write under the store lock.
    ///
    /// The closure sees the current snapshot and returns the replacement, or
    /// `None` to leave the job untouched (used for terminal-state checks and
    /// the dispatch guard, which must be check-and-set in one critical
    /// section).
    pub fn update(&self, id: &JobId, f: impl FnOnce(&Job) -> Option<Job>) -> UpdateOutcome {
        let (outcome, event) = {
            let mut inner = self.inner.write().unwrap();
            let Some(current) = inner.jobs.get(id) else {
                return UpdateOutcome::NotFound;
            };
            let Some(next) = f(current) else {
                return UpdateOutcome::Unchanged;
            };
            debug_assert_eq!(next.id, *id, "update must not change the job id");
            let pos = inner.position_of(id).unwrap_or(0);
            inner.jobs.insert(id.clone(), next.clone());
            self.persist(&inner);
            (
                UpdateOutcome::Updated(next.clone()),
                ChangeEvent::Updated(next, pos),
            )
        };
        self.notifier.notify(&event);
        outcome
    }

    /// Remove by id from both the map and the order list. Returns false if
    /// the id is unknown.
    pub fn remove(&self, id: &JobId) -> bool {
        let event = {
            let mut inner = self.inner.write().unwrap();
            let Some(pos) = inner.position_of(id) else {
                return false;
            };
            inner.order.remove(pos);
            inner.jobs.remove(id);
            self.persist(&inner);
            ChangeEvent::Removed(id.clone(), pos)
        };
        self.notifier.notify(&event);
        true
    }

    pub fn clear(&self) {
        {
            let mut inner = self.inner.write().unwrap();
            inner.jobs.clear();
            inner.order.clear();
            self.persist(&inner);
        }
        self.notifier.notify(&ChangeEvent::Cleared);
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.inner.read().unwrap().jobs.get(id).cloned()
    }

    /// All jobs in display order, newest first.
    pub fn all(&self) -> Vec<Job> {
        self.inner.read().unwrap().ordered_jobs()
    }

    pub fn position(&self, id: &JobId) -> Option<usize> {
        self.inner.read().unwrap().position_of(id)
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.inner.read().unwrap().jobs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn jobs_with_status(&self, status: JobStatus) -> Vec<Job> {
        self.inner
            .read()
            .unwrap()
            .ordered_jobs()
            .into_iter()
            .filter(|j| j.status == status)
            .collect()
    }

    /// Jobs matching the filter, in display order.
    pub fn filter(&self, filter: &JobFilter) -> Vec<Job> {
        self.inner
            .read()
            .unwrap()
            .ordered_jobs()
            .into_iter()
            .filter(|j| filter.matches(j))
            .collect()
    }

    /// Write-through snapshot of the current state, minus transient ghosts.
    /// Runs under the write lock so the snapshot file has a single writer.
    fn persist(&self, inner: &StoreInner) {
        let jobs: Vec<Job> = inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|j| !j.is_transient_ghost())
            .cloned()
            .collect();
        if let Err(e) = self.snapshots.save_snapshot(&jobs) {
            tracing::error!(error = %e, "failed to persist job snapshot");
        }
    }
}

/// Reload normalization for one persisted job. `None` drops the job.
fn recover(job: Job) -> Option<Job> {
    match job.status {
        JobStatus::Error => {
            tracing::debug!(id = %job.id, "dropping failed job from snapshot");
            None
        }
        status if status.is_terminal() => Some(job),
        // Stranded mid-flight by a crash: no dispatch survives a restart, so
        // re-queue with the guard reset and stale progress text cleared.
        _ => Some(Job {
            status: JobStatus::Queued,
            download_triggered: false,
            info: None,
            ..job
        }),
    }
}
