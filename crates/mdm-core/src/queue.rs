//! Bounded-concurrency admission queue.
//!
//! A FIFO backlog plus a set of active slots, all under one lock (distinct
//! from the store's). Admission happens only inside `try_admit`, slot release
//! only inside `settle`; the owner dispatches admitted jobs outside the lock
//! and calls `try_admit` again after every `settle`, which is what drains the
//! backlog without polling.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::fetch::AbortToken;
use crate::job::JobId;

/// One admitted job, ready to dispatch.
#[derive(Debug, Clone)]
pub struct Admission {
    pub id: JobId,
    pub abort: AbortToken,
}

/// Result of [`DownloadQueue::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Still waiting in the backlog; removed, no slot was held.
    Dequeued,
    /// Already dispatched; the abort token was signalled, the slot frees on
    /// `settle`.
    Signalled,
    /// Not tracked here (never enqueued, or already settled).
    Unknown,
}

struct QueueInner {
    backlog: VecDeque<JobId>,
    active: HashMap<JobId, AbortToken>,
    max_concurrent: usize,
}

/// Concurrency-bounded scheduler backlog.
pub struct DownloadQueue {
    inner: Mutex<QueueInner>,
}

impl DownloadQueue {
    pub fn new(max_concurrent: usize) -> Self {
        DownloadQueue {
            inner: Mutex::new(QueueInner {
                backlog: VecDeque::new(),
                active: HashMap::new(),
                max_concurrent: max_concurrent.max(1),
            }),
        }
    }

    /// Append to the backlog. Ignored when the id is already backlogged or
    /// active, so a double enqueue cannot run a job twice.
    pub fn enqueue(&self, id: JobId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.active.contains_key(&id) || inner.backlog.contains(&id) {
            tracing::debug!(%id, "already queued or active, ignoring enqueue");
            return;
        }
        inner.backlog.push_back(id);
    }

    /// Admit backlog heads while below the concurrency limit.
    ///
    /// One critical section, so concurrent callers can never over-admit. The
    /// returned batch is what the caller must dispatch, outside this lock.
    pub fn try_admit(&self) -> Vec<Admission> {
        let mut inner = self.inner.lock().unwrap();
        let mut admitted = Vec::new();
        while inner.active.len() < inner.max_concurrent {
            let Some(id) = inner.backlog.pop_front() else {
                break;
            };
            let abort = AbortToken::new();
            inner.active.insert(id.clone(), abort.clone());
            admitted.push(Admission { id, abort });
        }
        admitted
    }

    /// Release the slot held by a dispatched job. Returns false if the job
    /// held no slot (already settled or never admitted).
    pub fn settle(&self, id: &JobId) -> bool {
        self.inner.lock().unwrap().active.remove(id).is_some()
    }

    pub fn cancel(&self, id: &JobId) -> CancelOutcome {
        let mut inner = self.inner.lock().unwrap();
        if let Some(pos) = inner.backlog.iter().position(|j| j == id) {
            inner.backlog.remove(pos);
            return CancelOutcome::Dequeued;
        }
        if let Some(abort) = inner.active.get(id) {
            abort.abort();
            return CancelOutcome::Signalled;
        }
        CancelOutcome::Unknown
    }

    /// Drain the backlog and signal abort to every in-flight fetch. Returns
    /// (drained backlog ids, signalled active ids).
    pub fn cancel_all(&self) -> (Vec<JobId>, Vec<JobId>) {
        let mut inner = self.inner.lock().unwrap();
        let dequeued: Vec<JobId> = inner.backlog.drain(..).collect();
        let mut signalled = Vec::new();
        for (id, abort) in inner.active.iter() {
            abort.abort();
            signalled.push(id.clone());
        }
        (dequeued, signalled)
    }

    /// Change the concurrency limit. Takes effect on the next `try_admit`;
    /// jobs already in flight above a lowered limit are not preempted.
    pub fn set_max_concurrent(&self, max_concurrent: usize) {
        self.inner.lock().unwrap().max_concurrent = max_concurrent.max(1);
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().unwrap().active.len()
    }

    pub fn backlog_len(&self) -> usize {
        self.inner.lock().unwrap().backlog.len()
    }

    pub fn is_idle(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.active.is_empty() && inner.backlog.is_empty()
    }
}
