//! Change fan-out: listeners observing job add/update/remove/clear.
//!
//! Listeners run synchronously after the mutation has been persisted, in
//! registration order. A panicking listener is caught and logged so it can
//! never poison the store lock or starve the listeners behind it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use crate::job::{Job, JobId};

/// Observer of job store changes. Position is the job's index in display
/// order at the time of the event.
pub trait JobChangeListener: Send + Sync {
    fn on_added(&self, job: &Job, position: usize);
    fn on_updated(&self, job: &Job, position: usize);
    fn on_removed(&self, id: &JobId, position: usize);
    fn on_cleared(&self);
}

/// One store mutation, as seen by listeners.
#[derive(Debug, Clone)]
pub(crate) enum ChangeEvent {
    Added(Job, usize),
    Updated(Job, usize),
    Removed(JobId, usize),
    Cleared,
}

/// Listener registry. Fan-out is fire-and-forget per listener.
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: RwLock<Vec<Arc<dyn JobChangeListener>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn JobChangeListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    /// Remove a previously registered listener (matched by identity).
    pub fn remove_listener(&self, listener: &Arc<dyn JobChangeListener>) {
        self.listeners
            .write()
            .unwrap()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub(crate) fn notify(&self, event: &ChangeEvent) {
        // Snapshot the registry so listeners can (de)register from callbacks.
        let listeners: Vec<_> = self.listeners.read().unwrap().clone();
        for listener in listeners {
            let result = catch_unwind(AssertUnwindSafe(|| match event {
                ChangeEvent::Added(job, pos) => listener.on_added(job, *pos),
                ChangeEvent::Updated(job, pos) => listener.on_updated(job, *pos),
                ChangeEvent::Removed(id, pos) => listener.on_removed(id, *pos),
                ChangeEvent::Cleared => listener.on_cleared(),
            }));
            if result.is_err() {
                tracing::error!("job change listener panicked; continuing with remaining listeners");
            }
        }
    }
}
