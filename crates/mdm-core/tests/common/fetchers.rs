//! Test fetchers driving the orchestrator without any real network or tool.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use mdm_core::fetch::{
    AbortToken, EventSink, FetchEvent, FetchFailure, FetchOptions, FetchOutcome, Fetcher,
};
use mdm_core::retry::ErrorCategory;

pub fn success(files: &[&str], locator: &str) -> FetchOutcome {
    FetchOutcome::Success {
        files: files.iter().map(|f| f.to_string()).collect(),
        saved_locator: locator.to_string(),
    }
}

pub fn failure(category: ErrorCategory, message: &str) -> FetchOutcome {
    FetchOutcome::failure(category, message)
}

pub fn progress(percent: f32) -> FetchEvent {
    FetchEvent::Progress {
        percent: Some(percent),
        eta_secs: None,
        message: format!("downloading: {percent}%"),
    }
}

/// What a gated fetch replays when released: events first, then the outcome.
pub type Release = (Vec<FetchEvent>, FetchOutcome);

/// Fetcher that blocks each fetch on a per-url gate until the test releases
/// it. Lets tests hold jobs in the running state, observe admission order and
/// deliver deliberately late outcomes after a cancel.
pub struct GatedFetcher {
    started_tx: mpsc::UnboundedSender<String>,
    gates: Mutex<HashMap<String, oneshot::Receiver<Release>>>,
    titles: Mutex<HashMap<String, String>>,
    calls: AtomicU32,
    concurrent: AtomicUsize,
    peak: AtomicUsize,
}

impl GatedFetcher {
    /// Returns the fetcher and a channel announcing each url as its fetch
    /// starts.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(GatedFetcher {
                started_tx: tx,
                gates: Mutex::new(HashMap::new()),
                titles: Mutex::new(HashMap::new()),
                calls: AtomicU32::new(0),
                concurrent: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
            rx,
        )
    }

    /// Register a gate for `url`. Must be called before the fetch starts;
    /// the fetch then blocks until the returned sender fires.
    pub fn gate(&self, url: &str) -> oneshot::Sender<Release> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(url.to_string(), rx);
        tx
    }

    pub fn set_title(&self, url: &str, title: &str) {
        self.titles
            .lock()
            .unwrap()
            .insert(url.to_string(), title.to_string());
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.concurrent.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for GatedFetcher {
    async fn probe_title(
        &self,
        url: &str,
        _options: &FetchOptions,
    ) -> Result<Option<String>, FetchFailure> {
        Ok(self.titles.lock().unwrap().get(url).cloned())
    }

    async fn fetch(
        &self,
        url: &str,
        _options: &FetchOptions,
        events: EventSink,
        _abort: AbortToken,
    ) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.enter();
        let _ = self.started_tx.send(url.to_string());

        let gate = self.gates.lock().unwrap().remove(url);
        let outcome = match gate {
            Some(rx) => match rx.await {
                Ok((replay, outcome)) => {
                    for event in replay {
                        events(event);
                    }
                    outcome
                }
                Err(_) => FetchOutcome::failure(ErrorCategory::Unknown, "gate dropped"),
            },
            None => success(&["out.mp4"], "/downloads/out.mp4"),
        };

        self.exit();
        outcome
    }
}

/// Fetcher that replays a fixed list of outcomes, one per call, then
/// succeeds. Used for retry-pacing tests.
pub struct ScriptedFetcher {
    script: Mutex<Vec<FetchOutcome>>,
    calls: AtomicU32,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<FetchOutcome>) -> Arc<Self> {
        Arc::new(ScriptedFetcher {
            script: Mutex::new(script),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn probe_title(
        &self,
        _url: &str,
        _options: &FetchOptions,
    ) -> Result<Option<String>, FetchFailure> {
        Ok(None)
    }

    async fn fetch(
        &self,
        _url: &str,
        _options: &FetchOptions,
        _events: EventSink,
        _abort: AbortToken,
    ) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            success(&["out.mp4"], "/downloads/out.mp4")
        } else {
            script.remove(0)
        }
    }
}

/// Fetcher that just sleeps and succeeds, tracking how many fetches overlap.
pub struct CountingFetcher {
    delay: Duration,
    concurrent: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicU32,
}

impl CountingFetcher {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(CountingFetcher {
            delay,
            concurrent: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            completed: AtomicU32::new(0),
        })
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn probe_title(
        &self,
        _url: &str,
        _options: &FetchOptions,
    ) -> Result<Option<String>, FetchFailure> {
        Ok(None)
    }

    async fn fetch(
        &self,
        url: &str,
        _options: &FetchOptions,
        _events: EventSink,
        _abort: AbortToken,
    ) -> FetchOutcome {
        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        // Vary the duration a little per url so completions interleave.
        let jitter = (url.len() % 5) as u32;
        tokio::time::sleep(self.delay + Duration::from_millis(jitter as u64)).await;

        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        success(&["out.mp4"], "/downloads/out.mp4")
    }
}
