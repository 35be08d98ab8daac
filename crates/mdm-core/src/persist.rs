//! Durable job snapshots: save/load the full job list.
//!
//! The store writes through on every mutation, so `save_snapshot` must be
//! atomic: a crash mid-save may lose the newest write but never corrupt the
//! previous one. The file-backed implementation writes to a temp file in the
//! same directory and renames it over the target.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::job::Job;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("snapshot location: {0}")]
    Location(#[from] xdg::BaseDirectoriesError),
}

/// Persistence capability used by the job store.
pub trait SnapshotStore: Send + Sync {
    fn save_snapshot(&self, jobs: &[Job]) -> Result<(), SnapshotError>;
    fn load_snapshot(&self) -> Result<Vec<Job>, SnapshotError>;
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for Arc<S> {
    fn save_snapshot(&self, jobs: &[Job]) -> Result<(), SnapshotError> {
        (**self).save_snapshot(jobs)
    }

    fn load_snapshot(&self) -> Result<Vec<Job>, SnapshotError> {
        (**self).load_snapshot()
    }
}

/// JSON file snapshot store, the default backend.
///
/// The snapshot lives under the XDG state directory
/// (`~/.local/state/mdm/jobs.json`).
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    /// Open the default snapshot location, creating parent dirs if needed.
    pub fn open_default() -> Result<Self, SnapshotError> {
        let dirs = xdg::BaseDirectories::with_prefix("mdm")?;
        let state_dir = dirs.get_state_home();
        std::fs::create_dir_all(&state_dir)?;
        Ok(JsonSnapshotStore {
            path: state_dir.join("jobs.json"),
        })
    }

    /// Open a snapshot at a specific path. Intended for tests so the file can
    /// live in a temp directory.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(JsonSnapshotStore { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn save_snapshot(&self, jobs: &[Job]) -> Result<(), SnapshotError> {
        let data = serde_json::to_vec_pretty(jobs)?;
        // Temp file must be on the same filesystem as the target for the
        // rename to be atomic.
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp.as_file(), &data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Vec<Job>, SnapshotError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read(&self.path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// In-memory snapshot store for tests.
#[derive(Default)]
pub struct MemorySnapshotStore {
    jobs: Mutex<Vec<Job>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed the snapshot, as if a previous process had saved it.
    pub fn seeded(jobs: Vec<Job>) -> Self {
        MemorySnapshotStore {
            jobs: Mutex::new(jobs),
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save_snapshot(&self, jobs: &[Job]) -> Result<(), SnapshotError> {
        *self.jobs.lock().unwrap() = jobs.to_vec();
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Vec<Job>, SnapshotError> {
        Ok(self.jobs.lock().unwrap().clone())
    }
}
