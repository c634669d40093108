//! Persistence for the job collection.

use super::types::Job;
use crate::error::Result;
use crate::file::{read_json_or_default, write_json};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Somewhere to keep the whole job collection.
///
/// The ledger always loads and saves the full collection; stores do not
/// need to support partial updates.
pub trait JobStore: Send + Sync {
    /// Load every stored job.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn load(&self) -> Result<Vec<Job>>;

    /// Replace the stored collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn save(&self, jobs: &[Job]) -> Result<()>;
}

/// Jobs kept in a single JSON document, rewritten atomically.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    path: PathBuf,
}

impl FileJobStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JobStore for FileJobStore {
    fn load(&self) -> Result<Vec<Job>> {
        read_json_or_default(&self.path)
    }

    fn save(&self, jobs: &[Job]) -> Result<()> {
        write_json(&self.path, jobs)
    }
}

/// Jobs kept in memory (for tests and embedding hosts).
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<Vec<Job>>,
}

impl MemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn load(&self) -> Result<Vec<Job>> {
        Ok(self.jobs.lock().clone())
    }

    fn save(&self, jobs: &[Job]) -> Result<()> {
        *self.jobs.lock() = jobs.to_vec();
        Ok(())
    }
}
