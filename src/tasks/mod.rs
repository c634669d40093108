//! Deferred task execution.
//!
//! Export and import runs are handed off as named tasks so the caller that
//! accepted the request can return as soon as the job exists. Delivery is
//! at-least-once: a task is removed from the queue only after its handler
//! returns, so a crash mid-run leaves it for the next drain.
//!
//! # Submodules
//!
//! - [`queue`] - File-backed queue
//! - [`worker`] - Draining the queue in-process or in a detached process

pub mod queue;
pub mod worker;

pub use queue::{DrainStats, FileTaskQueue, MAX_ATTEMPTS, QueuedTask};
pub use worker::{WorkerCommand, spawn_worker};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The named task entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TaskName {
    /// Run a pending export job
    #[value(name = "run_export_job")]
    RunExportJob,
    /// Run a pending import job
    #[value(name = "run_import_job")]
    RunImportJob,
}

impl TaskName {
    /// Wire name of the task.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RunExportJob => "run_export_job",
            Self::RunImportJob => "run_import_job",
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts tasks for later execution.
pub trait TaskQueue: Send + Sync {
    /// Queue `task` for `job_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the task could not be recorded.
    fn submit(&self, task: TaskName, job_id: &str) -> Result<()>;
}

/// Runs a task taken off the queue.
pub trait TaskHandler: Send + Sync {
    /// Run `task` for `job_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the task could not be run. The task is still
    /// removed from the queue.
    fn handle(&self, task: TaskName, job_id: &str) -> Result<()>;
}
