//! Queue workers.

use super::TaskHandler;
use super::queue::{DrainStats, FileTaskQueue};
use crate::error::Result;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// How to start a detached `sitepack tasks work` process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    /// Worker running `program` with `global_args` before `tasks work --quiet`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, global_args: Vec<OsString>) -> Self {
        let mut args = global_args;
        args.extend(["tasks", "work", "--quiet"].map(OsString::from));
        Self {
            program: program.into(),
            args,
        }
    }

    /// Worker running the current executable, if it can be located.
    #[must_use]
    pub fn current_exe(global_args: Vec<OsString>) -> Option<Self> {
        std::env::current_exe()
            .ok()
            .map(|exe| Self::new(exe, global_args))
    }

    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Spawn the worker detached from this process.
    ///
    /// Best effort: a failed spawn leaves the task queued for the next
    /// `sitepack tasks work`.
    pub fn spawn_detached(&self) {
        let spawned = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(child) => debug!(pid = child.id(), "Spawned background worker"),
            Err(e) => warn!(error = %e, "Could not spawn background worker; task stays queued"),
        }
    }
}

/// Drain `queue` on a background thread.
///
/// For hosts that embed sitepack and want the queue worked in-process.
///
/// # Errors
///
/// Returns an error if the thread cannot be started.
pub fn spawn_worker(
    queue: Arc<FileTaskQueue>,
    handler: Arc<dyn TaskHandler>,
) -> Result<JoinHandle<Result<DrainStats>>> {
    let handle = thread::Builder::new()
        .name("sitepack-worker".to_string())
        .spawn(move || queue.drain(handler.as_ref()))?;
    Ok(handle)
}
