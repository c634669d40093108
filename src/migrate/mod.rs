//! Export and import orchestration.
//!
//! [`Migrator`] sequences the dump engine, the snapshot engine and the
//! archive codec into the two workflows, and exposes them both synchronously
//! ([`Migrator::export`], [`Migrator::import`]) and as queued jobs
//! ([`Migrator::start_export`], [`Migrator::start_import`]).
//!
//! # Submodules
//!
//! - [`auth`] - Caller authorization seam
//! - [`export`] - Export workflow
//! - [`import`] - Import workflow
//! - [`jobs`] - Job-driven entry points and downloads
//! - [`upload`] - Upload acceptance

pub mod auth;
pub mod export;
pub mod import;
pub mod jobs;
pub mod upload;

pub use auth::{Authorizer, FnAuthorizer, LocalOperator};
pub use export::ExportReport;
pub use import::ImportReport;
pub use jobs::DownloadInfo;
pub use upload::{Upload, accept_upload};

use crate::activity::ActivityLog;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::jobs::JobLedger;
use crate::tasks::{TaskHandler, TaskName, TaskQueue};
use std::sync::Arc;
use tracing::warn;

/// The export/import orchestrator.
///
/// Cheap to clone; every collaborator is shared.
#[derive(Clone)]
pub struct Migrator {
    settings: Settings,
    ledger: Arc<JobLedger>,
    queue: Arc<dyn TaskQueue>,
    authorizer: Arc<dyn Authorizer>,
    activity: Arc<ActivityLog>,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("settings", &self.settings)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl Migrator {
    /// Wire a migrator from its collaborators.
    ///
    /// The activity log lives at [`Settings::activity_path`].
    #[must_use]
    pub fn new(
        settings: Settings,
        ledger: Arc<JobLedger>,
        queue: Arc<dyn TaskQueue>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let activity = Arc::new(ActivityLog::new(settings.activity_path()));
        Self {
            settings,
            ledger,
            queue,
            authorizer,
            activity,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    #[must_use]
    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    fn authorize(&self) -> Result<()> {
        if self.authorizer.is_authorized() {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }

    // Record a workflow failure in the activity log before passing it on.
    fn note_failure<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.activity.error(&e.to_string());
        }
        result
    }

    // Progress updates are advisory; a failed write must not abort the run.
    fn report(&self, job_id: &str, percent: u8, message: &str) {
        if let Err(e) = self
            .ledger
            .set_progress(job_id, i64::from(percent), Some(message))
        {
            warn!(job_id, error = %e, "Could not record job progress");
        }
    }
}

impl TaskHandler for Migrator {
    fn handle(&self, task: TaskName, job_id: &str) -> Result<()> {
        self.run_task(task, job_id).map(|_| ())
    }
}
