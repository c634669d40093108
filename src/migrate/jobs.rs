//! Job-driven entry points and downloads.

use super::Migrator;
use super::upload::{Upload, accept_upload};
use crate::error::{Error, Result};
use crate::file::file_size;
use crate::jobs::{Job, JobType};
use crate::tasks::TaskName;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

/// A verified export package ready to be streamed to a client.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadInfo {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
}

impl Migrator {
    /// Create an export job and queue it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthorized`, or an error if the job cannot be created
    /// or queued.
    pub fn start_export(&self) -> Result<Job> {
        self.authorize()?;
        let job = self.ledger.create(JobType::Export, json!({}))?;
        self.enqueue(TaskName::RunExportJob, job)
    }

    /// Accept `upload`, create an import job for it and queue the job.
    ///
    /// A rejected upload never creates a job.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthorized`, `Error::UploadRejected`, or an error if
    /// the job cannot be created or queued.
    pub fn start_import(&self, upload: &Upload) -> Result<Job> {
        self.authorize()?;
        let package = accept_upload(upload, &self.settings.uploads_dir())?;
        let job = self.ledger.create(
            JobType::Import,
            json!({ "package": package.to_string_lossy() }),
        )?;
        self.enqueue(TaskName::RunImportJob, job)
    }

    fn enqueue(&self, task: TaskName, job: Job) -> Result<Job> {
        if let Err(e) = self.queue.submit(task, &job.id) {
            let message = format!("Could not queue {task}: {e}");
            self.activity.error(&message);
            self.ledger.mark_error(&job.id, &message)?;
            return Err(e);
        }

        info!(job_id = %job.id, job_type = %job.job_type, "Job queued");
        self.activity
            .info(&format!("{} job queued: {}", job.job_type, job.id));
        Ok(job)
    }

    /// Execute a queued task for `job_id`.
    ///
    /// Returns `None` when there is nothing to do: the job already finished
    /// (a redelivered task) or its type does not match the task.
    ///
    /// # Errors
    ///
    /// Returns `Error::JobNotFound` for an unknown id, or a ledger error.
    pub fn run_task(&self, task: TaskName, job_id: &str) -> Result<Option<Job>> {
        let job = self
            .ledger
            .get(job_id)?
            .ok_or_else(|| Error::JobNotFound {
                id: job_id.to_string(),
            })?;

        if job.status.is_terminal() {
            info!(job_id, status = %job.status, "Job already finished; skipping task");
            return Ok(None);
        }

        let expected = match task {
            TaskName::RunExportJob => JobType::Export,
            TaskName::RunImportJob => JobType::Import,
        };
        if job.job_type != expected {
            warn!(job_id, task = %task, job_type = %job.job_type, "Task does not match job type; ignoring");
            return Ok(None);
        }

        let finished = match task {
            TaskName::RunExportJob => self.export_as_job(job_id)?,
            TaskName::RunImportJob => self.import_as_job(job_id)?,
        };
        Ok(Some(finished))
    }

    /// Resolve the package of a successful export job, checking `token`.
    ///
    /// Every failure looks the same to the caller so it cannot tell an
    /// unknown job from a wrong token.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDownload` if the job is unknown, the token does
    /// not match, the job has no export result, or the package is gone.
    pub fn download(&self, job_id: &str, token: &str) -> Result<DownloadInfo> {
        if !self.ledger.verify_token(job_id, token)? {
            return Err(Error::InvalidDownload);
        }

        let result = self
            .ledger
            .get(job_id)?
            .and_then(|job| job.export_result())
            .ok_or(Error::InvalidDownload)?;

        let path = PathBuf::from(&result.file);
        if !path.is_file() {
            warn!(job_id, package = %path.display(), "Export package no longer exists");
            return Err(Error::InvalidDownload);
        }

        Ok(DownloadInfo {
            size: file_size(&path)?,
            path,
            filename: result.filename,
        })
    }
}
