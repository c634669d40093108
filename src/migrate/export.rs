//! Export workflow.
//!
//! Stages `manifest.json` and `database.sql` in `<work>/export-<stamp>`,
//! then packs them with the site tree into `<work>/sitepack-<stamp>.zip`.

use super::Migrator;
use crate::archive::{
    self, ArchiveStats, DATABASE_ENTRY, MANIFEST_ENTRY, Manifest, PackageContents, file_sha256,
};
use crate::error::{Error, Result};
use crate::file::file_size;
use crate::jobs::{ExportResult, Job};
use crate::snapshot::{Exclusions, purge_dir};
use crate::storage::{DumpStats, SqliteStorage};
use chrono::Local;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Attempts at finding a free export name before giving up.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Outcome of a completed export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub archive: PathBuf,
    pub filename: String,
    pub filesize: u64,
    pub sha256: String,
    pub database: DumpStats,
    pub files: ArchiveStats,
}

impl ExportReport {
    /// The payload recorded on a successful export job.
    #[must_use]
    pub fn job_result(&self) -> ExportResult {
        ExportResult {
            file: self.archive.to_string_lossy().into_owned(),
            filename: self.filename.clone(),
            filesize: self.filesize,
            sha256: Some(self.sha256.clone()),
        }
    }
}

impl Migrator {
    /// Export the site into a new package in the work directory.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthorized` if the caller may not export, and the
    /// first failing step's error otherwise. Failures are also recorded in
    /// the activity log.
    pub fn export(&self) -> Result<ExportReport> {
        self.authorize()?;
        self.note_failure(self.run_export(&|_, _| {}))
    }

    /// Run an export for a queued job, recording the outcome on the job.
    ///
    /// Returns the job in its final state. Export failures end up on the job
    /// as `error`; only ledger failures are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be found or updated.
    pub fn export_as_job(&self, job_id: &str) -> Result<Job> {
        self.ledger.mark_running(job_id, "Export started")?;

        match self.run_export(&|percent, message| self.report(job_id, percent, message)) {
            Ok(report) => {
                let result = serde_json::to_value(report.job_result())?;
                self.ledger.mark_success(
                    job_id,
                    result,
                    &format!("Export complete: {}", report.filename),
                )
            }
            Err(e) => {
                let message = e.to_string();
                self.activity.error(&message);
                self.ledger.mark_error(job_id, &message)
            }
        }
    }

    pub(super) fn run_export(&self, step: &dyn Fn(u8, &str)) -> Result<ExportReport> {
        let settings = &self.settings;
        if !settings.root.is_dir() {
            return Err(Error::Config(format!(
                "Site root is not a directory: {}",
                settings.root.display()
            )));
        }

        self.activity.info("Preparing export");
        step(5, "Preparing export");

        fs::create_dir_all(&settings.work_dir).map_err(|e| Error::TempDir {
            path: settings.work_dir.clone(),
            message: e.to_string(),
        })?;
        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let (staging, archive_path) = allocate_names(&settings.work_dir, &stamp)?;
        fs::create_dir(&staging).map_err(|e| Error::TempDir {
            path: staging.clone(),
            message: e.to_string(),
        })?;
        debug!(staging = %staging.display(), "Created export staging directory");

        let manifest_path = staging.join(MANIFEST_ENTRY);
        Manifest::for_export(settings).write(&manifest_path)?;
        step(10, "Manifest written");

        let database_path = staging.join(DATABASE_ENTRY);
        let database = SqliteStorage::open_existing(&settings.db_path)?.dump(&database_path)?;
        step(40, "Database dumped");

        self.activity.info("Archiving files");
        let exclusions = settings
            .local_config_files()
            .iter()
            .fold(Exclusions::new(), |exclusions, config| exclusions.file(config))
            .dir(&settings.work_dir)
            .database(&settings.db_path);
        let files = archive::write(
            &archive_path,
            &PackageContents {
                manifest: &manifest_path,
                database: &database_path,
                file_roots: std::slice::from_ref(&settings.root),
                exclusions: &exclusions,
            },
        )?;
        step(90, "Archive written");

        // Only a successful run cleans up; a failed one leaves its staging
        // directory behind for inspection.
        purge_dir(&staging);

        let filename = archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let report = ExportReport {
            filesize: file_size(&archive_path)?,
            sha256: file_sha256(&archive_path)?,
            archive: archive_path,
            filename,
            database,
            files,
        };

        info!(
            package = %report.archive.display(),
            bytes = report.filesize,
            tables = report.database.tables,
            files = report.files.files,
            "Export complete"
        );
        self.activity
            .info(&format!("Export complete: {}", report.filename));
        Ok(report)
    }
}

// Picks `export-<stamp>` / `sitepack-<stamp>.zip`, adding `-NN` when a
// previous export in the same second already took the name.
fn allocate_names(work_dir: &Path, stamp: &str) -> Result<(PathBuf, PathBuf)> {
    for suffix in 0..MAX_NAME_ATTEMPTS {
        let base = if suffix == 0 {
            stamp.to_string()
        } else {
            format!("{stamp}-{suffix:02}")
        };
        let staging = work_dir.join(format!("export-{base}"));
        let archive = work_dir.join(format!("sitepack-{base}.zip"));
        if !staging.exists() && !archive.exists() {
            return Ok((staging, archive));
        }
    }

    Err(Error::TempDir {
        path: work_dir.join(format!("export-{stamp}")),
        message: "no free export name".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_allocate_names_skips_taken() {
        let temp_dir = TempDir::new().unwrap();
        let work = temp_dir.path();

        let (staging, archive) = allocate_names(work, "20250101-120000").unwrap();
        assert_eq!(staging, work.join("export-20250101-120000"));
        assert_eq!(archive, work.join("sitepack-20250101-120000.zip"));

        fs::write(&archive, b"taken").unwrap();
        let (staging, archive) = allocate_names(work, "20250101-120000").unwrap();
        assert_eq!(staging, work.join("export-20250101-120000-01"));
        assert_eq!(archive, work.join("sitepack-20250101-120000-01.zip"));
    }
}
