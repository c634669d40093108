//! Import workflow.
//!
//! Extracts a package into `<work>/import-<random>`, checks that it carries
//! all three members, replays `database.sql` against the site database and
//! copies `files/` over the site root. The staging directory is removed on
//! every exit path.

use super::Migrator;
use crate::archive::{self, DATABASE_ENTRY, FILES_DIR, MANIFEST_ENTRY, Manifest};
use crate::error::{Error, Result};
use crate::jobs::Job;
use crate::snapshot::{RestoreTreeStats, purge_dir, restore_tree};
use crate::storage::{RestoreStats, SqliteStorage};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STAGING_SUFFIX_LENGTH: usize = 8;

/// Outcome of a completed import.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub manifest: Manifest,
    /// Advisory notes about differences between the source site and this one.
    pub notes: Vec<String>,
    pub database: RestoreStats,
    pub files: RestoreTreeStats,
}

impl Migrator {
    /// Import the package at `package` into the configured site.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthorized` if the caller may not import, and the
    /// first failing step's error otherwise. Failures are also recorded in
    /// the activity log.
    pub fn import(&self, package: &Path) -> Result<ImportReport> {
        self.authorize()?;
        self.note_failure(self.run_import(package, &|_, _| {}))
    }

    /// Run an import for a queued job, recording the outcome on the job.
    ///
    /// The package path is read from the job's `data.package`. An accepted
    /// upload under the uploads directory is removed once the job finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be found or updated.
    pub fn import_as_job(&self, job_id: &str) -> Result<Job> {
        let job = self
            .ledger
            .get(job_id)?
            .ok_or_else(|| Error::JobNotFound {
                id: job_id.to_string(),
            })?;
        self.ledger.mark_running(job_id, "Import started")?;

        let Some(package) = job.data_str("package").map(PathBuf::from) else {
            let message = "Job has no package to import";
            self.activity.error(message);
            return self.ledger.mark_error(job_id, message);
        };

        let outcome = self.run_import(&package, &|percent, message| {
            self.report(job_id, percent, message);
        });
        self.discard_upload(&package);

        match outcome {
            Ok(report) => {
                let result = serde_json::json!({
                    "database": report.database,
                    "files": report.files,
                    "notes": report.notes,
                });
                self.ledger.mark_success(job_id, result, "Import complete")
            }
            Err(e) => {
                let message = e.to_string();
                self.activity.error(&message);
                self.ledger.mark_error(job_id, &message)
            }
        }
    }

    pub(super) fn run_import(&self, package: &Path, step: &dyn Fn(u8, &str)) -> Result<ImportReport> {
        let settings = &self.settings;
        if !package.is_file() {
            return Err(Error::ArchiveMissing {
                path: package.to_path_buf(),
            });
        }

        self.activity.info("Validating package");
        step(5, "Validating package");

        let staging = StagingDir::create(&settings.work_dir)?;
        archive::read(package, staging.path())?;
        step(20, "Package extracted");

        let manifest_path = staging.path().join(MANIFEST_ENTRY);
        let database_path = staging.path().join(DATABASE_ENTRY);
        let files_dir = staging.path().join(FILES_DIR);
        let missing: Vec<&str> = [
            (MANIFEST_ENTRY, manifest_path.is_file()),
            (DATABASE_ENTRY, database_path.is_file()),
            (FILES_DIR, files_dir.is_dir()),
        ]
        .into_iter()
        .filter_map(|(name, present)| (!present).then_some(name))
        .collect();
        if !missing.is_empty() {
            return Err(Error::ManifestInvalid(format!(
                "package is incomplete, missing {}",
                missing.join(", ")
            )));
        }

        let manifest = Manifest::read(&manifest_path)?;
        let notes = manifest.compatibility_notes(settings);
        for note in &notes {
            info!(note = %note, "Package compatibility");
            self.activity.info(note);
        }

        self.activity.info("Importing database");
        let database = SqliteStorage::open(&settings.db_path)?.restore(&database_path)?;
        if database.failed > 0 {
            warn!(failed = database.failed, "Some statements failed during restore");
        }
        step(60, "Database restored");

        self.activity.info("Copying files");
        let files = restore_tree(&files_dir, &settings.root, &settings.protected_paths())?;
        step(90, "Files restored");

        info!(
            package = %package.display(),
            statements = database.executed,
            files = files.files,
            "Import complete"
        );
        self.activity.info("Import complete");
        Ok(ImportReport {
            manifest,
            notes,
            database,
            files,
        })
    }

    fn discard_upload(&self, package: &Path) {
        if package.starts_with(self.settings.uploads_dir()) {
            if let Err(e) = fs::remove_file(package) {
                warn!(package = %package.display(), error = %e, "Could not remove imported upload");
            }
        }
    }
}

/// `<work>/import-<random>`, removed when dropped.
struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    fn create(work_dir: &Path) -> Result<Self> {
        fs::create_dir_all(work_dir).map_err(|e| Error::TempDir {
            path: work_dir.to_path_buf(),
            message: e.to_string(),
        })?;

        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STAGING_SUFFIX_LENGTH)
            .map(char::from)
            .collect();
        let path = work_dir.join(format!("import-{suffix}"));

        // create_dir (not create_dir_all) so a name collision fails instead
        // of sharing another import's directory.
        fs::create_dir(&path).map_err(|e| Error::TempDir {
            path: path.clone(),
            message: e.to_string(),
        })?;
        debug!(staging = %path.display(), "Created import staging directory");
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        purge_dir(&self.path);
    }
}
