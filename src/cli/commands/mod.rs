//! Command implementations.

pub mod completions;
pub mod config;
pub mod export;
pub mod import;
pub mod jobs;
pub mod log;
pub mod tasks;
pub mod version;

use crate::cli::Cli;
use crate::config::{Overrides, Settings};
use crate::error::Result;
use crate::jobs::JobLedger;
use crate::migrate::{LocalOperator, Migrator};
use crate::tasks::{FileTaskQueue, WorkerCommand};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Collaborators for one CLI invocation, wired once from the resolved settings.
#[derive(Debug)]
pub struct Runtime {
    pub migrator: Migrator,
    pub queue: Arc<FileTaskQueue>,
}

impl Runtime {
    /// Resolve settings from the global flags and wire the migrator.
    ///
    /// Queued tasks are worked by a detached `sitepack tasks work` started
    /// with the same site flags.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if settings cannot be resolved.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let settings = Settings::resolve(&Overrides {
            root: cli.root.clone(),
            db: cli.db.clone(),
            work_dir: cli.work_dir.clone(),
            config: cli.config.clone(),
        })?;
        let worker = if settings.background_worker {
            WorkerCommand::current_exe(worker_args(&settings, cli.config.as_deref()))
        } else {
            None
        };
        Ok(Self::new(settings, worker))
    }

    /// Wire a runtime for `settings`, optionally nudging `worker` on submit.
    #[must_use]
    pub fn new(settings: Settings, worker: Option<WorkerCommand>) -> Self {
        let ledger = Arc::new(JobLedger::open(settings.jobs_path(), settings.max_jobs));

        let mut queue = FileTaskQueue::new(settings.queue_path());
        if let Some(worker) = worker {
            queue = queue.with_worker(worker);
        }
        let queue = Arc::new(queue);

        let migrator = Migrator::new(settings, ledger, queue.clone(), Arc::new(LocalOperator));
        Self { migrator, queue }
    }
}

fn worker_args(settings: &Settings, config: Option<&Path>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--root".into(),
        settings.root.clone().into(),
        "--db".into(),
        settings.db_path.clone().into(),
        "--work-dir".into(),
        settings.work_dir.clone().into(),
    ];
    if let Some(config) = config {
        args.push("--config".into());
        args.push(config.into());
    }
    args
}

/// Copy `source` to `destination`, which may name a file or an existing
/// directory. Returns the path written.
pub(crate) fn copy_package(source: &Path, destination: &Path) -> Result<PathBuf> {
    let target = match source.file_name() {
        Some(name) if destination.is_dir() => destination.join(name),
        _ => destination.to_path_buf(),
    };
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, &target)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_worker_args_carry_site_paths() {
        let settings = Settings::for_root("/srv/site");
        let args = worker_args(&settings, Some(Path::new("/etc/sitepack.json")));
        let args: Vec<&str> = args.iter().map(|a| a.to_str().unwrap()).collect();

        assert_eq!(
            args,
            vec![
                "--root",
                "/srv/site",
                "--db",
                "/srv/site/site.db",
                "--work-dir",
                "/srv/site/.sitepack",
                "--config",
                "/etc/sitepack.json"
            ]
        );
    }

    #[test]
    fn test_copy_package_into_directory_or_file() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("sitepack-1.zip");
        fs::write(&source, b"zip").unwrap();

        let dir = temp_dir.path().join("out");
        fs::create_dir(&dir).unwrap();
        assert_eq!(copy_package(&source, &dir).unwrap(), dir.join("sitepack-1.zip"));

        let named = temp_dir.path().join("nested/backup.zip");
        assert_eq!(copy_package(&source, &named).unwrap(), named);
        assert_eq!(fs::read(&named).unwrap(), b"zip");
    }
}
