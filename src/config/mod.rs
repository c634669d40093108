//! Configuration management.
//!
//! Resolves the [`Settings`] every command runs with: where the site root
//! lives, which SQLite database holds its state, and where sitepack keeps its
//! own working files (job ledger, task queue, activity log, staging dirs).
//!
//! Priority for each value:
//! 1. Explicit CLI flag
//! 2. `SITEPACK_*` environment variable
//! 3. `sitepack.json` config file
//! 4. Built-in default
//!
//! The config file is the one passed with `--config`, otherwise
//! `<root>/sitepack.json`, otherwise `~/.sitepack/config.json`.

use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-site config file looked up under the root.
pub const CONFIG_FILE_NAME: &str = "sitepack.json";

/// Default name of the working directory under the root.
pub const DEFAULT_WORK_DIR: &str = ".sitepack";

/// Default database file name under the root.
pub const DEFAULT_DB_FILE: &str = "site.db";

/// Root-relative file that import never overwrites.
pub const DEFAULT_PROTECTED_FILE: &str = ".env";

/// Default number of jobs kept in the ledger.
pub const DEFAULT_MAX_JOBS: usize = 10;

/// Values read from a `sitepack.json` file.
///
/// Every field is optional; unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigFile {
    pub root: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub site_url: Option<String>,
    pub home_url: Option<String>,
    pub table_prefix: Option<String>,
    pub protected_file: Option<String>,
    pub max_jobs: Option<usize>,
    /// Start a detached worker after queueing a task (default true).
    pub background_worker: Option<bool>,
}

/// Values given explicitly, usually from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Fully resolved settings.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// Application root whose file tree is packaged.
    pub root: PathBuf,
    /// SQLite database holding the site's relational state.
    pub db_path: PathBuf,
    /// sitepack's own working directory; never packaged.
    pub work_dir: PathBuf,
    pub site_url: String,
    pub home_url: String,
    pub table_prefix: String,
    /// Root-relative path import refuses to overwrite.
    pub protected_file: String,
    /// Job ledger capacity.
    pub max_jobs: usize,
    /// Whether queued tasks start a detached worker. When off, something
    /// else (cron, a supervisor) runs `sitepack tasks work`.
    pub background_worker: bool,
    /// Config file the settings were read from, if any.
    pub config_path: Option<PathBuf>,
}

impl Settings {
    /// Resolve settings from overrides, the process environment and config files.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if an explicit config file is missing or unparsable,
    /// or if the current directory cannot be determined.
    pub fn resolve(overrides: &Overrides) -> Result<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok(), global_config_path())
    }

    /// Resolve settings with an injected environment lookup and global config path.
    ///
    /// # Errors
    ///
    /// See [`Settings::resolve`].
    pub fn resolve_with(
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
        global_config: Option<PathBuf>,
    ) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let explicit_config = match &overrides.config {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Some(path.clone())
            }
            None => None,
        };
        let explicit_file = explicit_config
            .as_deref()
            .map(load_config_file)
            .transpose()?;

        // Root may come from the explicit config file, but never from the
        // root-relative one.
        let root = match overrides
            .root
            .clone()
            .or_else(|| env("SITEPACK_ROOT").map(PathBuf::from))
            .or_else(|| explicit_file.as_ref().and_then(|f| f.root.clone()))
        {
            Some(root) => root,
            None => std::env::current_dir()
                .map_err(|e| Error::Config(format!("Failed to get current directory: {e}")))?,
        };
        // Every derived path is absolute so it survives being handed to a
        // worker process.
        let root = std::path::absolute(&root)
            .map_err(|e| Error::Config(format!("Invalid site root {}: {e}", root.display())))?;

        let (file, config_path) = match (explicit_file, explicit_config) {
            (Some(file), path) => (file, path),
            _ => {
                let local = root.join(CONFIG_FILE_NAME);
                if local.is_file() {
                    (load_config_file(&local)?, Some(local))
                } else if let Some(global) = global_config.filter(|p| p.is_file()) {
                    (load_config_file(&global)?, Some(global))
                } else {
                    (ConfigFile::default(), None)
                }
            }
        };

        let db_path = overrides
            .db
            .clone()
            .or_else(|| env("SITEPACK_DB").map(PathBuf::from))
            .or(file.db)
            .map_or_else(|| root.join(DEFAULT_DB_FILE), |p| under_root(&root, p));

        let work_dir = overrides
            .work_dir
            .clone()
            .or_else(|| env("SITEPACK_WORK_DIR").map(PathBuf::from))
            .or(file.work_dir)
            .map_or_else(|| root.join(DEFAULT_WORK_DIR), |p| under_root(&root, p));

        let site_url = env("SITEPACK_SITE_URL").or(file.site_url).unwrap_or_default();
        let home_url = env("SITEPACK_HOME_URL")
            .or(file.home_url)
            .unwrap_or_else(|| site_url.clone());
        let table_prefix = env("SITEPACK_TABLE_PREFIX")
            .or(file.table_prefix)
            .unwrap_or_default();

        let max_jobs = file.max_jobs.unwrap_or(DEFAULT_MAX_JOBS);
        if max_jobs == 0 {
            return Err(Error::Config("max_jobs must be at least 1".to_string()));
        }

        Ok(Self {
            root,
            db_path,
            work_dir,
            site_url,
            home_url,
            table_prefix,
            protected_file: file
                .protected_file
                .unwrap_or_else(|| DEFAULT_PROTECTED_FILE.to_string()),
            max_jobs,
            background_worker: file.background_worker.unwrap_or(true),
            config_path,
        })
    }

    /// Settings rooted at `root` with every other value defaulted.
    #[must_use]
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            db_path: root.join(DEFAULT_DB_FILE),
            work_dir: root.join(DEFAULT_WORK_DIR),
            root,
            site_url: String::new(),
            home_url: String::new(),
            table_prefix: String::new(),
            protected_file: DEFAULT_PROTECTED_FILE.to_string(),
            max_jobs: DEFAULT_MAX_JOBS,
            background_worker: true,
            config_path: None,
        }
    }

    /// Path of the job ledger document.
    #[must_use]
    pub fn jobs_path(&self) -> PathBuf {
        self.work_dir.join("jobs.json")
    }

    /// Path of the task queue document.
    #[must_use]
    pub fn queue_path(&self) -> PathBuf {
        self.work_dir.join("queue.json")
    }

    /// Path of the activity log document.
    #[must_use]
    pub fn activity_path(&self) -> PathBuf {
        self.work_dir.join("activity.json")
    }

    /// Directory accepted uploads are moved into.
    #[must_use]
    pub fn uploads_dir(&self) -> PathBuf {
        self.work_dir.join("uploads")
    }

    /// This host's config files that live under the root.
    ///
    /// `<root>/sitepack.json` is always included since its presence alone
    /// changes how the root resolves, along with the file actually loaded
    /// when that lies under the root.
    #[must_use]
    pub fn local_config_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.root.join(CONFIG_FILE_NAME)];
        if let Some(loaded) = self
            .config_path
            .as_deref()
            .and_then(|p| std::path::absolute(p).ok())
            .filter(|p| p.starts_with(&self.root) && !files.contains(p))
        {
            files.push(loaded);
        }
        files
    }

    /// Root-relative paths an import must leave untouched: the protected
    /// file plus [`Settings::local_config_files`].
    #[must_use]
    pub fn protected_paths(&self) -> Vec<String> {
        let mut paths = vec![self.protected_file.clone()];
        paths.extend(self.local_config_files().iter().filter_map(|p| {
            p.strip_prefix(&self.root)
                .ok()
                .map(|relative| relative.to_string_lossy().into_owned())
        }));
        paths
    }
}

/// Get the global sitepack config file location (`~/.sitepack/config.json`).
#[must_use]
pub fn global_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".sitepack").join("config.json"))
}

/// Load a `sitepack.json` file.
///
/// # Errors
///
/// Returns `Error::Config` if the file cannot be read or parsed.
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file {}: {e}", path.display())))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file {}: {e}", path.display())))
}

fn under_root(root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn overrides_for(root: &Path) -> Overrides {
        Overrides {
            root: Some(root.to_path_buf()),
            ..Overrides::default()
        }
    }

    #[test]
    fn test_defaults_under_root() {
        let temp_dir = TempDir::new().unwrap();
        let settings =
            Settings::resolve_with(&overrides_for(temp_dir.path()), no_env, None).unwrap();

        assert_eq!(settings.db_path, temp_dir.path().join("site.db"));
        assert_eq!(settings.work_dir, temp_dir.path().join(".sitepack"));
        assert_eq!(settings.jobs_path(), temp_dir.path().join(".sitepack/jobs.json"));
        assert_eq!(settings.protected_file, ".env");
        assert_eq!(settings.max_jobs, 10);
        assert!(settings.background_worker);
        assert!(settings.config_path.is_none());
    }

    #[test]
    fn test_flag_beats_env_beats_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("sitepack.json"),
            r#"{"db": "from-file.db", "work_dir": "file-work", "site_url": "https://file", "table_prefix": "wp_"}"#,
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            ("SITEPACK_DB", "/env/site.db"),
            ("SITEPACK_WORK_DIR", "/env/work"),
            ("SITEPACK_SITE_URL", "https://env"),
        ]
        .into_iter()
        .collect();
        let lookup = |k: &str| env.get(k).map(|v| (*v).to_string());

        let mut overrides = overrides_for(temp_dir.path());
        overrides.db = Some(PathBuf::from("/flag/site.db"));

        let settings = Settings::resolve_with(&overrides, lookup, None).unwrap();

        assert_eq!(settings.db_path, PathBuf::from("/flag/site.db"));
        assert_eq!(settings.work_dir, PathBuf::from("/env/work"));
        assert_eq!(settings.site_url, "https://env");
        assert_eq!(settings.home_url, "https://env");
        assert_eq!(settings.table_prefix, "wp_");
    }

    #[test]
    fn test_relative_file_paths_resolve_under_root() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("sitepack.json"),
            r#"{"db": "data/app.db", "protected_file": "config/secrets.toml", "max_jobs": 3, "background_worker": false}"#,
        )
        .unwrap();

        let settings =
            Settings::resolve_with(&overrides_for(temp_dir.path()), no_env, None).unwrap();

        assert_eq!(settings.db_path, temp_dir.path().join("data/app.db"));
        assert_eq!(settings.protected_file, "config/secrets.toml");
        assert_eq!(settings.max_jobs, 3);
        assert!(!settings.background_worker);
        assert_eq!(settings.config_path, Some(temp_dir.path().join("sitepack.json")));
    }

    #[test]
    fn test_global_config_used_when_no_local() {
        let temp_dir = TempDir::new().unwrap();
        let global = temp_dir.path().join("global.json");
        fs::write(&global, r#"{"home_url": "https://home"}"#).unwrap();

        let root = temp_dir.path().join("site");
        fs::create_dir_all(&root).unwrap();

        let settings =
            Settings::resolve_with(&overrides_for(&root), no_env, Some(global.clone())).unwrap();

        assert_eq!(settings.home_url, "https://home");
        assert_eq!(settings.config_path, Some(global));
    }

    #[test]
    fn test_local_config_files_are_protected() {
        let mut settings = Settings::for_root("/srv/site");
        settings.config_path = Some(PathBuf::from("/srv/site/conf/prod.json"));

        assert_eq!(
            settings.local_config_files(),
            vec![
                PathBuf::from("/srv/site/sitepack.json"),
                PathBuf::from("/srv/site/conf/prod.json")
            ]
        );
        assert_eq!(
            settings.protected_paths(),
            vec![".env", "sitepack.json", "conf/prod.json"]
        );

        settings.config_path = Some(PathBuf::from("/etc/sitepack.json"));
        assert_eq!(settings.protected_paths(), vec![".env", "sitepack.json"]);
    }

    #[test]
    fn test_explicit_config_missing_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut overrides = overrides_for(temp_dir.path());
        overrides.config = Some(temp_dir.path().join("nope.json"));

        let err = Settings::resolve_with(&overrides, no_env, None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unparsable_config_is_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("sitepack.json"), "{oops").unwrap();

        let err = Settings::resolve_with(&overrides_for(temp_dir.path()), no_env, None)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_max_jobs_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("sitepack.json"), r#"{"max_jobs": 0}"#).unwrap();

        let err = Settings::resolve_with(&overrides_for(temp_dir.path()), no_env, None)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
