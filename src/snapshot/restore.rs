//! Copying an extracted file tree onto the target root.

use super::relative_slash_path;
use crate::error::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Statistics from a tree restore.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreTreeStats {
    /// Files copied.
    pub files: usize,
    /// Directories visited (created when absent).
    pub directories: usize,
    /// Entries skipped because they are protected.
    pub skipped: usize,
}

/// Copy every entry under `source` onto `target`, parents first.
///
/// Entries whose root-relative path equals one of `protected` are never
/// written. Existing files are overwritten. The first failure stops the walk; files
/// copied before it stay in place.
///
/// # Errors
///
/// Returns `Error::FileCopy` naming the relative path that could not be
/// created or copied.
pub fn restore_tree(
    source: &Path,
    target: &Path,
    protected: &[impl AsRef<str>],
) -> Result<RestoreTreeStats> {
    let protected: Vec<String> = protected
        .iter()
        .map(|p| normalize_relative(p.as_ref()))
        .filter(|p| !p.is_empty())
        .collect();
    let mut stats = RestoreTreeStats::default();

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::FileCopy {
            path: e
                .path()
                .and_then(|p| p.strip_prefix(source).ok())
                .map(relative_slash_path)
                .unwrap_or_default(),
            message: e.to_string(),
        })?;

        let relative_path = entry.path().strip_prefix(source).map_err(|e| Error::FileCopy {
            path: entry.path().display().to_string(),
            message: e.to_string(),
        })?;
        let relative = relative_slash_path(relative_path);

        if protected.contains(&relative) {
            info!(path = %relative, "Keeping protected file on target");
            stats.skipped += 1;
            continue;
        }

        let destination = target.join(relative_path);
        let copy_err = |e: std::io::Error| Error::FileCopy {
            path: relative.clone(),
            message: e.to_string(),
        };

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination).map_err(copy_err)?;
            stats.directories += 1;
        } else if entry.file_type().is_file() {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(copy_err)?;
            }
            fs::copy(entry.path(), &destination).map_err(copy_err)?;
            stats.files += 1;
        } else {
            debug!(path = %relative, "Skipping non-regular entry");
        }
    }

    info!(
        files = stats.files,
        directories = stats.directories,
        skipped = stats.skipped,
        "File tree restored"
    );
    Ok(stats)
}

/// Remove a directory tree. Failures are logged, never raised.
pub fn purge_dir(dir: &Path) {
    if !dir.exists() {
        return;
    }
    match fs::remove_dir_all(dir) {
        Ok(()) => debug!(path = %dir.display(), "Purged directory"),
        Err(e) => warn!(path = %dir.display(), error = %e, "Failed to purge directory"),
    }
}

fn normalize_relative(path: &str) -> String {
    path.replace('\\', "/")
        .trim_start_matches("./")
        .trim_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_restore_creates_and_overwrites() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write(source.path(), "index.php", "new");
        write(source.path(), "uploads/2024/a.png", "png");
        fs::create_dir_all(source.path().join("cache")).unwrap();
        write(target.path(), "index.php", "old");

        let stats = restore_tree(source.path(), target.path(), &[".env"]).unwrap();

        assert_eq!(fs::read_to_string(target.path().join("index.php")).unwrap(), "new");
        assert_eq!(
            fs::read_to_string(target.path().join("uploads/2024/a.png")).unwrap(),
            "png"
        );
        assert!(target.path().join("cache").is_dir());
        assert_eq!(stats.files, 2);
        assert_eq!(stats.directories, 3);
        assert_eq!(stats.skipped, 0);
    }

    #[test]
    fn test_protected_file_is_never_overwritten() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write(source.path(), ".env", "SOURCE_SECRET=1");
        write(source.path(), "config/.env", "nested copy is not protected");
        write(target.path(), ".env", "TARGET_SECRET=1");

        let stats = restore_tree(source.path(), target.path(), &[".env"]).unwrap();

        assert_eq!(
            fs::read_to_string(target.path().join(".env")).unwrap(),
            "TARGET_SECRET=1"
        );
        assert!(target.path().join("config/.env").exists());
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_protected_path_is_normalized() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write(source.path(), "conf/secrets.toml", "source");

        let stats = restore_tree(source.path(), target.path(), &["./conf/secrets.toml"]).unwrap();

        assert!(!target.path().join("conf/secrets.toml").exists());
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_every_protected_path_is_kept() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write(source.path(), ".env", "SOURCE_SECRET=1");
        write(source.path(), "sitepack.json", r#"{"db":"source.db"}"#);
        write(source.path(), "index.html", "new");
        write(target.path(), "sitepack.json", r#"{"db":"target.db"}"#);

        let stats =
            restore_tree(source.path(), target.path(), &[".env", "sitepack.json"]).unwrap();

        assert!(!target.path().join(".env").exists());
        assert_eq!(
            fs::read_to_string(target.path().join("sitepack.json")).unwrap(),
            r#"{"db":"target.db"}"#
        );
        assert_eq!(stats.files, 1);
        assert_eq!(stats.skipped, 2);
    }

    #[test]
    fn test_first_copy_failure_names_relative_path() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write(source.path(), "a/blocked.txt", "x");
        write(source.path(), "z.txt", "never reached");
        // A directory where the file should go makes the copy fail.
        fs::create_dir_all(target.path().join("a/blocked.txt")).unwrap();

        let err = restore_tree(source.path(), target.path(), &[".env"]).unwrap_err();

        match err {
            Error::FileCopy { path, .. } => assert_eq!(path, "a/blocked.txt"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!target.path().join("z.txt").exists());
    }

    #[test]
    fn test_purge_dir_removes_tree_and_ignores_missing() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("import-abc");
        write(&dir, "files/x", "x");

        purge_dir(&dir);
        assert!(!dir.exists());

        purge_dir(&dir);
    }
}
