//! Filesystem snapshot engine.
//!
//! The export side walks the site root and yields every regular file that is
//! not excluded ([`walk_files`]); the archive writer streams those into the
//! package. The import side copies an extracted `files/` tree back onto the
//! target root ([`restore_tree`]).
//!
//! Excluded from every walk:
//! - sitepack's own working directory
//! - version-control metadata (`.git`, `.svn`, `.hg`)
//! - the live database file and its `-wal` / `-shm` / `-journal` sidecars

mod restore;

pub use restore::{RestoreTreeStats, purge_dir, restore_tree};

use std::path::{Component, Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Version-control metadata directories never packaged.
pub const VCS_DIRS: &[&str] = &[".git", ".svn", ".hg"];

/// Sidecar suffixes SQLite may create next to a database file.
const DATABASE_SIDECARS: &[&str] = &["-wal", "-shm", "-journal"];

/// Paths excluded from a snapshot walk.
///
/// Paths are normalized (canonicalized where they exist) when added, so the
/// prefix checks in [`walk_files`] compare like with like.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
}

impl Exclusions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude a directory and everything below it.
    #[must_use]
    pub fn dir(mut self, path: &Path) -> Self {
        self.dirs.push(normalize(path));
        self
    }

    /// Exclude a single file.
    #[must_use]
    pub fn file(mut self, path: &Path) -> Self {
        self.files.push(normalize(path));
        self
    }

    /// Exclude a SQLite database file and its sidecars.
    #[must_use]
    pub fn database(mut self, db_path: &Path) -> Self {
        let db = normalize(db_path);
        for suffix in DATABASE_SIDECARS {
            let mut name = db.as_os_str().to_os_string();
            name.push(suffix);
            self.files.push(PathBuf::from(name));
        }
        self.files.push(db);
        self
    }

    fn prunes_dir(&self, path: &Path) -> bool {
        let is_vcs = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| VCS_DIRS.contains(&n));
        is_vcs || self.dirs.iter().any(|d| path.starts_with(d))
    }

    fn excludes_file(&self, path: &Path) -> bool {
        self.files.iter().any(|f| f == path) || self.dirs.iter().any(|d| path.starts_with(d))
    }
}

/// A regular file found by [`walk_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    /// Absolute (canonical-rooted) path on disk.
    pub path: PathBuf,
    /// Root-relative path with `/` separators.
    pub relative: String,
}

/// Walk `root` and yield every regular file not covered by `exclusions`.
///
/// Symlinks are not followed and not yielded. Entries that cannot be read
/// (permission errors, files vanishing mid-walk) are logged and skipped.
pub fn walk_files<'a>(
    root: &Path,
    exclusions: &'a Exclusions,
) -> impl Iterator<Item = SnapshotFile> + 'a {
    let root = normalize(root);

    WalkDir::new(root.clone())
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| {
            entry.depth() == 0 || !entry.file_type().is_dir() || !exclusions.prunes_dir(entry.path())
        })
        .filter_map(log_and_skip_walkdir_err)
        .filter(|entry| entry.file_type().is_file())
        .filter(move |entry| !exclusions.excludes_file(entry.path()))
        .filter_map(move |entry| {
            let relative = relative_slash_path(entry.path().strip_prefix(&root).ok()?);
            Some(SnapshotFile {
                path: entry.into_path(),
                relative,
            })
        })
}

/// Log WalkDir errors instead of silently discarding them.
fn log_and_skip_walkdir_err(
    result: std::result::Result<walkdir::DirEntry, walkdir::Error>,
) -> Option<walkdir::DirEntry> {
    match result {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(error = %e, "Skipping unreadable entry during walk");
            None
        }
    }
}

/// Join path components with `/`, whatever the host separator.
#[must_use]
pub fn relative_slash_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Canonicalize a path, falling back to its canonical parent when the path
/// itself does not exist yet.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if let Ok(parent) = parent.canonicalize() {
            return parent.join(name);
        }
    }
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
