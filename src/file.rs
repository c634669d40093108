//! Atomic file operations for the work directory.
//!
//! The job ledger, task queue and activity log are small JSON documents that
//! are rewritten whole on every change. Writes go through [`atomic_write`] so a
//! crash mid-write never leaves a truncated document behind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Write content to a file atomically.
///
/// This function:
/// 1. Writes content to a temporary file next to the target
/// 2. Calls `fsync` to ensure data is on disk
/// 3. Atomically renames the temp file to the target path
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = temp_path_for(path);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &content)
}

/// Read a JSON document, returning `T::default()` when the file is absent
/// or empty.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }

    let content = fs::read(path)?;
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    Ok(serde_json::from_slice(&content)?)
}

/// Get the size of a file in bytes.
///
/// # Errors
///
/// Returns an error if the file metadata cannot be read.
pub fn file_size(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path)?.len())
}

// Unique per writer so concurrent processes never rename each other's file.
fn temp_path_for(path: &Path) -> PathBuf {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(format!(".{}.{suffix}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Contents of a lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    created_at: DateTime<Utc>,
}

/// Exclusive lock held by creating a file with `create_new`.
///
/// The file records the holder's pid. A lock whose holder is gone, or which
/// is older than the caller's `stale_after`, is taken over. The file is
/// removed on drop.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Take the lock if nobody else holds it.
    ///
    /// Returns `Ok(None)` when a live holder has it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created or inspected.
    pub fn try_acquire(path: &Path, stale_after: Duration) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Two passes: the second follows removal of a stale lock.
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let info = LockInfo {
                        pid: std::process::id(),
                        created_at: Utc::now(),
                    };
                    file.write_all(&serde_json::to_vec(&info)?)?;
                    file.sync_all()?;
                    return Ok(Some(Self {
                        path: path.to_path_buf(),
                    }));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if !is_stale(path, stale_after) {
                        return Ok(None);
                    }
                    warn!(path = %path.display(), "Removing stale lock");
                    match fs::remove_file(path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Take the lock, retrying until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is still held after `timeout`.
    pub fn acquire(path: &Path, stale_after: Duration, timeout: Duration) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(lock) = Self::try_acquire(path, stale_after)? {
                return Ok(lock);
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    format!("lock {} is held by another process", path.display()),
                )
                .into());
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "Could not remove lock file");
        }
    }
}

// A lock that cannot be read is still being written by its creator unless it
// has outlived `stale_after`.
fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let info = fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<LockInfo>(&bytes).ok());

    match info {
        Some(info) => {
            if !pid_is_alive(info.pid) {
                return true;
            }
            let age = Utc::now().signed_duration_since(info.created_at);
            age.to_std().is_ok_and(|age| age > stale_after)
        }
        None => fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > stale_after),
    }
}

#[cfg(target_os = "linux")]
fn pid_is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn pid_is_alive(_pid: u32) -> bool {
    true
}
