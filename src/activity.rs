//! Recent activity log.
//!
//! A short, persisted list of operator-facing messages ("Preparing export",
//! "Import complete") shown by `sitepack log`. Separate from tracing output:
//! this survives the process and is meant for people, not for debugging.

use crate::error::Result;
use crate::file::{read_json_or_default, write_json};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Number of entries shown by [`ActivityLog::latest`].
pub const MAX_SHOWN: usize = 20;

/// Number of entries kept on disk.
pub const MAX_RETAINED: usize = MAX_SHOWN * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub level: ActivityLevel,
    pub message: String,
    pub time: DateTime<Utc>,
}

/// Bounded activity log stored as a JSON array, oldest first.
#[derive(Debug)]
pub struct ActivityLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ActivityLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, message: &str) {
        self.add(ActivityLevel::Info, message);
    }

    pub fn error(&self, message: &str) {
        self.add(ActivityLevel::Error, message);
    }

    /// Newest entries first, at most [`MAX_SHOWN`].
    ///
    /// # Errors
    ///
    /// Returns an error if the log file exists but cannot be read.
    pub fn latest(&self) -> Result<Vec<ActivityEntry>> {
        let entries: Vec<ActivityEntry> = read_json_or_default(&self.path)?;
        Ok(entries.into_iter().rev().take(MAX_SHOWN).collect())
    }

    // Activity is best effort: a failed write must never fail the operation
    // being described.
    fn add(&self, level: ActivityLevel, message: &str) {
        let _guard = self.lock.lock();

        let mut entries: Vec<ActivityEntry> = match read_json_or_default(&self.path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Resetting unreadable activity log");
                Vec::new()
            }
        };

        entries.push(ActivityEntry {
            level,
            message: message.to_string(),
            time: Utc::now(),
        });

        if entries.len() > MAX_RETAINED {
            entries.drain(..entries.len() - MAX_RETAINED);
        }

        if let Err(e) = write_json(&self.path, &entries) {
            warn!(path = %self.path.display(), error = %e, "Failed to write activity log");
        }
    }
}
