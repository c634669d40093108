//! SQLite connection handling.

use crate::error::{Error, Result};
use crate::storage::dump::{self, DumpStats};
use crate::storage::restore::{self, RestoreStats};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// A connection to the site database.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Open (or create) a database at the given path.
    ///
    /// Used on the import side, where the target database may not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    /// Open a database that must already exist.
    ///
    /// # Errors
    ///
    /// Returns `Error::DatabaseFile` if there is no file at `path`.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::DatabaseFile(format!(
                "database not found at {}",
                path.display()
            )));
        }
        Self::open(path)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection.
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Version of the linked SQLite library, recorded in package manifests.
    #[must_use]
    pub fn engine_version() -> &'static str {
        rusqlite::version()
    }

    /// Dump every table to `destination`.
    ///
    /// # Errors
    ///
    /// See [`dump::dump`].
    pub fn dump(&self, destination: &Path) -> Result<DumpStats> {
        dump::dump(&self.conn, destination)
    }

    /// Replay a statement stream from `source`.
    ///
    /// # Errors
    ///
    /// See [`restore::restore`].
    pub fn restore(&self, source: &Path) -> Result<RestoreStats> {
        restore::restore(&self.conn, source)
    }
}
