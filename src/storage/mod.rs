//! SQLite dump and restore engine.
//!
//! This module turns a site's SQLite database into a portable SQL statement
//! stream and replays such a stream against a target database:
//! - Tables are dumped one by one, rows fetched in pages of [`PAGE_SIZE`]
//! - Restore streams the file line by line and never loads it whole
//! - Per-table and per-statement failures are logged and counted, not fatal
//!
//! # Submodules
//!
//! - [`sqlite`] - Connection handling
//! - [`dump`] - Statement stream writer
//! - [`restore`] - Statement stream replay

pub mod dump;
pub mod restore;
pub mod sqlite;

pub use dump::{DumpStats, PAGE_SIZE};
pub use restore::RestoreStats;
pub use sqlite::SqliteStorage;
