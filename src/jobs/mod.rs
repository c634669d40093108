//! Job ledger.
//!
//! Tracks the status, progress and result of each export or import run in a
//! small bounded collection that outlives the process that started the run.
//!
//! # Submodules
//!
//! - [`types`] - Job records
//! - [`store`] - Where the collection is kept
//! - [`ledger`] - State machine and retention

pub mod ledger;
pub mod store;
pub mod types;

pub use ledger::{JobLedger, TOKEN_LENGTH};
pub use store::{FileJobStore, JobStore, MemoryJobStore};
pub use types::{ExportResult, Job, JobStatus, JobType, LogEntry};
