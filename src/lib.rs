//! sitepack - portable site state packages
//!
//! This crate provides the core functionality for the `sitepack` CLI tool:
//! packaging a site's SQLite database and file tree into one zip archive,
//! and restoring such an archive onto another host.
//!
//! # Architecture
//!
//! - [`archive`] - Package container format (manifest + SQL dump + file tree)
//! - [`storage`] - SQLite dump/restore engine
//! - [`snapshot`] - Filesystem walking and tree restore
//! - [`jobs`] - Persistent job ledger for long-running runs
//! - [`tasks`] - File-backed task queue and worker
//! - [`migrate`] - Export/import orchestration
//! - [`activity`] - Recent operator-facing activity log
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Settings resolution
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod activity;
pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod file;
pub mod jobs;
pub mod migrate;
pub mod snapshot;
pub mod storage;
pub mod tasks;

pub use error::{Error, Result};
