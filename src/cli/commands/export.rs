//! Export command implementation.

use super::{Runtime, copy_package};
use crate::error::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use tracing::warn;

/// Output for export.
#[derive(Serialize)]
struct ExportOutput {
    path: String,
    filename: String,
    filesize: u64,
    sha256: String,
    tables: usize,
    rows: u64,
    files: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped_tables: Vec<String>,
}

/// Execute the export command.
///
/// The package always lands in the work directory. With `destination`, it is
/// also copied there; a failed copy is a warning and the work-directory path
/// is reported instead.
///
/// # Errors
///
/// Returns an error if the export fails.
pub fn execute(runtime: &Runtime, destination: Option<&Path>, quiet: bool, json: bool) -> Result<()> {
    let report = runtime.migrator.export()?;

    let path = match destination {
        Some(destination) => match copy_package(&report.archive, destination) {
            Ok(copied) => copied,
            Err(e) => {
                warn!(destination = %destination.display(), error = %e, "Could not copy package");
                if !json && !quiet {
                    eprintln!(
                        "{} could not copy package to {}: {e}",
                        "Warning:".yellow().bold(),
                        destination.display()
                    );
                }
                report.archive.clone()
            }
        },
        None => report.archive.clone(),
    };

    if json {
        let output = ExportOutput {
            path: path.to_string_lossy().into_owned(),
            filename: report.filename.clone(),
            filesize: report.filesize,
            sha256: report.sha256.clone(),
            tables: report.database.tables,
            rows: report.database.rows,
            files: report.files.files,
            skipped_tables: report.database.skipped_tables.clone(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if quiet {
        println!("{}", path.display());
        return Ok(());
    }

    println!("{} {}", "Exported".green().bold(), path.display());
    println!(
        "  {}",
        format!(
            "{} tables, {} rows, {} files, {} bytes",
            report.database.tables, report.database.rows, report.files.files, report.filesize
        )
        .dimmed()
    );
    println!("  {}", format!("sha256 {}", report.sha256).dimmed());
    for table in &report.database.skipped_tables {
        println!("  {} table {table} was skipped", "Warning:".yellow().bold());
    }
    Ok(())
}
