//! Import command implementation.

use super::Runtime;
use crate::error::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

/// Output for import.
#[derive(Serialize)]
struct ImportOutput<'a> {
    package: String,
    source_site: &'a str,
    exported_at: &'a str,
    statements: usize,
    failed_statements: usize,
    files: usize,
    skipped_files: usize,
    notes: &'a [String],
}

/// Execute the import command.
///
/// # Errors
///
/// Returns an error if the import fails.
pub fn execute(runtime: &Runtime, package: &Path, json: bool) -> Result<()> {
    let report = runtime.migrator.import(package)?;

    if json {
        let output = ImportOutput {
            package: package.to_string_lossy().into_owned(),
            source_site: &report.manifest.site_url,
            exported_at: &report.manifest.created_at,
            statements: report.database.executed,
            failed_statements: report.database.failed,
            files: report.files.files,
            skipped_files: report.files.skipped,
            notes: &report.notes,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{} {}", "Imported".green().bold(), package.display());
    if !report.manifest.site_url.is_empty() {
        println!("  Source: {}", report.manifest.site_url);
    }
    println!(
        "  {}",
        format!(
            "{} statements, {} files restored",
            report.database.executed, report.files.files
        )
        .dimmed()
    );
    if report.database.failed > 0 {
        println!(
            "  {} {} statements failed (run with -v for details)",
            "Warning:".yellow().bold(),
            report.database.failed
        );
    }
    for note in &report.notes {
        println!("  {} {note}", "Note:".cyan());
    }
    Ok(())
}
