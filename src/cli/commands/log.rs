//! Activity log command implementation.

use super::Runtime;
use crate::activity::ActivityLevel;
use crate::error::Result;
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct LogOutput<'a> {
    entries: &'a [crate::activity::ActivityEntry],
    count: usize,
}

/// Print the most recent activity, newest first.
///
/// # Errors
///
/// Returns an error if the activity log cannot be read.
pub fn execute(runtime: &Runtime, json: bool) -> Result<()> {
    let entries = runtime.migrator.activity().latest()?;

    if json {
        let output = LogOutput {
            entries: &entries,
            count: entries.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No activity yet.");
        return Ok(());
    }

    for entry in &entries {
        let level = match entry.level {
            ActivityLevel::Info => "info ".cyan(),
            ActivityLevel::Error => "error".red().bold(),
        };
        println!(
            "{} {level} {}",
            entry.time.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            entry.message
        );
    }
    Ok(())
}
