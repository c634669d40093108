//! Config command implementation.

use super::Runtime;
use crate::error::Result;

/// Print the resolved settings.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(runtime: &Runtime, json: bool) -> Result<()> {
    let settings = runtime.migrator.settings();

    if json {
        println!("{}", serde_json::to_string(settings)?);
        return Ok(());
    }

    println!("root:           {}", settings.root.display());
    println!("database:       {}", settings.db_path.display());
    println!("work dir:       {}", settings.work_dir.display());
    println!("site url:       {}", settings.site_url);
    println!("home url:       {}", settings.home_url);
    println!("table prefix:   {}", settings.table_prefix);
    println!("protected file: {}", settings.protected_file);
    println!("max jobs:       {}", settings.max_jobs);
    match &settings.config_path {
        Some(path) => println!("config file:    {}", path.display()),
        None => println!("config file:    (none)"),
    }
    Ok(())
}
