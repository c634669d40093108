//! Job command implementations.

use super::{Runtime, copy_package};
use crate::cli::JobsCommands;
use crate::error::{Error, Result};
use crate::jobs::{Job, JobStatus};
use crate::migrate::Upload;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use std::path::Path;

/// Job as shown in listings (no token).
#[derive(Serialize)]
struct JobSummary<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    job_type: String,
    status: String,
    progress: u8,
    message: &'a str,
    created_at: String,
    updated_at: String,
}

impl<'a> From<&'a Job> for JobSummary<'a> {
    fn from(job: &'a Job) -> Self {
        Self {
            id: &job.id,
            job_type: job.job_type.to_string(),
            status: job.status.to_string(),
            progress: job.progress,
            message: &job.message,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct JobListOutput<'a> {
    jobs: Vec<JobSummary<'a>>,
    count: usize,
}

/// Output for start-export / start-import.
#[derive(Serialize)]
struct JobStartOutput<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    job_type: String,
    status: String,
    token: &'a str,
}

#[derive(Serialize)]
struct DownloadOutput {
    path: String,
    filename: String,
    size: u64,
}

/// Execute job commands.
///
/// # Errors
///
/// Returns an error if the ledger cannot be read, the job is unknown, or the
/// requested operation fails.
pub fn execute(command: &JobsCommands, runtime: &Runtime, json: bool) -> Result<()> {
    match command {
        JobsCommands::List { limit } => list(runtime, *limit, json),
        JobsCommands::Show { id } => show(runtime, id, json),
        JobsCommands::StartExport => {
            let job = runtime.migrator.start_export()?;
            print_started(&job, json)
        }
        JobsCommands::StartImport { package } => {
            let upload = Upload::from_path(package)?;
            let job = runtime.migrator.start_import(&upload)?;
            print_started(&job, json)
        }
        JobsCommands::Download { id, token, output } => {
            download(runtime, id, token, output.as_deref(), json)
        }
    }
}

fn list(runtime: &Runtime, limit: usize, json: bool) -> Result<()> {
    let jobs = runtime.migrator.ledger().list(limit)?;

    if json {
        let output = JobListOutput {
            count: jobs.len(),
            jobs: jobs.iter().map(JobSummary::from).collect(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }

    for job in &jobs {
        println!(
            "{}  {:<6}  {:<8}  {:>3}%  {}",
            job.id.dimmed(),
            job.job_type.to_string(),
            status_label(job.status),
            job.progress,
            job.message
        );
    }
    Ok(())
}

fn show(runtime: &Runtime, id: &str, json: bool) -> Result<()> {
    let job = runtime
        .migrator
        .ledger()
        .get(id)?
        .ok_or_else(|| Error::JobNotFound { id: id.to_string() })?;

    if json {
        println!("{}", serde_json::to_string(&job)?);
        return Ok(());
    }

    println!("{} {}", "Job".bold(), job.id);
    println!("  Type:     {}", job.job_type);
    println!("  Status:   {} ({}%)", status_label(job.status), job.progress);
    println!("  Message:  {}", job.message);
    println!("  Created:  {}", job.created_at.to_rfc3339());
    println!("  Updated:  {}", job.updated_at.to_rfc3339());
    if let Some(result) = job.export_result() {
        println!("  Package:  {} ({} bytes)", result.file, result.filesize);
    }
    if !job.log.is_empty() {
        println!("{}", "Log".cyan().bold());
        for entry in &job.log {
            println!(
                "  {} {}",
                entry.time.format("%H:%M:%S").to_string().dimmed(),
                entry.message
            );
        }
    }
    Ok(())
}

fn print_started(job: &Job, json: bool) -> Result<()> {
    if json {
        let output = JobStartOutput {
            id: &job.id,
            job_type: job.job_type.to_string(),
            status: job.status.to_string(),
            token: &job.token,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{} {} job {}", "Queued".green().bold(), job.job_type, job.id);
    println!("  Token: {}", job.token);
    Ok(())
}

fn download(
    runtime: &Runtime,
    id: &str,
    token: &str,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let info = runtime.migrator.download(id, token)?;
    let path = match output {
        Some(output) => copy_package(&info.path, output)?,
        None => info.path,
    };

    if json {
        let output = DownloadOutput {
            path: path.to_string_lossy().into_owned(),
            filename: info.filename,
            size: info.size,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{}", path.display());
    }
    Ok(())
}

fn status_label(status: JobStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        JobStatus::Pending => label.normal(),
        JobStatus::Running => label.yellow(),
        JobStatus::Success => label.green(),
        JobStatus::Error => label.red(),
    }
}
