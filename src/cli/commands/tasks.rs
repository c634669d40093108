//! Task runner command implementations.

use super::Runtime;
use crate::cli::TasksCommands;
use crate::error::Result;
use crate::tasks::TaskName;
use serde::Serialize;

#[derive(Serialize)]
struct TaskRunOutput<'a> {
    task: TaskName,
    job_id: &'a str,
    /// Final status, or null when the task had nothing to do.
    status: Option<String>,
    message: Option<String>,
}

/// Execute task commands.
///
/// # Errors
///
/// Returns an error if the queue or ledger cannot be read or written, or the
/// job is unknown.
pub fn execute(command: &TasksCommands, runtime: &Runtime, json: bool) -> Result<()> {
    match command {
        TasksCommands::Run { task, job_id } => {
            let finished = runtime.migrator.run_task(*task, job_id)?;

            if json {
                let output = TaskRunOutput {
                    task: *task,
                    job_id,
                    status: finished.as_ref().map(|j| j.status.to_string()),
                    message: finished.map(|j| j.message),
                };
                println!("{}", serde_json::to_string(&output)?);
            } else {
                match finished {
                    Some(job) => println!("{task} {job_id}: {} ({})", job.status, job.message),
                    None => println!("{task} {job_id}: nothing to do"),
                }
            }
        }
        TasksCommands::Work => {
            let stats = runtime.queue.drain(&runtime.migrator)?;

            if json {
                println!("{}", serde_json::to_string(&stats)?);
            } else {
                println!(
                    "Drained queue: {} completed, {} failed, {} dropped",
                    stats.completed, stats.failed, stats.dropped
                );
            }
        }
        TasksCommands::List => {
            let pending = runtime.queue.pending()?;

            if json {
                println!("{}", serde_json::to_string(&pending)?);
            } else if pending.is_empty() {
                println!("Queue is empty.");
            } else {
                for task in &pending {
                    println!(
                        "{}  {}  enqueued {}  attempts {}",
                        task.task,
                        task.job_id,
                        task.enqueued_at.to_rfc3339(),
                        task.attempts
                    );
                }
            }
        }
    }
    Ok(())
}
