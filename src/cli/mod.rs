//! CLI definitions using clap.

use crate::tasks::TaskName;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// sitepack - Move a site (SQLite database + files) between hosts
#[derive(Parser, Debug)]
#[command(name = "sitepack", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Site root directory (default: current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Site database path (default: <root>/site.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Work directory for packages, jobs and staging (default: <root>/.sitepack)
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    /// Config file (default: <root>/sitepack.json, then ~/.sitepack/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Package the site into a zip archive
    Export {
        /// Also copy the package here (file or directory)
        #[arg(long, short = 'o')]
        destination: Option<PathBuf>,
    },

    /// Restore a package onto this site (overwrites the database and files)
    Import {
        /// Package to import
        package: PathBuf,
    },

    /// Background job management
    Jobs {
        #[command(subcommand)]
        command: JobsCommands,
    },

    /// Deferred task runner
    Tasks {
        #[command(subcommand)]
        command: TasksCommands,
    },

    /// Show recent activity
    Log,

    /// Show resolved settings
    Config,

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Subcommand, Debug)]
pub enum JobsCommands {
    /// List jobs, newest first
    List {
        /// Maximum jobs to show
        #[arg(long, short = 'n', default_value_t = 10)]
        limit: usize,
    },

    /// Show one job with its log
    Show {
        /// Job ID
        id: String,
    },

    /// Queue an export job
    StartExport,

    /// Queue an import job for a package
    StartImport {
        /// Package to import
        package: PathBuf,
    },

    /// Fetch the package of a finished export job
    Download {
        /// Job ID
        id: String,

        /// Download token issued with the job
        #[arg(long)]
        token: String,

        /// Copy the package here (default: print its path)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TasksCommands {
    /// Run one task for a job immediately
    Run {
        /// Task name
        #[arg(value_enum)]
        task: TaskName,

        /// Job ID
        job_id: String,
    },

    /// Drain the task queue
    Work,

    /// List queued tasks
    List,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sitepack", "jobs", "list", "--root", "/srv/site", "--json", "-vv",
        ])
        .unwrap();

        assert_eq!(cli.root, Some(PathBuf::from("/srv/site")));
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Jobs {
                command: JobsCommands::List { limit: 10 }
            }
        ));
    }

    #[test]
    fn test_task_wire_names() {
        let cli = Cli::try_parse_from(["sitepack", "tasks", "run", "run_import_job", "abc"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Tasks {
                command: TasksCommands::Run {
                    task: TaskName::RunImportJob,
                    ..
                }
            }
        ));
    }
}
