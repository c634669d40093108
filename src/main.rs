//! sitepack CLI entry point.

use clap::Parser;
use sitepack::cli::commands::{self, Runtime};
use sitepack::cli::{Cli, Commands};
use sitepack::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    // Run the command and handle errors
    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if let Some(hint) = e.hint() {
                eprintln!("Error: {e}\n  Hint: {hint}");
            } else {
                eprintln!("Error: {e}");
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    // Commands that never touch a site
    match &cli.command {
        Commands::Version => return commands::version::execute(json),
        Commands::Completions { shell } => return commands::completions::execute(shell),
        _ => {}
    }

    let runtime = Runtime::from_cli(cli)?;

    match &cli.command {
        Commands::Export { destination } => {
            commands::export::execute(&runtime, destination.as_deref(), cli.quiet, json)
        }
        Commands::Import { package } => commands::import::execute(&runtime, package, json),
        Commands::Jobs { command } => commands::jobs::execute(command, &runtime, json),
        Commands::Tasks { command } => commands::tasks::execute(command, &runtime, json),
        Commands::Log => commands::log::execute(&runtime, json),
        Commands::Config => commands::config::execute(&runtime, json),
        Commands::Version | Commands::Completions { .. } => Ok(()),
    }
}
