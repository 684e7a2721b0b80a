// ABOUTME: Entry point for the safeship CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use safeship::audit::AUDIT_FAILED_EXIT;
use safeship::config::{self, Config};
use safeship::error::Result;
use safeship::output::{Output, OutputMode};
use std::env;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = OutputMode::from_flags(cli.quiet, cli.json);
    // Audit exit codes 1..=254 are issue counts.
    let failure = match cli.command {
        Commands::Audit { .. } => ExitCode::from(AUDIT_FAILED_EXIT),
        _ => ExitCode::FAILURE,
    };

    match run(cli, mode).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let output = Output::new(mode);
            output.error(&e.to_string());
            if let Some(hint) = e.recovery_hint() {
                output.hint(&hint);
            }
            failure
        }
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<u8> {
    let output = Output::new(mode);
    let cwd = env::current_dir()?;
    let load = || match &cli.config {
        Some(path) => Config::load(path),
        None => Config::discover(&cwd),
    };

    match cli.command {
        Commands::Init { ref service, force } => {
            config::init_config(&cwd, service.as_deref(), force)?;
            output.success(&format!("Wrote {}", config::CONFIG_FILENAME));
        }
        Commands::Release { ref tag, force } => {
            commands::release(load()?, tag, force, output).await?;
        }
        Commands::Rollback { force } => commands::rollback(load()?, force, output).await?,
        Commands::Snapshots => commands::snapshots(load()?, output).await?,
        Commands::Status { limit } => commands::status(load()?, limit, output).await?,
        Commands::Firewall { yes, force } => {
            commands::firewall(load()?, yes, force, output).await?;
        }
        Commands::Audit { ref host } => {
            return commands::audit(load()?, host.clone(), output).await;
        }
    }
    Ok(0)
}
