// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "safeship")]
#[command(about = "Test-gated releases with snapshot rollback, firewall reconciliation and exposure audits")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (default: discovered in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter safeship.yml
    Init {
        /// Supervisor unit name
        #[arg(short, long)]
        service: Option<String>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Release a tagged revision: test, snapshot, update, restart, verify
    Release {
        /// Version tag, e.g. v1.4.2
        tag: String,

        /// Break a release lock held by another run
        #[arg(long)]
        force: bool,
    },

    /// Restore the most recent snapshot and restart the service
    Rollback {
        /// Break a release lock held by another run
        #[arg(long)]
        force: bool,
    },

    /// List retained snapshots, newest first
    Snapshots,

    /// Show the current revision, service state and recent releases
    Status {
        /// Number of history entries to show
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,
    },

    /// Reconcile the firewall rules for the configured port
    Firewall {
        /// Proceed even if this session's address is not allow-listed
        #[arg(short, long)]
        yes: bool,

        /// Break a firewall lock held by another run
        #[arg(long)]
        force: bool,
    },

    /// Probe the configured host and report unexpected exposure
    Audit {
        /// Override audit.host
        #[arg(long)]
        host: Option<String>,
    },
}
