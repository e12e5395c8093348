//! Runtime Warden CLI
//!
//! Command-line tool for querying limits and runtimes, generating
//! reports, and controlling the warden daemon.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{control, limits, report, runtimes};

/// Runtime Warden CLI
#[derive(Parser)]
#[command(name = "wardenctl")]
#[command(author, version, about = "CLI for the Runtime Warden daemon", long_about = None)]
pub struct Cli {
    /// Daemon API URL (can also be set via WARDEN_API_URL env var)
    #[arg(long, env = "WARDEN_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the thresholds in effect for an owner
    Limits {
        /// Owner id to inspect
        owner: u64,
    },

    /// Show per-unit runtimes for an owner
    Runtimes {
        /// Owner id to inspect
        owner: u64,
    },

    /// Generate the full report
    Report {
        /// Also collect snapshots from cluster peers
        #[arg(long)]
        cluster: bool,

        /// Restrict to one owner's self-report
        #[arg(long)]
        owner: Option<u64>,
    },

    /// Show daemon status
    Status,

    /// Enable enforcement
    Enable,

    /// Disable enforcement
    Disable,

    /// Push settings or overrides to cluster peers
    #[command(subcommand)]
    Push(PushCommands),
}

#[derive(Subcommand)]
pub enum PushCommands {
    /// Push this node's settings to all peers
    Settings,

    /// Push one owner's privileged override to all peers
    Override {
        /// Owner id whose override should be pushed
        owner: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Limits { owner } => {
            limits::show_limits(&client, owner, cli.format).await?;
        }
        Commands::Runtimes { owner } => {
            runtimes::show_runtimes(&client, owner, cli.format).await?;
        }
        Commands::Report { cluster, owner } => match owner {
            Some(owner) => report::owner_report(&client, owner).await?,
            None => report::generate_report(&client, cluster).await?,
        },
        Commands::Status => {
            control::show_status(&client, cli.format).await?;
        }
        Commands::Enable => {
            control::set_enabled(&client, true).await?;
        }
        Commands::Disable => {
            control::set_enabled(&client, false).await?;
        }
        Commands::Push(push_cmd) => match push_cmd {
            PushCommands::Settings => control::push_settings(&client).await?,
            PushCommands::Override { owner } => control::push_override(&client, owner).await?,
        },
    }

    Ok(())
}
