//! Tallysync CLI - Diagnostic interface to the conflict engine
//!
//! Provides commands for:
//! - Listing and inspecting outstanding conflicts
//! - Resolving conflicts one at a time, in bulk or automatically
//! - Importing raw conflicts captured from a transport
//! - Viewing resolution statistics
//! - Exporting engine state and pruning old history

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tallysync_core::config::Config;

mod commands;
mod output;

use commands::{
    conflicts::ConflictsCommand, export::ExportCommand, prune::PruneCommand,
    stats::StatsCommand, AppContext,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "tallysync", version, about = "Offline-first sync conflict engine")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use alternate database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Inspect and resolve sync conflicts
    #[command(subcommand)]
    Conflicts(ConflictsCommand),
    /// Show resolution statistics
    Stats(StatsCommand),
    /// Export a diagnostic snapshot as JSON
    Export(ExportCommand),
    /// Delete old resolution history
    Prune(PruneCommand),
}

/// Reads the config file; an explicit `--config` must exist and parse
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path()),
    };
    if let Some(database) = &cli.database {
        config.storage.database_path = database.clone();
    }
    Ok(config)
}

fn log_filter(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from_flag(cli.json);
    let config = load_config(&cli)?;

    // Setup tracing
    let filter = log_filter(cli.verbose, &config.logging.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let problems = config.validate();
    if !problems.is_empty() {
        let formatter = get_formatter(format);
        for problem in &problems {
            formatter.error(&problem.to_string());
        }
        anyhow::bail!("Invalid configuration ({} problems)", problems.len());
    }

    let ctx = AppContext::new(config, format);
    match cli.command {
        Commands::Conflicts(cmd) => cmd.execute(&ctx).await,
        Commands::Stats(cmd) => cmd.execute(&ctx).await,
        Commands::Export(cmd) => cmd.execute(&ctx).await,
        Commands::Prune(cmd) => cmd.execute(&ctx).await,
    }
}
