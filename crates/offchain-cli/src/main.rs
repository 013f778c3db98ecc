//! Command-line tooling for the off-chain protocol
//!
//! - `offchain demo`: two VASPs in one process exchanging payments
//! - `offchain inspect`: read-only view of a file store

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{
    demo::{self, DemoCommand},
    inspect::{self, InspectCommand},
};

#[derive(Parser)]
#[command(name = "offchain")]
#[command(about = "Off-chain VASP protocol tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured store directory
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run two local VASPs and exchange payments between them
    Demo(DemoCommand),
    /// Summarize the channel journals of a store directory
    Inspect(InspectCommand),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.store_dir {
        config.store_dir = dir;
    }

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.log_level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match cli.command {
        Commands::Demo(cmd) => demo::run(cmd, &config).await?,
        Commands::Inspect(cmd) => inspect::run(&cmd, &config)?,
    }

    Ok(())
}
