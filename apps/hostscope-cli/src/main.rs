//! hostscope: print a best-effort snapshot of this machine.
//!
//! ```bash
//! hostscope system
//! hostscope system -o json --no-gpu
//! hostscope --config hostscope.yaml --print-config
//! ```

// CLI tools are expected to print to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod config;
mod logging;
mod system;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "hostscope")]
#[command(version, about = "Best-effort hardware and OS snapshot", long_about = None)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long, global = true)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    System(system::SystemArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Default: `system` with text output
    let Commands::System(args) = cli
        .command
        .unwrap_or_else(|| Commands::System(system::SystemArgs::default()));

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(&args.overrides(cli.verbose));
    config.collector.validate()?;

    logging::init_logging(&config.logging);

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling collection");
            on_ctrl_c.cancel();
        }
    });

    tracing::debug!(collector = ?config.collector, "collecting system snapshot");
    args.run(&config, &cancel).await
}
