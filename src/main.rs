//! refwatch CLI
//!
//! Exit status: 0 when nothing changed, 3 when references were added,
//! removed or changed remotely, 1 on error.

use anyhow::Result;
use clap::{Parser, Subcommand};
use refwatch::config::DEFAULT_CONFIG_FILE;
use refwatch::init::{run_init, InitArgs};
use refwatch::run::{run_check, run_scan, CheckArgs, ScanArgs, CHANGES_DETECTED};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "refwatch")]
#[command(version)]
#[command(about = "Watch issues, pull requests and Q&A posts referenced from source code")]
#[command(long_about = "Finds GitHub issue/PR and StackExchange links in source files and reports when they change.\n\nCommands:\n  check   Reconcile with source and query remotes\n  scan    Reconcile with source only\n  init    Write a configuration template")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Update the status file from source and check every reference remotely
    Check(CheckArgs),
    /// Update the status file from source without network access
    Scan(ScanArgs),
    /// Create a refwatch.yaml template
    Init(InitArgs),
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("refwatch=debug,warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("refwatch=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let summary = match cli.command {
        Commands::Check(args) => run_check(&cli.config, args).await?,
        Commands::Scan(args) => run_scan(&cli.config, args).await?,
        Commands::Init(args) => {
            run_init(&cli.config, args).await?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    // Output compact JSON to stdout
    println!("{}", serde_json::to_string(&summary)?);

    if summary.changed() {
        Ok(ExitCode::from(CHANGES_DETECTED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
