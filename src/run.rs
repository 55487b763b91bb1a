//! check / scan commands
//!
//! 1. load the status file and the references found in source
//! 2. reconcile the two sets
//! 3. (check only) refresh every reference against its remote
//! 4. write the status file back, unless a step failed or `--dry-run`

use crate::batch::Coordinator;
use crate::check::{check_all, Remotes};
use crate::config::Config;
use crate::github::GithubProcessor;
use crate::reconcile::reconcile;
use crate::registry::Registry;
use crate::scan::scan_sources;
use crate::stackexchange::StackExchangeProcessor;
use crate::status::StatusFile;
use crate::transport::Transport;
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Exit status when references were added, removed or changed remotely
pub const CHANGES_DETECTED: u8 = 3;

#[derive(Args)]
pub struct CheckArgs {
    /// Don't write changes back to the status file
    #[arg(long)]
    pub dry_run: bool,

    /// GitHub API token (raises the rate limit)
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
}

#[derive(Args)]
pub struct ScanArgs {
    /// Don't write changes back to the status file
    #[arg(long)]
    pub dry_run: bool,
}

struct RunOptions {
    check_remote: bool,
    dry_run: bool,
    github_token: Option<String>,
}

/// Summary printed as compact JSON on stdout
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub tracked: usize,
    pub added: usize,
    pub removed: usize,
    pub source_changed: bool,
    pub items_changed: bool,
    pub status_file: String,
    pub written: bool,
}

impl RunSummary {
    pub fn changed(&self) -> bool {
        self.source_changed || self.items_changed
    }
}

pub async fn run_check(config_path: &Path, args: CheckArgs) -> Result<RunSummary> {
    run(
        config_path,
        RunOptions {
            check_remote: true,
            dry_run: args.dry_run,
            github_token: args.github_token,
        },
    )
    .await
}

pub async fn run_scan(config_path: &Path, args: ScanArgs) -> Result<RunSummary> {
    run(
        config_path,
        RunOptions {
            check_remote: false,
            dry_run: args.dry_run,
            github_token: None,
        },
    )
    .await
}

async fn run(config_path: &Path, options: RunOptions) -> Result<RunSummary> {
    let config = Config::load(config_path).await?;
    let root = config_path.parent().unwrap_or_else(|| Path::new(""));
    let status_path = root.join(&config.status_file);

    let registry = Registry::default();

    let status = StatusFile::load(&status_path).await?;
    let persisted = registry
        .load_all(status.items)
        .with_context(|| format!("Invalid status file {}", status_path.display()))?;

    let urls = scan_sources(root, &config.sources).await?;
    let found = registry.identify_all(urls.iter().map(String::as_str));

    let mut reconciliation = reconcile(persisted, found);
    info!(
        tracked = reconciliation.references.len(),
        added = reconciliation.added,
        removed = reconciliation.removed,
        "reconciled with source"
    );

    let items_changed = if options.check_remote {
        let coordinator = Coordinator::new();
        let remotes = register_remotes(&coordinator, &config, options.github_token)?;
        check_all(&mut reconciliation.references, &remotes, &coordinator).await?
    } else {
        false
    };

    let status = StatusFile::from_references(&reconciliation.references)?;
    if options.dry_run {
        info!("dry run, status file not written");
    } else {
        status.save(&status_path).await?;
        info!(count = status.items.len(), file = %status_path.display(), "saved status file");
    }

    Ok(RunSummary {
        tracked: reconciliation.references.len(),
        added: reconciliation.added,
        removed: reconciliation.removed,
        source_changed: reconciliation.source_changed(),
        items_changed,
        status_file: status_path.display().to_string(),
        written: !options.dry_run,
    })
}

/// Register one processor per enabled remote, GitHub first.
fn register_remotes(
    coordinator: &Coordinator,
    config: &Config,
    github_token: Option<String>,
) -> Result<Remotes> {
    let transport = Transport::new(Duration::from_millis(config.timeout_ms))?;
    let mut remotes = Remotes::default();

    if config.github.enabled {
        let api_url = parse_api_url(&config.github.api_url)?;
        remotes.github = Some(coordinator.register(GithubProcessor::new(
            transport.clone(),
            api_url,
            github_token,
            config.github.concurrency,
        )));
    }

    if config.stackexchange.enabled {
        let api_url = parse_api_url(&config.stackexchange.api_url)?;
        remotes.stackexchange = Some(coordinator.register(StackExchangeProcessor::new(
            transport,
            api_url,
            config.stackexchange.key.clone(),
        )));
    }

    Ok(remotes)
}

fn parse_api_url(raw: &str) -> Result<Url> {
    Url::parse(raw).with_context(|| format!("Invalid API URL: {}", raw))
}
