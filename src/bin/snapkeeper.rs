// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use snapkeeper::{
    config::Config,
    journal,
    lock::RunLock,
    maintain::Maintainer,
    path::{default_config_path, lock_path},
    store::{bounded, command::ShellCollaborator, logfile::FileLog, zfs::ZfsCli, LogStore},
};

use anyhow::{bail, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use std::{path::PathBuf, process::exit, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type ZfsMaintainer = Maintainer<ZfsCli, ZfsCli, FileLog, ShellCollaborator>;

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "snapkeeper [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let path = match self.config {
            Some(path) => path,
            None => default_config_path()?,
        };
        let maintainer = open(&Config::load(&path)?)?;

        match self.command {
            Command::Run(opts) => run_run(&maintainer, opts).await,
            Command::Next => run_next(&maintainer).await,
            Command::List => run_list(&maintainer).await,
            Command::Prune(opts) => run_prune(&maintainer, opts).await,
            Command::Replicate(opts) => run_replicate(&maintainer, opts).await,
            Command::Status => run_status(&maintainer).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Perform full maintenance run.
    #[command(override_usage = "snapkeeper run [options]")]
    Run(RunOptions),

    /// Show next snapshot identifier without creating it.
    #[command(override_usage = "snapkeeper next")]
    Next,

    /// List snapshots of managed dataset.
    #[command(override_usage = "snapkeeper list")]
    List,

    /// Enforce retention window without taking a snapshot.
    #[command(override_usage = "snapkeeper prune [options]")]
    Prune(PruneOptions),

    /// Replicate managed snapshot into replication target.
    #[command(override_usage = "snapkeeper replicate [<snapshot>]")]
    Replicate(ReplicateOptions),

    /// Show maintenance log segments and their snapshots.
    #[command(override_usage = "snapkeeper status")]
    Status,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RunOptions {
    /// Show what would happen without changing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PruneOptions {
    /// Show what would be deleted without deleting anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ReplicateOptions {
    /// Snapshot to replicate instead of the newest managed one.
    #[arg(value_name = "snapshot")]
    pub snapshot: Option<String>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn open(config: &Config) -> Result<ZfsMaintainer> {
    let zfs = match &config.zfs_bin {
        Some(bin) => ZfsCli::new(bin),
        None => ZfsCli::default(),
    };

    Ok(Maintainer::new(
        config.maintenance()?,
        zfs.clone(),
        zfs,
        FileLog::new(&config.log.path),
        ShellCollaborator::new(),
    ))
}

fn spinner(message: String) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{elapsed_precise:.green}  {spinner} {msg}")?);
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

async fn run_run(maintainer: &ZfsMaintainer, opts: RunOptions) -> Result<()> {
    let dataset = &maintainer.config().dataset;
    if opts.dry_run {
        let plan = maintainer.plan_at(Local::now().date_naive()).await?;
        print!("{plan}");
        return Ok(());
    }

    let _lock = RunLock::acquire(lock_path(dataset))?;
    let bar = spinner(format!("maintaining {dataset}"))?;
    let summary = maintainer.run().await;
    bar.finish_and_clear();

    print!("{}", summary.to_toml());
    if summary.has_failures() {
        bail!("maintenance run of {dataset} finished with failures");
    }

    Ok(())
}

async fn run_next(maintainer: &ZfsMaintainer) -> Result<()> {
    let name = maintainer
        .next_identifier_at(Local::now().date_naive())
        .await?;
    println!("{name}");

    Ok(())
}

async fn run_list(maintainer: &ZfsMaintainer) -> Result<()> {
    let names = maintainer.snapshot_names().await?;
    let managed = maintainer
        .config()
        .naming
        .managed(names.iter().map(String::as_str));

    for name in &managed {
        println!("{name}");
    }

    for name in names
        .iter()
        .filter(|name| maintainer.config().naming.parse(name).is_none())
    {
        println!("{name} (ignored)");
    }

    Ok(())
}

async fn run_prune(maintainer: &ZfsMaintainer, opts: PruneOptions) -> Result<()> {
    let dataset = &maintainer.config().dataset;
    let _lock = RunLock::acquire(lock_path(dataset))?;

    let selected = maintainer.select_deletions().await?;
    if selected.is_empty() {
        info!("{dataset} is within its retention window");
        return Ok(());
    }

    for name in &selected {
        println!("delete {dataset}@{name}");
    }

    if opts.dry_run {
        return Ok(());
    }

    if !opts.yes {
        let confirmed = Confirm::new(&format!("delete {} snapshots?", selected.len()))
            .with_default(false)
            .prompt()?;
        if !confirmed {
            info!("prune aborted");
            return Ok(());
        }
    }

    let (outcome, purge) = maintainer.delete(selected).await;
    for (name, error) in &outcome.failed {
        warn!("cannot delete {dataset}@{name}: {error}");
    }
    let purge = purge?;
    info!(
        "deleted {} snapshots, purged {} log segments",
        outcome.deleted.len(),
        purge.removed.len()
    );

    if !outcome.is_complete() {
        bail!("{} snapshots could not be deleted", outcome.failed.len());
    }

    Ok(())
}

async fn run_replicate(maintainer: &ZfsMaintainer, opts: ReplicateOptions) -> Result<()> {
    let dataset = &maintainer.config().dataset;
    let _lock = RunLock::acquire(lock_path(dataset))?;

    let bar = spinner(format!("replicating {dataset}"))?;
    let outcome = maintainer.replicate_snapshot(opts.snapshot.as_deref()).await;
    bar.finish_and_clear();

    let outcome = outcome?;
    println!("{outcome}");
    if outcome.is_failure() {
        bail!("replication of {dataset} failed");
    }

    Ok(())
}

async fn run_status(maintainer: &ZfsMaintainer) -> Result<()> {
    let timeout = maintainer.config().timeout;
    let log = bounded(timeout, "read maintenance log", maintainer.log_store().read()).await?;
    let names = maintainer.snapshot_names().await?;

    for segment in journal::segments(&log) {
        if names.contains(&segment) {
            println!("{segment}");
        } else {
            println!("{segment} (no snapshot)");
        }
    }

    Ok(())
}
