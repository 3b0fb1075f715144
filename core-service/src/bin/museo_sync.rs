//! `museo-sync`: keep an offline copy of the archive on this machine.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use core_runtime::config::{CoreConfig, FailurePolicy, DEFAULT_AUDIO_HASH_CEILING_BYTES};
use core_runtime::events::CoreEvent;
use core_runtime::logging::{init_logging, parse_level, LogFormat, LoggingConfig};
use core_service::{CoreError, CoreService};
use core_sync::{SyncOptions, SyncReport};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "museo-sync", version, about = "Sync the museum audio archive for offline playback")]
struct CliArgs {
    /// Absolute URL of the archive's manifest endpoint.
    #[arg(long, env = "MANIFEST_URL")]
    manifest_url: String,

    /// Library root. Defaults to `<data dir>/museo-sync/library`.
    #[arg(long, env = "MUSEO_LIBRARY_DIR")]
    library_dir: Option<PathBuf>,

    /// Audio files at or above this many bytes are checked by size only. 0 hashes everything.
    #[arg(long, env = "MUSEO_AUDIO_HASH_CEILING", default_value_t = DEFAULT_AUDIO_HASH_CEILING_BYTES)]
    audio_hash_ceiling: u64,

    /// Verdict when a local file cannot be stat'ed or hashed: fail-open or fail-closed.
    #[arg(long, env = "MUSEO_INTEGRITY_POLICY", default_value = "fail-open")]
    integrity_policy: FailurePolicy,

    /// Log format: pretty, json or compact.
    #[arg(long, env = "MUSEO_LOG_FORMAT", default_value = "compact")]
    log_format: LogFormat,

    /// Log level: trace, debug, info, warn or error.
    #[arg(long, env = "MUSEO_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Print results as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync the library if the archive has a newer manifest.
    Sync {
        /// Delete local files the manifest no longer references.
        #[arg(long)]
        cleanup: bool,

        /// Run the pass even if the local version is current.
        #[arg(long)]
        force: bool,
    },
    /// Show the local version and how much of the library is offline.
    Status,
    /// Compare the archive's manifest version with the local one.
    Check,
}

#[derive(Serialize)]
struct StatusOutput {
    library_root: PathBuf,
    version: Option<i64>,
    total: usize,
    synced: usize,
    pending: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    init_logging(
        LoggingConfig::default()
            .with_format(args.log_format)
            .with_level(parse_level(&args.log_level)?)
            .with_target(false),
    )?;

    let mut builder = CoreConfig::builder()
        .manifest_url(args.manifest_url.clone())
        .audio_hash_ceiling(Some(args.audio_hash_ceiling).filter(|c| *c > 0))
        .integrity_policy(args.integrity_policy);
    if let Some(dir) = &args.library_dir {
        builder = builder.library_dir(dir.clone());
    }
    let config = builder.build().context("Invalid configuration")?;

    let service = CoreService::bootstrap(config)
        .await
        .context("Could not start the sync core")?;

    let mut events = service.events();
    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CoreEvent::Sync(event)) => eprintln!("{}", event.message()),
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outcome = run(&service, &args).await;

    // Dropping the service closes the bus so the progress task drains and exits.
    drop(service);
    progress.await.ok();
    outcome
}

async fn run(service: &CoreService, args: &CliArgs) -> Result<()> {
    match &args.command {
        Command::Sync { cleanup, force } => {
            let options = SyncOptions { cleanup: *cleanup };
            let report = if *force {
                Some(service.synchronize(options).await.map_err(explain)?)
            } else {
                service.sync_if_stale(options).await.map_err(explain)?
            };
            match report {
                Some(report) => print_report(&report, args.json)?,
                None => {
                    info!("Library already current");
                    if args.json {
                        println!("null");
                    } else {
                        println!("Library is up to date");
                    }
                }
            }
        }
        Command::Status => {
            let stats = service.library_stats().await?.unwrap_or_default();
            let status = StatusOutput {
                library_root: service.library_root().to_path_buf(),
                version: service.local_version().await?,
                total: stats.total,
                synced: stats.synced,
                pending: stats.pending,
            };
            if args.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Library:  {}", status.library_root.display());
                match status.version {
                    Some(version) => println!("Version:  {}", version),
                    None => println!("Version:  never synced"),
                }
                println!(
                    "Tracks:   {} total, {} offline, {} pending",
                    status.total, status.synced, status.pending
                );
            }
        }
        Command::Check => {
            let check = service.check_for_update().await.map_err(explain)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&check)?);
            } else {
                let local = check
                    .local_version
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "none".to_string());
                println!(
                    "Remote v{} / local {}: {}",
                    check.remote_version,
                    local,
                    if check.needs_sync {
                        "sync needed"
                    } else {
                        "up to date"
                    }
                );
            }
        }
    }
    Ok(())
}

/// Transient failures get a hint that rerunning later is the fix.
fn explain(err: CoreError) -> anyhow::Error {
    if err.is_transient() {
        anyhow::Error::new(err).context("Archive not reachable right now; try again later")
    } else {
        err.into()
    }
}

fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!(
            "Synced {} tracks at v{} ({} downloaded, {} up to date, {} removed)",
            report.items.len(),
            report.version,
            report.downloaded,
            report.skipped,
            report.removed
        );
    }
    Ok(())
}
