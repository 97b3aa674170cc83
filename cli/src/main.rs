//! Waymark daemon - binary entry point.
//!
//! # Architecture
//!
//! ```text
//! main() -> init_tracing() -> run | status
//!                               |
//!                               v
//!               stdin JSONL fixes -> Tracker::ingest -> Tracker::maybe_sync
//!                               |
//!                               v
//!                  SIGINT / EOF -> Tracker::flush
//! ```
//!
//! `run` treats stdin as the location feed: one JSON fix per line, the
//! stand-in for a platform location service. Each accepted batch is followed
//! by a threshold check; the queue is flushed once the feed ends or the
//! process is interrupted.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use waymark_engine::{
    HatClient, LocationFix, LocationStore, SyncPolicy, TokenFile, Tracker, WaymarkConfig,
};

fn init_tracing(data_dir: &std::path::Path) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let (log_file, init_warnings) = open_log_file(data_dir);

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // If we can't open a log file, prefer "no logs" over interleaving log
    // lines with the feed on the terminal.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file(data_dir: &std::path::Path) -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let candidates = [
        data_dir.join("logs").join("waymark.log"),
        PathBuf::from(".waymark").join("logs").join("waymark.log"),
    ];
    let mut warnings = Vec::new();

    for candidate in candidates {
        if let Some(parent) = candidate.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn print_usage() {
    eprintln!("Usage: waymark <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  run     Read JSON location fixes from stdin and sync them");
    eprintln!("  status  Print queue depth by sync status");
}

fn build_tracker(config: &WaymarkConfig, policy: SyncPolicy) -> Result<Tracker> {
    let owner = config.owner_settings()?;
    let data_dir = config.data_dir();

    let store =
        LocationStore::open(data_dir.join("queue.db")).context("Failed to open record queue")?;

    let token_file = TokenFile::new(data_dir.join("token"));
    if token_file.load()?.is_none()
        && let Some(token) = &owner.token
    {
        token_file
            .save(token)
            .context("Failed to seed auth token")?;
    }

    let client = match config.sync.as_ref().and_then(|s| s.endpoint.clone()) {
        Some(endpoint) => HatClient::with_endpoint(endpoint, reqwest_client()),
        None => HatClient::new(&owner.phata),
    };

    Ok(Tracker::new(store, client, token_file, policy))
}

// Endpoint overrides point at test servers; the shared hardened client
// refuses plain http, so the override path builds its own.
fn reqwest_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_default()
}

async fn run(config: &WaymarkConfig) -> Result<()> {
    let mut tracker = build_tracker(config, config.sync_policy())?;

    if std::io::stdin().is_terminal() {
        eprintln!("waymark run: reading JSON fixes from stdin (one per line); Ctrl-C to flush and exit");
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read from stdin")? {
                    Some(line) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<LocationFix>(line) {
                            Ok(fix) => {
                                tracker.ingest(&[fix])?;
                                tracker.maybe_sync().await?;
                            }
                            Err(e) => tracing::warn!("Skipping malformed fix: {e}"),
                        }
                    }
                    None => {
                        tracing::info!("Feed ended; flushing queue");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted; flushing queue");
                break;
            }
        }
    }

    let outcome = tracker.flush().await?;
    tracing::info!(
        delivered = outcome.delivered,
        released = outcome.released,
        "Final flush complete"
    );
    Ok(())
}

fn status(config: &WaymarkConfig) -> Result<()> {
    let store = LocationStore::open(config.data_dir().join("queue.db"))
        .context("Failed to open record queue")?;
    let counts = store.status_counts()?;

    println!("unsynced  {}", counts.unsynced);
    println!("syncing   {}", counts.syncing);
    println!("synced    {}", counts.synced);
    println!("total     {}", counts.total());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match WaymarkConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("waymark: {e}");
            return ExitCode::FAILURE;
        }
    };

    let command = std::env::args().nth(1);
    let result = match command.as_deref() {
        Some("run") => {
            init_tracing(&config.data_dir());
            run(&config).await
        }
        Some("status") => status(&config),
        Some("--help" | "-h" | "help") => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        _ => {
            print_usage();
            return ExitCode::from(2);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("waymark: {e:#}");
            ExitCode::FAILURE
        }
    }
}
