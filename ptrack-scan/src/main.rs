//! ptrack-scan - station scan front end
//!
//! Reads decoded codes from stdin (one per line, as a keyboard-wedge scanner
//! or a decoder pipe delivers them) and drives a scan session against the
//! process-record service.
//!
//! Commands typed instead of a code:
//! - `:upload`  upload the continuous queue
//! - `:dismiss` close the blocking duplicate notice
//! - `:paste`   enter codes by hand, one per line, blank line to finish
//! - `:stop`    leave the scan screen

use std::fs::OpenOptions;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ptrack_common::config::{
    default_profile_path, load_config, resolve_config_source, TomlConfig,
};
use ptrack_common::events::{EventBus, FeedbackLevel, ScanEvent};
use ptrack_common::profile::ProfileStore;
use ptrack_common::{ProcessType, ScanMode};
use ptrack_scan::{run_session, HttpProcessApi, OperatorInput, ProductDetailCache, ScanEngine};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for ptrack-scan
#[derive(Parser, Debug)]
#[command(name = "ptrack-scan")]
#[command(about = "Process station scanner for production tracking")]
#[command(version)]
struct Args {
    /// Config file (overrides PTRACK_CONFIG and the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Process-record service base URL
    #[arg(long, global = true, env = "PTRACK_API_URL")]
    api_url: Option<String>,

    /// Operator name for this run (overrides the stored profile)
    #[arg(long, global = true, env = "PTRACK_OPERATOR")]
    operator: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan codes at a station
    Scan {
        /// Station (wire or display name); defaults to the last one used
        #[arg(short, long)]
        station: Option<ProcessType>,

        /// single, continuous or query
        #[arg(short, long, default_value = "single")]
        mode: ScanMode,
    },
    /// Store the operator name in the local profile
    Operator { name: String },
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let source = resolve_config_source(args.config.as_deref());
    let mut config = load_config(&source).context("Failed to load configuration")?;
    if let Some(url) = &args.api_url {
        config.api.base_url = url.clone();
    }

    init_tracing(&config)?;
    info!("Starting ptrack-scan {}", env!("CARGO_PKG_VERSION"));
    debug!(source = ?source, "Configuration resolved");

    let profiles = ProfileStore::new(
        config
            .profile_path
            .clone()
            .unwrap_or_else(default_profile_path),
    );

    match args.command {
        Command::Operator { name } => {
            let profile = profiles
                .set_operator(&name)
                .context("Failed to save operator profile")?;
            println!(
                "Operator set to {} ({})",
                profile.operator().unwrap_or_default(),
                profiles.path().display()
            );
            Ok(())
        }
        Command::ShowConfig => {
            match source.path() {
                Some(path) => println!("# source: {}", path.display()),
                None => println!("# source: built-in defaults"),
            }
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Scan { station, mode } => {
            scan(config, profiles, args.operator, station, mode).await
        }
    }
}

/// Install the global subscriber; RUST_LOG wins over the configured level
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

async fn scan(
    config: TomlConfig,
    profiles: ProfileStore,
    operator: Option<String>,
    station: Option<ProcessType>,
    mode: ScanMode,
) -> Result<()> {
    let profile = profiles.load().context("Failed to read operator profile")?;

    let operator = match operator.or_else(|| profile.operator().map(str::to_string)) {
        Some(name) => name,
        None => bail!("No operator set; run `ptrack-scan operator <name>` first"),
    };
    let Some(station) = station.or(profile.last_station) else {
        bail!("No station given and none remembered; pass --station");
    };
    if let Err(e) = profiles.remember_station(station) {
        warn!(error = %e, "Could not remember station");
    }

    let api = Arc::new(HttpProcessApi::new(&config.api)?);
    let cache = Arc::new(ProductDetailCache::from_config(&config.cache));
    let events = EventBus::default();
    let printer = tokio::spawn(print_feedback(events.subscribe()));

    let mut engine = ScanEngine::new(api, cache, &operator, config.scan.clone(), events)?;
    engine.start_session(station, mode)?;
    info!(operator = %operator, station = %station, mode = %mode, "Ready to scan");

    let (tx, rx) = mpsc::channel(64);
    std::thread::spawn(move || read_operator_input(tx));

    let cancel_token = CancellationToken::new();
    let on_signal = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping");
            on_signal.cancel();
        }
    });

    let reason = run_session(&mut engine, rx, cancel_token).await;
    info!(reason = ?reason, "Scan screen closed");

    // Closing the bus lets the printer drain and finish
    drop(engine);
    let _ = printer.await;
    Ok(())
}

/// Turn stdin lines into operator input
///
/// Runs on a plain thread: a blocking stdin read must not keep the runtime
/// from shutting down.
fn read_operator_input(tx: mpsc::Sender<OperatorInput>) {
    let mut pasted: Option<String> = None;

    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };

        if let Some(block) = pasted.as_mut() {
            if line.trim().is_empty() {
                let text = std::mem::take(block);
                pasted = None;
                if tx.blocking_send(OperatorInput::Lines(text)).is_err() {
                    return;
                }
            } else {
                block.push_str(&line);
                block.push('\n');
            }
            continue;
        }

        let input = match line.trim() {
            ":upload" => OperatorInput::Upload,
            ":dismiss" => OperatorInput::Dismiss,
            ":stop" => OperatorInput::Stop,
            ":paste" => {
                pasted = Some(String::new());
                continue;
            }
            _ => OperatorInput::Decode(line),
        };
        if tx.blocking_send(input).is_err() {
            return;
        }
    }
}

/// Render feedback events for the operator
async fn print_feedback(mut rx: broadcast::Receiver<ScanEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let tag = match event.feedback.level() {
                    FeedbackLevel::Info => "  ",
                    FeedbackLevel::Success => "OK",
                    FeedbackLevel::Warning => "!!",
                    FeedbackLevel::Error => "XX",
                    FeedbackLevel::Blocking => "##",
                };
                println!("[{}] {}", tag, event.feedback);
                if event.feedback.level() == FeedbackLevel::Blocking {
                    println!("     type :dismiss to continue");
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Feedback printer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
