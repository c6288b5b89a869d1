//! BoothMail - photo booth capture sessions delivered by email.
//!
//! This binary watches the booth's output directory, groups new photos by the
//! guest address typed at the console, and mails each session as a zip.
//!
//! # Commands
//!
//! - `boothmail run`: Watch for photos and deliver sessions
//! - `boothmail list`: Show undelivered batches in the archive
//! - `boothmail replay`: Resend undelivered batches
//!
//! # Environment Variables
//!
//! See the [`config`](boothmail::config) module for available configuration options.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use boothmail::config::{self, Config};
use boothmail::delivery::Transport;
use boothmail::engine::{EngineHandle, EngineSettings, FlushOutcome, SessionEngine};
use boothmail::replay::{discover_batches, ReplayEngine};
use boothmail::session::Destinations;
use boothmail::types::StatusEvent;
use boothmail::watcher::{DirectoryWatcher, WatchEvent};

/// Capacity of the watcher and status channels.
const CHANNEL_BUFFER: usize = 100;

/// Console command that sends the current session immediately.
const FLUSH_COMMAND: &str = "/flush";

/// Console command that prints the current session.
const STATUS_COMMAND: &str = "/status";

/// BoothMail - photo booth capture sessions delivered by email.
///
/// Watches the directory a photo booth writes into, collects each guest's
/// photos, and emails them as a zip once the booth goes quiet. Sessions that
/// cannot be sent are archived for `boothmail replay`.
#[derive(Parser, Debug)]
#[command(name = "boothmail")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    BOOTHMAIL_WATCH_DIR        Directory the booth writes photos into
    BOOTHMAIL_OUTPUT_DIR       Directory for session zip files
    BOOTHMAIL_ARCHIVE_DIR      Root for unsent batch folders
    BOOTHMAIL_TRANSPORT        smtp (default) or api
    BOOTHMAIL_SMTP_USER        SMTP account
    BOOTHMAIL_SMTP_PASSWORD    SMTP app password
    BOOTHMAIL_API_TOKEN        Bearer token for the api transport
    BOOTHMAIL_FROM             Sender address

EXAMPLES:
    # Start watching, with the first guest already entered
    boothmail run --recipient guest@example.com

    # Show what is waiting in the archive
    boothmail list --archive-dir ~/booth/unsent

    # Resend one batch
    boothmail replay --batch unsent_guest_20261014_101500
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Watch for photos and deliver sessions.
    ///
    /// Each line typed on stdin sets the recipient for the photos that
    /// follow. Type /flush to send the current session now, /status to show
    /// it.
    Run {
        /// Directory the booth writes photos into.
        #[arg(long)]
        watch_dir: Option<PathBuf>,

        /// Directory for session zip files.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Root for unsent batch folders.
        #[arg(long)]
        archive_dir: Option<PathBuf>,

        /// First recipient.
        #[arg(short, long)]
        recipient: Option<String>,
    },

    /// List undelivered batches.
    List {
        /// Root for unsent batch folders.
        #[arg(long)]
        archive_dir: Option<PathBuf>,
    },

    /// Resend undelivered batches.
    ///
    /// Delivered batches move to the _sent folder. Exits non-zero if any
    /// batch could not be sent.
    Replay {
        /// Root for unsent batch folders.
        #[arg(long)]
        archive_dir: Option<PathBuf>,

        /// Only resend the named batch folder (repeatable).
        #[arg(long = "batch", value_name = "NAME")]
        batches: Vec<String>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Command::List { archive_dir } => run_list(archive_dir).map(|()| ExitCode::SUCCESS),
        Command::Run {
            watch_dir,
            output_dir,
            archive_dir,
            recipient,
        } => {
            let runtime = build_runtime()?;
            let result =
                runtime.block_on(run_booth(watch_dir, output_dir, archive_dir, recipient));
            // A pending stdin read would otherwise hold up runtime drop.
            runtime.shutdown_background();
            result.map(|()| ExitCode::SUCCESS)
        }
        Command::Replay {
            archive_dir,
            batches,
        } => {
            let runtime = build_runtime()?;
            runtime.block_on(run_replay(archive_dir, batches))
        }
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

/// Runs the booth until Ctrl+C or SIGTERM.
async fn run_booth(
    watch_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    archive_dir: Option<PathBuf>,
    recipient: Option<String>,
) -> Result<()> {
    info!("Starting BoothMail");

    let mut config = Config::from_env().context("Failed to load configuration")?;
    config.watch_dir = watch_dir.or(config.watch_dir);
    config.output_dir = output_dir.or(config.output_dir);
    config.archive_dir = archive_dir.or(config.archive_dir);

    let watch_dir = config
        .watch_dir
        .clone()
        .context("No watch directory: set BOOTHMAIL_WATCH_DIR or pass --watch-dir")?;
    if !watch_dir.exists() {
        info!(watch_dir = %watch_dir.display(), "Creating watch directory");
        std::fs::create_dir_all(&watch_dir).context("Failed to create watch directory")?;
    }

    info!(
        watch_dir = %watch_dir.display(),
        output_dir = ?config.output_dir,
        archive_dir = ?config.archive_dir,
        method = %config.transport.method(),
        "Configuration loaded"
    );
    if config.output_dir.is_none() || config.archive_dir.is_none() {
        warn!("Output or archive directory not set; photos will be rejected until both are configured");
    }

    let transport = Transport::from_config(&config.transport, config.delivery_timeout)
        .context("Failed to set up mail transport")?;

    let (status_tx, status_rx) = mpsc::channel(CHANNEL_BUFFER);
    let engine = SessionEngine::new(
        transport,
        Destinations {
            output_dir: config.output_dir.clone(),
            archive_dir: config.archive_dir.clone(),
        },
        EngineSettings::from(&config),
    )
    .with_status(status_tx);
    let (handle, engine_task) = engine.spawn();
    tokio::spawn(print_status(status_rx));

    let (watch_tx, mut watch_rx) = mpsc::channel::<WatchEvent>(CHANNEL_BUFFER);
    let _watcher = DirectoryWatcher::new(watch_dir.clone(), &config.extensions, watch_tx)
        .context(format!(
            "Failed to initialize file watcher for {}",
            watch_dir.display()
        ))?;

    if let Some(address) = recipient {
        set_recipient(handle.clone(), address);
    }

    println!("Type a guest email address and press Enter. {FLUSH_COMMAND} sends now, {STATUS_COMMAND} shows the session.");
    info!("Booth running. Press Ctrl+C to stop.");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }

            Some(WatchEvent::FileCreated(path)) = watch_rx.recv() => {
                if handle.file_created(path).await.is_err() {
                    warn!("Session engine stopped unexpectedly");
                    break;
                }
            }

            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_input(&handle, line.trim()),
                Ok(None) => {
                    debug!("stdin closed");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    stdin_open = false;
                }
            },
        }
    }

    info!("Shutting down...");
    let _ = handle.shutdown().await;
    engine_task.await.context("Session engine task failed")?;
    info!("Shutdown complete");
    Ok(())
}

/// Dispatches one console line. Slow work runs on its own task so the loop
/// keeps forwarding photos.
fn handle_input(handle: &EngineHandle, line: &str) {
    match line {
        "" => {}
        FLUSH_COMMAND => {
            let handle = handle.clone();
            tokio::spawn(async move {
                match handle.flush().await {
                    Ok(FlushOutcome::Empty) => println!("Nothing to send."),
                    Ok(_) => {}
                    Err(e) => eprintln!("Flush failed: {e}"),
                }
            });
        }
        STATUS_COMMAND => {
            let handle = handle.clone();
            tokio::spawn(async move {
                if let Ok(snapshot) = handle.snapshot().await {
                    println!(
                        "Recipient: {}  photos: {}  mode: {:?}  timer: {}",
                        snapshot
                            .recipient
                            .as_ref()
                            .map_or("(none)", |r| r.as_str()),
                        snapshot.captured_files.len(),
                        snapshot.mode,
                        if snapshot.timer_armed { "running" } else { "idle" }
                    );
                }
            });
        }
        address => set_recipient(handle.clone(), address.to_string()),
    }
}

fn set_recipient(handle: EngineHandle, address: String) {
    tokio::spawn(async move {
        if let Err(e) = handle.set_recipient(address).await {
            eprintln!("{e}");
        }
    });
}

/// Prints status events; anything needing follow-up goes to stderr.
async fn print_status(mut rx: mpsc::Receiver<StatusEvent>) {
    while let Some(event) = rx.recv().await {
        if event.requires_attention() {
            eprintln!("!!! {}", event.describe());
        } else {
            println!("{}", event.describe());
        }
    }
}

fn resolve_archive_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    flag.or_else(config::archive_dir_from_env)
        .context("No archive directory: set BOOTHMAIL_ARCHIVE_DIR or pass --archive-dir")
}

/// Prints the batches waiting under the archive root.
fn run_list(archive_dir: Option<PathBuf>) -> Result<()> {
    let root = resolve_archive_dir(archive_dir)?;
    let batches = discover_batches(&root)
        .with_context(|| format!("Failed to scan {}", root.display()))?;

    if batches.is_empty() {
        println!("No unsent batches in {}", root.display());
        return Ok(());
    }

    println!("{} unsent batch(es) in {}:", batches.len(), root.display());
    for batch in &batches {
        let meta = &batch.metadata;
        let photos = meta
            .photo_count
            .map_or_else(|| "?".to_string(), |n| n.to_string());
        println!(
            "  {}  {}  {photos} photo(s)  {}  [{}]",
            batch.name,
            meta.recipient,
            meta.archive_file,
            meta.method_label()
        );
    }
    Ok(())
}

/// Resends batches and reports per-batch results.
async fn run_replay(archive_dir: Option<PathBuf>, names: Vec<String>) -> Result<ExitCode> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let root = resolve_archive_dir(archive_dir.or(config.archive_dir.clone()))?;

    let transport = Transport::from_config(&config.transport, config.delivery_timeout)
        .context("Failed to set up mail transport")?;
    let engine = ReplayEngine::new(
        root.clone(),
        transport,
        config.template.clone(),
        config.delivery_timeout,
    );

    let mut batches = engine
        .discover()
        .with_context(|| format!("Failed to scan {}", root.display()))?;

    let mut unknown = 0usize;
    if !names.is_empty() {
        for name in &names {
            if !batches.iter().any(|b| &b.name == name) {
                eprintln!("No unsent batch named {name}");
                unknown += 1;
            }
        }
        batches.retain(|b| names.contains(&b.name));
    }

    if batches.is_empty() {
        println!("Nothing to resend.");
        return Ok(if unknown == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    println!("Resending {} batch(es)...", batches.len());
    let report = engine.replay_all(&batches).await;

    for (name, sent_dir) in &report.sent {
        println!("  sent    {name} -> {}", sent_dir.display());
    }
    for (name, err) in &report.delivered_unmoved {
        eprintln!("  SENT, NOT MOVED  {name}: {err} (move it to _sent by hand, do not resend)");
    }
    for (name, reason) in &report.failed {
        eprintln!("  FAILED  {name}: {reason}");
    }
    println!(
        "{} sent, {} failed.",
        report.sent.len() + report.delivered_unmoved.len(),
        report.failed.len() + unknown
    );

    Ok(if report.all_moved() && unknown == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Initializes the tracing subscriber with environment-based filtering.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
