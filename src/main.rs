//! # Rover Bridge
//!
//! Drive a wheeled robot with a game controller over a network link.
//!
//! The operator node runs two loops:
//!
//! - a blocking **poll loop** (own thread) that owns the gamepad and the
//!   transform engine, pushing a refreshed snapshot into a watch channel on
//!   every processed event;
//! - the async **publish loop** (this task) that ticks at the configured
//!   command rate, wraps the latest snapshot in a timestamped envelope and
//!   hands it to the command sink.
//!
//! The two only share the watch channel: last writer wins, stale reads are
//! fine, and neither loop can block the other.

use anyhow::{Context, Result};
use std::thread;
use std::time::Duration as StdDuration;
use tokio::sync::watch;
use tokio::time::{interval, Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod controller;
mod error;
mod link;
mod telemetry;
mod transform;

use config::{Config, ControllerConfig};
use controller::Gamepad;
use link::{publish_tick, DebugSink};
use telemetry::CommandLogger;
use transform::cache::Snapshot;
use transform::{ControlRegistry, TransformEngine};

/// Configuration file used when no path is given on the command line.
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Number of envelopes between status log messages
const LOG_INTERVAL_ENVELOPES: u64 = 1000;

/// Main entry point for the Rover Bridge operator node
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load and validate the TOML configuration
///    - Set up logging (env-filtered console, optional rolling file)
///    - Load and validate the JSON control map
///    - Build the transform engine and spawn the poll thread
///
/// 2. **Main Loop**
///    - Publish the latest snapshot at the configured rate
///    - Log a staleness warning when no input arrives within the timeout
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if the configuration or control map fails to load — both
/// are fatal at startup, all-or-nothing. Runtime device loss is retried by
/// the poll thread and never aborts the process.
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    // Keep the file-logging worker alive for the lifetime of main
    let _log_guard = init_tracing(&config);

    info!("Rover Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from {}", config_path);

    let registry = ControlRegistry::load(&config.controls.map_path)
        .with_context(|| format!("failed to load control map from {}", config.controls.map_path))?;
    info!(
        "Control map loaded: {} controls, {} drive group(s)",
        registry.len(),
        registry.drive_groups().len()
    );

    let engine = TransformEngine::new(registry);
    let (snapshot_tx, mut snapshot_rx) = watch::channel(engine.snapshot());

    spawn_poll_loop(engine, snapshot_tx, config.controller.clone());

    let mut sink = DebugSink::new();
    let mut logger = if config.telemetry.enabled {
        Some(CommandLogger::new(
            &config.telemetry.log_dir,
            config.telemetry.max_records_per_file,
            config.telemetry.max_files_to_keep,
        )?)
    } else {
        None
    };

    let period_ms = (1000 / config.link.command_rate_hz).max(1);
    let mut publish_interval = interval(Duration::from_millis(period_ms as u64));
    let staleness_timeout = StdDuration::from_millis(config.link.staleness_timeout_ms);

    info!(
        "Starting command publish loop at {}Hz",
        config.link.command_rate_hz
    );
    info!("Press Ctrl+C to exit");

    let mut envelope_count: u64 = 0;
    let mut last_log_count: u64 = 0;
    let mut last_input = Instant::now();
    let mut stale_warned = false;

    // Main control loop
    loop {
        tokio::select! {
            // Publish the latest snapshot at the configured rate
            _ = publish_interval.tick() => {
                if snapshot_rx.has_changed().unwrap_or(false) {
                    snapshot_rx.borrow_and_update();
                    last_input = Instant::now();
                    stale_warned = false;
                } else if !stale_warned && last_input.elapsed() >= staleness_timeout {
                    warn!(
                        "No controller input for {}ms; republishing last known snapshot",
                        config.link.staleness_timeout_ms
                    );
                    stale_warned = true;
                }

                let envelope = match publish_tick(&snapshot_rx, &mut sink) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        debug!("Failed to publish envelope: {}", e);
                        continue;
                    }
                };

                envelope_count += 1;

                if let Some(logger) = logger.as_mut() {
                    if let Err(e) = logger.log(&envelope) {
                        warn!("Failed to log envelope: {}", e);
                    }
                }

                // Log status every LOG_INTERVAL_ENVELOPES (~20 seconds at 50Hz)
                if envelope_count - last_log_count >= LOG_INTERVAL_ENVELOPES {
                    info!(
                        "Published {} envelopes ({} output(s) tracked)",
                        envelope_count,
                        envelope.commands.len()
                    );
                    last_log_count = envelope_count;
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                info!("Total envelopes published: {}", envelope_count);
                break;
            }
        }
    }

    Ok(())
}

/// Initializes tracing with an env-filtered console layer and, when the
/// command log is enabled, a daily-rolling file layer in the same
/// directory. Returns the file worker guard, which must outlive main.
fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    if config.telemetry.enabled {
        let appender =
            tracing_appender::rolling::daily(&config.telemetry.log_dir, "rover-bridge.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
        None
    }
}

/// Spawns the blocking poll thread: gamepad discovery with backoff, then a
/// tight fetch/transform loop that publishes a fresh snapshot per batch.
///
/// The thread owns the engine for its whole life (single-owner discipline);
/// device loss drops back to discovery and never propagates out.
fn spawn_poll_loop(
    mut engine: TransformEngine,
    snapshot_tx: watch::Sender<Snapshot>,
    controller: ControllerConfig,
) {
    thread::spawn(move || loop {
        let mut gamepad = match open_gamepad(&controller) {
            Ok(gamepad) => gamepad,
            Err(e) => {
                warn!(
                    "No gamepad available ({}); retrying in {}ms",
                    e, controller.retry_interval_ms
                );
                thread::sleep(StdDuration::from_millis(controller.retry_interval_ms));
                continue;
            }
        };

        info!("Reading events from {}", gamepad.device_path());

        loop {
            match gamepad.fetch_events() {
                Ok(events) => {
                    let mut refreshed = false;
                    for event in &events {
                        match engine.apply(event) {
                            Ok(Some(command)) => {
                                debug!("command: {:?}", command);
                                refreshed = true;
                            }
                            Ok(None) => {}
                            Err(e) => warn!("Dropping malformed event: {}", e),
                        }
                    }
                    if refreshed {
                        snapshot_tx.send_replace(engine.snapshot());
                    }
                }
                Err(e) => {
                    warn!("Gamepad read failed ({}); rediscovering device", e);
                    break;
                }
            }
        }

        thread::sleep(StdDuration::from_millis(controller.retry_interval_ms));
    });
}

/// Opens the configured device, or auto-detects when no path is pinned.
fn open_gamepad(controller: &ControllerConfig) -> error::Result<Gamepad> {
    if controller.device_path.is_empty() {
        Gamepad::open()
    } else {
        Gamepad::open_path(&controller.device_path)
    }
}
