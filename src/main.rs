//! # Relay Pilot
//!
//! Drive a remote vehicle from a gamepad with remappable controls.
//!
//! Polls the selected gamepad, maps its buttons and axes to logical actions
//! and streams the control state to a WebSocket relay.
//!
//! # Commands
//!
//! - `run`: stream `gamepad_input` to the relay until Ctrl+C
//! - `devices`: list visible gamepads
//! - `show`: print a device's mapping table
//! - `remap <ACTION>`: bind an action to the next input touched
//! - `axis <ACTION>`: edit or reset an action's axis config
//!
//! # Examples
//!
//! ```bash
//! relay-pilot run --device xbox
//! relay-pilot remap accelerate --kind button
//! relay-pilot axis turn --min -0.8 --max 0.8
//! ```
//!
//! Expected output of `run`:
//! ```text
//! INFO relay_pilot: Relay Pilot v0.1.0 starting...
//! INFO relay_pilot::controller::poller: Selected input device: Xbox Wireless Controller (Vendor: 045e Product: 0b13) (17 buttons, 6 axes)
//! INFO relay_pilot::relay::client: Connected to relay at ws://127.0.0.1:3001/ws
//! ```

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use relay_pilot::config::{Config, LoggingConfig};
use relay_pilot::controller::actions::{ActionCatalog, ActionKey, InputKind};
use relay_pilot::controller::calibration::{AxisConfig, NormalizeMode};
use relay_pilot::controller::evdev_source::EvdevSource;
use relay_pilot::controller::remap::RemapEvent;
use relay_pilot::diagnostics::Diagnostics;
use relay_pilot::engine::{EngineOptions, InputEngine};
use relay_pilot::relay::{client, send_gamepad_input, RelayOptions};
use relay_pilot::storage::JsonFileStore;

/// Config file read when `--config` is not given, if it exists
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Number of poll ticks between status log messages
const STATUS_LOG_TICKS: u64 = 200;

type Engine = InputEngine<EvdevSource, JsonFileStore>;

#[derive(Parser)]
#[command(name = "relay-pilot", version)]
#[command(about = "Drive a remote vehicle from a gamepad with remappable controls")]
struct Cli {
    /// Config file path (default: config/default.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream control state to the relay
    Run {
        /// Device id or name fragment (default: device.preferred, else first gamepad)
        #[arg(long)]
        device: Option<String>,
    },
    /// List visible gamepads
    Devices,
    /// Print the mapping table of a device
    Show {
        #[arg(long)]
        device: Option<String>,
    },
    /// Bind an action to the next button pressed or axis moved
    Remap {
        action: ActionKey,
        /// Only accept this input kind (button or axis)
        #[arg(long)]
        kind: Option<InputKind>,
        #[arg(long)]
        device: Option<String>,
    },
    /// Edit the axis config of an axis-bound action
    Axis {
        action: ActionKey,
        #[arg(long, allow_negative_numbers = true)]
        min: Option<f32>,
        #[arg(long, allow_negative_numbers = true)]
        max: Option<f32>,
        #[arg(long)]
        inverted: Option<bool>,
        /// Output range (full or positive)
        #[arg(long)]
        normalize: Option<NormalizeMode>,
        /// Restore the action's default axis config
        #[arg(long, conflicts_with_all = ["min", "max", "inverted", "normalize"])]
        reset: bool,
        #[arg(long)]
        device: Option<String>,
    },
}

/// Field overrides of the `axis` command.
#[derive(Debug, Default, Clone, Copy)]
struct AxisOverrides {
    min: Option<f32>,
    max: Option<f32>,
    inverted: Option<bool>,
    normalize: Option<NormalizeMode>,
}

impl AxisOverrides {
    fn apply(&self, base: AxisConfig) -> AxisConfig {
        AxisConfig {
            min: self.min.unwrap_or(base.min),
            max: self.max.unwrap_or(base.max),
            inverted: self.inverted.unwrap_or(base.inverted),
            normalize: self.normalize.unwrap_or(base.normalize),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let _log_guard = init_logging(&config.logging);

    info!("Relay Pilot v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Run { device } => run(&config, device.as_deref()).await,
        Command::Devices => list_devices(&config),
        Command::Show { device } => show(&config, device.as_deref()),
        Command::Remap { action, kind, device } => remap(&config, action, kind, device.as_deref()).await,
        Command::Axis {
            action,
            min,
            max,
            inverted,
            normalize,
            reset,
            device,
        } => {
            let overrides = AxisOverrides {
                min,
                max,
                inverted,
                normalize,
            };
            edit_axis(&config, action, overrides, reset, device.as_deref())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Ok(Config::load(DEFAULT_CONFIG_PATH)?),
        None => Ok(Config::default()),
    }
}

/// Installs stdout logging, plus a daily log file when configured.
///
/// The returned guard flushes the file writer on drop.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    if config.file_dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.file_dir, "relay-pilot.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Some(guard)
}

fn build_engine(config: &Config, diagnostics: Diagnostics) -> Engine {
    InputEngine::new(
        EvdevSource::new(),
        JsonFileStore::new(&config.storage.path),
        ActionCatalog::standard(),
        EngineOptions::from(config),
        diagnostics,
    )
}

/// Selects the requested device, else `device.preferred`, else the first gamepad.
fn select_device(engine: &mut Engine, requested: Option<&str>, config: &Config) -> Result<String> {
    engine.refresh_devices(Instant::now());
    let pattern = requested.unwrap_or(&config.device.preferred);
    let id = engine
        .find_device(pattern)
        .map(|d| d.id.clone())
        .ok_or_else(|| {
            if pattern.is_empty() {
                anyhow!("No gamepad found")
            } else {
                anyhow!("No gamepad matching '{}' found", pattern)
            }
        })?;
    engine.select_device(&id, Instant::now())?;
    Ok(id)
}

/// Main control loop
///
/// Polls the gamepad every `device.poll_interval_ms`, sends `gamepad_input`
/// every `relay.send_interval_ms` while the device is connected, and shuts
/// down on Ctrl+C.
async fn run(config: &Config, device: Option<&str>) -> Result<()> {
    let diagnostics = Diagnostics::new(config.diagnostics.event_log_capacity);
    let mut engine = build_engine(config, diagnostics.clone());
    let id = select_device(&mut engine, device, config)?;

    let mut relay = if config.relay.enabled {
        Some(client::spawn(RelayOptions::from(&config.relay), diagnostics.clone()))
    } else {
        info!("Relay disabled, polling only");
        None
    };

    let mut poll_interval = interval(Duration::from_millis(config.device.poll_interval_ms));
    poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut send_interval = interval(Duration::from_millis(config.relay.send_interval_ms));
    send_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Polling {} every {} ms", id, config.device.poll_interval_ms);
    info!("Press Ctrl+C to exit");

    let mut tick_count: u64 = 0;
    let mut sent_count: u64 = 0;

    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                engine.tick(Instant::now());
                tick_count += 1;

                if tick_count % STATUS_LOG_TICKS == 0 {
                    let latency = diagnostics
                        .last_latency()
                        .map_or_else(|| "n/a".to_string(), |ms| format!("{} ms", ms));
                    info!(
                        "Polled {} ticks, sent {} inputs (connected: {}, relay latency: {})",
                        tick_count,
                        sent_count,
                        engine.snapshot().connected,
                        latency
                    );
                }
            }

            _ = send_interval.tick() => {
                if let Some((handle, _)) = relay.as_mut() {
                    match send_gamepad_input(handle, engine.gamepad_input().as_ref()).await {
                        Ok(true) => sent_count += 1,
                        Ok(false) => {}
                        Err(e) => warn!("Failed to queue gamepad input: {}", e),
                    }
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                info!("Total ticks: {}, inputs sent: {}", tick_count, sent_count);
                break;
            }
        }
    }

    if let Some((handle, task)) = relay.take() {
        drop(handle);
        if timeout(Duration::from_secs(2), task).await.is_err() {
            warn!("Relay client did not stop in time");
        }
    }

    Ok(())
}

fn list_devices(config: &Config) -> Result<()> {
    let mut engine = build_engine(config, Diagnostics::default());
    let devices = engine.refresh_devices(Instant::now());

    if devices.is_empty() {
        println!("No gamepads found");
        return Ok(());
    }
    for device in devices {
        println!(
            "{}\n    {} buttons, {} axes{}",
            device.id,
            device.button_count,
            device.axis_count,
            if device.standard_layout { ", standard layout" } else { "" }
        );
    }
    Ok(())
}

fn print_table(engine: &Engine) {
    for action in engine.catalog().iter() {
        let Some(mapping) = engine.mappings().get(action.key) else {
            continue;
        };
        let label = engine.input_label_for(action.key).unwrap_or("Unmapped");
        let target = if mapping.is_mapped() {
            format!("{} {}", mapping.kind, mapping.index)
        } else {
            "-".to_string()
        };
        match &mapping.axis_config {
            Some(cfg) => println!(
                "{:<14} {:<10} {:<16} min {} max {} inverted {} {:?}",
                action.label, target, label, cfg.min, cfg.max, cfg.inverted, cfg.normalize
            ),
            None => println!("{:<14} {:<10} {}", action.label, target, label),
        }
    }
}

fn show(config: &Config, device: Option<&str>) -> Result<()> {
    let mut engine = build_engine(config, Diagnostics::default());
    let id = select_device(&mut engine, device, config)?;
    println!("Mappings for {}", id);
    print_table(&engine);
    Ok(())
}

async fn remap(config: &Config, action: ActionKey, kind: Option<InputKind>, device: Option<&str>) -> Result<()> {
    let mut engine = build_engine(config, Diagnostics::default());
    select_device(&mut engine, device, config)?;

    // Baseline comes from a real reading, not the empty pre-poll snapshot
    engine.tick(Instant::now());
    engine.arm_remap(action, kind, Instant::now())?;
    println!("Press a button or move an axis for '{}' (Ctrl+C to cancel)", action);

    let mut poll_interval = interval(Duration::from_millis(config.device.poll_interval_ms));
    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                match engine.tick(Instant::now()).remap {
                    RemapEvent::Committed { action, input, assignment } => {
                        let label = engine.input_label_for(action).unwrap_or("Unknown");
                        println!("{} -> {} ({})", action, input, label);
                        for cleared in assignment.cleared {
                            println!("  {} is now unmapped", cleared);
                        }
                        for shared in assignment.shared {
                            println!("  still shared with {}", shared);
                        }
                        return Ok(());
                    }
                    RemapEvent::TimedOut { action } => {
                        println!("No input detected for '{}', nothing changed", action);
                        return Ok(());
                    }
                    RemapEvent::Idle | RemapEvent::Waiting => {}
                }
            }

            _ = tokio::signal::ctrl_c() => {
                engine.cancel_remap();
                println!("Remap cancelled, nothing changed");
                return Ok(());
            }
        }
    }
}

fn edit_axis(
    config: &Config,
    action: ActionKey,
    overrides: AxisOverrides,
    reset: bool,
    device: Option<&str>,
) -> Result<()> {
    let mut engine = build_engine(config, Diagnostics::default());
    let id = select_device(&mut engine, device, config)?;

    let updated = if reset {
        engine.reset_axis_config(action)?
    } else {
        let current = engine
            .mappings()
            .get(action)
            .and_then(|m| m.axis_config)
            .or_else(|| engine.catalog().get(action).map(|a| a.default_axis_config()))
            .unwrap_or_default();
        let updated = overrides.apply(current);
        engine.set_axis_config(action, updated)?;
        updated
    };

    println!("Axis config of '{}' on {}: {:?}", action, id, updated);
    Ok(())
}
