//! telemetry-link - Main Entry Point
//!
//! Runs a device session against the configured hub: reads telemetry records
//! as JSON lines, publishes the most recent one on every telemetry interval
//! and logs LED commands received from the cloud.

use clap::{Parser, Subcommand};
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use telemetry_link::clock::{SystemTimeSource, TimeSource};
use telemetry_link::config::{ConfigError, DeviceConfig};
use telemetry_link::credential::{build_token, CredentialError};
use telemetry_link::error::{sanitize_error_message, DeviceResult};
use telemetry_link::observability::{init_default_logging, init_logging, LogFormat};
use telemetry_link::protocol::TelemetryRecord;
use telemetry_link::session::{InboundDispatcher, PublishError, SessionController, TickOutcome};
use telemetry_link::transport::mqtt::MqttTransport;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn, Level};

/// Cadence of session ticks while running
const TICK_INTERVAL_MS: u64 = 50;

const DEFAULT_CONFIG_PATHS: &[&str] = &["device.toml", "config/device.toml"];

type RecordLines = Lines<BufReader<Box<dyn AsyncRead + Unpin + Send>>>;

/// Self-signing MQTT telemetry link
#[derive(Parser)]
#[command(name = "telemetry-link")]
#[command(about = "Publish device telemetry to an IoT hub over MQTT with self-signed SAS credentials")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the device session
    Run {
        /// Read telemetry JSON lines from FILE instead of stdin
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,
    },
    /// Print a SAS token for the configured device
    Token {
        /// Expiry as epoch seconds (default: now + credential lifetime)
        #[arg(long, value_name = "EPOCH")]
        expiry: Option<u64>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration (key redacted)
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_cli_logging(cli.verbose);

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { input } => run_device(config, input).await,
        Commands::Token { expiry } => print_token(&config, expiry),
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e.sanitized());
        process::exit(1);
    }
}

fn init_cli_logging(verbose: u8) {
    let level = match verbose {
        0 => {
            init_default_logging();
            return;
        }
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let format = LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()));
    init_logging(level, format, false);
}

fn load_configuration(config_path: Option<&Path>) -> Result<DeviceConfig, ConfigError> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return DeviceConfig::load_from_file(path);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return DeviceConfig::load_from_file(path);
        }
    }

    Err(ConfigError::InvalidConfig(
        "No configuration file found. Provide one with -c/--config or create device.toml"
            .to_string(),
    ))
}

async fn run_device(config: DeviceConfig, input: Option<PathBuf>) -> DeviceResult<()> {
    info!(
        device_id = %config.device.device_id,
        "Starting telemetry-link v{}",
        env!("CARGO_PKG_VERSION")
    );

    let transport = MqttTransport::new(&config.device.hostname, config.mqtt.clone());
    let dispatcher = InboundDispatcher::new(|on| {
        info!(led = if on { "on" } else { "off" }, "LED state changed");
    });
    let mut session =
        SessionController::new(&config, transport, SystemTimeSource::new(), dispatcher)?;

    let mut records = open_records(input.as_deref()).await?;
    let mut input_open = true;
    let mut latest: Option<TelemetryRecord> = None;

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let mut ticks = interval(Duration::from_millis(TICK_INTERVAL_MS));
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut telemetry = interval(Duration::from_millis(config.telemetry.interval_ms));
    telemetry.set_missed_tick_behavior(MissedTickBehavior::Skip);

    log_outcome(session.begin().await);

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            _ = ticks.tick() => {
                log_outcome(session.tick().await);
            }
            _ = telemetry.tick() => {
                let Some(record) = latest.take() else {
                    debug!("No new telemetry record this interval");
                    continue;
                };
                match session.publish(&record).await {
                    Ok(()) => {}
                    Err(PublishError::NotConnected { state }) => {
                        debug!("Telemetry dropped while {:?}", state);
                    }
                    Err(e) => warn!("Telemetry dropped: {}", sanitize_error_message(&e.to_string())),
                }
            }
            line = records.next_line(), if input_open => match line {
                Ok(Some(line)) => {
                    if let Some(record) = parse_record(&line) {
                        latest = Some(record);
                    }
                }
                Ok(None) => {
                    info!("Telemetry input closed");
                    input_open = false;
                }
                Err(e) => {
                    warn!("Telemetry input failed: {}", e);
                    input_open = false;
                }
            },
        }
    }

    let metrics = session.metrics().clone();
    session.disconnect().await?;
    info!(
        connect_attempts = metrics.connect_attempts,
        publishes_sent = metrics.publishes_sent,
        commands_received = metrics.commands_received,
        "Shutdown complete"
    );
    Ok(())
}

async fn open_records(input: Option<&Path>) -> std::io::Result<RecordLines> {
    let reader: Box<dyn AsyncRead + Unpin + Send> = match input {
        Some(path) => {
            info!("Reading telemetry from: {}", path.display());
            Box::new(tokio::fs::File::open(path).await?)
        }
        None => Box::new(tokio::io::stdin()),
    };
    Ok(BufReader::new(reader).lines())
}

fn parse_record(line: &str) -> Option<TelemetryRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<TelemetryRecord>(line) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Skipping malformed telemetry record: {}", e);
            None
        }
    }
}

fn log_outcome(outcome: TickOutcome) {
    match outcome {
        TickOutcome::Connected { generation } => {
            info!(credential_generation = generation, "Session connected");
        }
        TickOutcome::ClockUnavailable => debug!("Waiting for clock synchronization"),
        TickOutcome::ConnectFailed => {
            debug!("Connect attempt failed, retrying after reconnect interval");
        }
        TickOutcome::ConnectionLost => debug!("Session lost, reconnect pending"),
        TickOutcome::Serviced { inbound } if inbound > 0 => {
            debug!(inbound, "Serviced session");
        }
        TickOutcome::Serviced { .. } | TickOutcome::Waiting { .. } => {}
    }
}

fn print_token(config: &DeviceConfig, expiry: Option<u64>) -> DeviceResult<()> {
    let key = config.device_key()?;
    let expiry = match expiry {
        Some(expiry) => expiry,
        None => {
            let now = SystemTimeSource::new().epoch_seconds();
            if now == 0 {
                return Err(CredentialError::NoTimeSource.into());
            }
            now.saturating_add(config.credential.lifetime_secs)
        }
    };

    let token = build_token(&config.device.hostname, &config.device.device_id, &key, expiry)?;
    println!("{token}");
    Ok(())
}

fn handle_config_command(config: &DeviceConfig, show: bool) -> DeviceResult<()> {
    if show {
        println!("{}", config.to_redacted_toml()?);
    }

    info!("Configuration validation complete");
    Ok(())
}
