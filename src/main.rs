//! # Pulse Monitor
//!
//! Console front end for the live heart-rate telemetry client.
//!
//! Connects to the relay, logs a status line at a fixed interval and logs
//! every map command a map renderer would receive.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::interval;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use pulse_monitor::config::{Config, LoggingConfig};
use pulse_monitor::map::MapCommand;
use pulse_monitor::session::{Session, SessionOptions};
use pulse_monitor::telemetry::{ConnectionState, TelemetrySnapshot};
use pulse_monitor::transport::WsConnector;

/// Configuration file picked up when `--config` is not given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log file name prefix inside `[logging] file_dir`
const LOG_FILE_PREFIX: &str = "pulse-monitor.log";

#[derive(Debug, Parser)]
#[command(name = "pulse-monitor", version, about = "Live heart-rate telemetry monitor")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Relay URL, overrides `[transport] url`
    #[arg(short, long)]
    url: Option<String>,
}

/// Main entry point for Pulse Monitor
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load and validate configuration (file, then CLI overrides)
///    - Set up logging (console, plus daily files when configured)
///    - Start the session: transport task and event loop
///
/// 2. **Main Loop**
///    - Log a status line every `status_interval_ms`
///    - Log map commands as they are produced
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Cancel any pending reconnect and close the channel
///    - Log the final counters
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let _log_guard = init_logging(&config.logging)?;

    info!("Pulse Monitor v{} starting...", env!("CARGO_PKG_VERSION"));

    let connector =
        WsConnector::new(config.transport.endpoint(), config.transport.connect_timeout());
    let mut session = Session::start(connector, SessionOptions::from_config(&config));

    let mut status = interval(config.status_interval());
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = status.tick() => {
                let snapshot = session.get_snapshot();
                info!("{}", status_line(&snapshot));
                debug!("Snapshot: {}", serde_json::to_string(&snapshot)?);
            }

            Some(command) = session.next_command() => {
                info!("Map: {}", describe_command(&command));
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    let last = session.shutdown().await;
    info!("Final state: {}", status_line(&last));
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG_PATH))?,
        None => Config::default(),
    };

    if let Some(url) = &args.url {
        config.transport.url = url.clone();
        config.validate().context("Invalid --url")?;
    }

    Ok(config)
}

/// Install the tracing subscriber
///
/// The returned guard flushes the file writer on drop and must outlive the
/// runtime's last log line.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    match &logging.file_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

/// One-line summary of a snapshot
fn status_line(snapshot: &TelemetrySnapshot) -> String {
    let state = match (snapshot.connection_state, snapshot.retry_in_ms) {
        (ConnectionState::Connecting, _) => "connecting".to_string(),
        (ConnectionState::Open, _) => "live".to_string(),
        (ConnectionState::Stale, _) => "stale".to_string(),
        (ConnectionState::Closed, Some(ms)) => format!("disconnected, retry in {} ms", ms),
        (ConnectionState::Closed, None) => "disconnected".to_string(),
    };

    let reading = match &snapshot.latest_sample {
        Some(sample) => format!(
            "{} bpm at {} ({})",
            sample.value(),
            sample.label(),
            sample.device_type().as_str()
        ),
        None => "no reading".to_string(),
    };

    let position = match snapshot.last_position {
        Some(pos) => format!("{:.5},{:.5}", pos.latitude, pos.longitude),
        None => "no fix".to_string(),
    };

    format!(
        "[{}] {} | {} samples | {} ({:?}) | rx {} rejected {}",
        state,
        reading,
        snapshot.samples.len(),
        position,
        snapshot.map_mode,
        snapshot.stats.messages_received,
        snapshot.stats.readings_rejected
    )
}

fn describe_command(command: &MapCommand) -> String {
    match command {
        MapCommand::MoveMarker(pos) => {
            format!("marker -> {:.5},{:.5}", pos.latitude, pos.longitude)
        }
        MapCommand::Recenter(pos) => {
            format!("recenter -> {:.5},{:.5}", pos.latitude, pos.longitude)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_monitor::map::{MapMode, MapView};
    use pulse_monitor::telemetry::controller::IngestStats;
    use pulse_monitor::telemetry::sample::{GeoPosition, Reading, Sample};
    use std::sync::Arc;

    fn snapshot(state: ConnectionState) -> TelemetrySnapshot {
        TelemetrySnapshot {
            latest_sample: None,
            samples: Arc::from(Vec::<Sample>::new()),
            connection_state: state,
            last_position: None,
            map_mode: MapMode::Auto,
            default_view: MapView {
                center: GeoPosition::new(45.4642, 9.19).unwrap(),
                zoom: 13,
            },
            last_message_at: None,
            retry_in_ms: None,
            stats: IngestStats::default(),
        }
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["pulse-monitor", "--url", "ws://10.0.0.2:8765"]);
        assert_eq!(args.url.as_deref(), Some("ws://10.0.0.2:8765"));
        assert!(args.config.is_none());
    }

    #[test]
    fn test_url_override_is_validated() {
        let args = Args::parse_from(["pulse-monitor", "--url", "wss://secure.example.com"]);
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_status_line_waiting() {
        let line = status_line(&snapshot(ConnectionState::Connecting));
        assert!(line.starts_with("[connecting] no reading"));
        assert!(line.contains("no fix"));
    }

    #[test]
    fn test_status_line_live() {
        let mut snap = snapshot(ConnectionState::Open);
        let pos = GeoPosition::new(45.47, 9.2).unwrap();
        let sample = Sample::from_reading(&Reading::with_value(72)).unwrap();
        snap.samples = Arc::from(vec![sample.clone()]);
        snap.latest_sample = Some(sample);
        snap.last_position = Some(pos);
        snap.map_mode = MapMode::Manual;

        let line = status_line(&snap);
        assert!(line.starts_with("[live] 72 bpm"));
        assert!(line.contains("1 samples"));
        assert!(line.contains("45.47000,9.20000 (Manual)"));
    }

    #[test]
    fn test_status_line_retry() {
        let mut snap = snapshot(ConnectionState::Closed);
        snap.retry_in_ms = Some(1000);
        assert!(status_line(&snap).starts_with("[disconnected, retry in 1000 ms]"));
    }

    #[test]
    fn test_describe_command() {
        let pos = GeoPosition::new(1.0, 2.0).unwrap();
        assert_eq!(describe_command(&MapCommand::Recenter(pos)), "recenter -> 1.00000,2.00000");
        assert_eq!(describe_command(&MapCommand::MoveMarker(pos)), "marker -> 1.00000,2.00000");
    }
}
