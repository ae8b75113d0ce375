//! # Telemetry Controller
//!
//! Reconciles transport events, watchdog firings and map gestures into one
//! renderable state.
//!
//! For every decoded reading:
//! 1. Reject non-positive values (counted, not buffered, watchdog not fed)
//! 2. Push the sample into the ring buffer
//! 3. Feed the liveness watchdog
//! 4. Record the position, if any, and decide marker-only vs. recenter

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::ring_buffer::{BufferSnapshot, SampleRingBuffer};
use super::sample::{GeoPosition, Reading, Sample};
use super::watchdog::{LivenessWatchdog, StaleSignal};
use crate::map::{InteractionOrigin, MapAutonomyState, MapCommand, MapMode, MapView};
use crate::transport::TransportEvent;

/// Connection health shown to the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Connect attempt in progress (first one or after the retry delay)
    Connecting,

    /// Channel open and data flowing
    Open,

    /// Channel open but no valid sample within the stale timeout
    Stale,

    /// Channel down (a reconnect may be pending)
    Closed,
}

/// Ingestion counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Decoded messages, valid or not
    pub messages_received: u64,

    /// Messages whose value was zero or negative
    pub readings_rejected: u64,

    /// Watchdog firings
    pub stale_signals: u64,

    /// Successful connections
    pub connections_opened: u64,
}

/// Everything a renderer needs, detached from the controller
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub latest_sample: Option<Sample>,
    pub samples: BufferSnapshot,
    pub connection_state: ConnectionState,
    pub last_position: Option<GeoPosition>,
    pub map_mode: MapMode,
    pub default_view: MapView,
    /// Arrival time of the last decoded message, valid or not
    pub last_message_at: Option<DateTime<Utc>>,
    /// Delay before the next reconnect attempt while closed
    pub retry_in_ms: Option<u64>,
    pub stats: IngestStats,
}

/// Construction parameters for [`TelemetryController`]
#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub capacity: usize,
    pub stale_timeout: Duration,
    pub default_view: MapView,
}

/// Owner of the buffer, the watchdog and the map follow state
#[derive(Debug)]
pub struct TelemetryController {
    buffer: SampleRingBuffer,
    watchdog: LivenessWatchdog,
    map: MapAutonomyState,
    stale_timeout: Duration,
    default_view: MapView,
    connection: ConnectionState,
    latest: Option<Sample>,
    last_position: Option<GeoPosition>,
    last_message_at: Option<DateTime<Utc>>,
    retry_in: Option<Duration>,
    stats: IngestStats,
}

impl TelemetryController {
    pub fn new(settings: ControllerSettings) -> Self {
        Self {
            buffer: SampleRingBuffer::new(settings.capacity),
            watchdog: LivenessWatchdog::new(settings.stale_timeout),
            map: MapAutonomyState::new(),
            stale_timeout: settings.stale_timeout,
            default_view: settings.default_view,
            connection: ConnectionState::Connecting,
            latest: None,
            last_position: None,
            last_message_at: None,
            retry_in: None,
            stats: IngestStats::default(),
        }
    }

    /// Apply one transport event
    ///
    /// # Returns
    ///
    /// * `Vec<MapCommand>` - Map updates to hand to the renderer (possibly empty)
    pub fn handle_event(&mut self, event: TransportEvent) -> Vec<MapCommand> {
        match event {
            TransportEvent::Connecting => {
                self.set_connection(ConnectionState::Connecting);
                self.retry_in = None;
                self.watchdog.stop();
                Vec::new()
            }
            TransportEvent::Opened => {
                self.set_connection(ConnectionState::Open);
                self.retry_in = None;
                self.stats.connections_opened += 1;
                self.watchdog.arm(self.stale_timeout);
                Vec::new()
            }
            TransportEvent::Closed { reason, retry_in } => {
                debug!("Transport closed: {}", reason);
                self.set_connection(ConnectionState::Closed);
                self.retry_in = retry_in;
                self.watchdog.stop();
                Vec::new()
            }
            TransportEvent::Telemetry(reading) => self.on_reading(reading),
        }
    }

    /// Ingest one decoded reading
    pub fn on_reading(&mut self, reading: Reading) -> Vec<MapCommand> {
        self.stats.messages_received += 1;
        self.last_message_at = Some(Utc::now());

        match Sample::from_reading(&reading) {
            Some(sample) => {
                debug!(
                    "Sample: {} bpm ({}, {})",
                    sample.value(),
                    sample.device_type().as_str(),
                    sample.label()
                );
                self.buffer.push(sample.clone());
                self.latest = Some(sample);
                self.watchdog.feed();

                if self.connection == ConnectionState::Stale {
                    info!("Telemetry resumed");
                    self.set_connection(ConnectionState::Open);
                }
            }
            None => {
                self.stats.readings_rejected += 1;
                debug!("No reading (heart_rate = {}), not buffered", reading.heart_rate);
            }
        }

        let mut commands = Vec::new();
        if let Some(position) = reading.position {
            self.last_position = Some(position);
            commands.push(MapCommand::MoveMarker(position));
            if self.map.should_recenter(&position) {
                commands.push(MapCommand::Recenter(position));
            }
        }
        commands
    }

    /// Wait for the watchdog; cancel-safe, never resolves while it is idle
    pub async fn next_stale(&mut self) -> StaleSignal {
        self.watchdog.expired().await
    }

    /// Apply a watchdog firing
    pub fn on_stale(&mut self, signal: StaleSignal) {
        self.stats.stale_signals += 1;
        match self.connection {
            ConnectionState::Open => {
                warn!(
                    "No valid telemetry for {} ms; data is stale",
                    signal.silent_for.as_millis()
                );
                self.set_connection(ConnectionState::Stale);
            }
            ConnectionState::Stale => {
                debug!("Still stale ({} periods)", signal.consecutive);
            }
            // Closed wins over stale
            ConnectionState::Connecting | ConnectionState::Closed => {}
        }
    }

    /// Pan/zoom reported by the map renderer
    pub fn notify_user_interaction(&mut self, origin: InteractionOrigin) {
        self.map.on_user_interaction(origin);
    }

    /// Explicit recenter: back to follow mode plus a one-time jump
    ///
    /// # Returns
    ///
    /// * `Option<MapCommand>` - Recenter to the latest position, if one is known
    pub fn request_recenter(&mut self) -> Option<MapCommand> {
        self.map.on_recenter_requested();
        self.last_position.map(MapCommand::Recenter)
    }

    /// Pure read of the current state
    pub fn current_snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            latest_sample: self.latest.clone(),
            samples: self.buffer.snapshot(),
            connection_state: self.connection,
            last_position: self.last_position,
            map_mode: self.map.mode(),
            default_view: self.default_view,
            last_message_at: self.last_message_at,
            retry_in_ms: self.retry_in.map(|d| d.as_millis() as u64),
            stats: self.stats,
        }
    }

    /// Teardown: stop the watchdog and mark the connection closed
    pub fn shutdown(&mut self) {
        self.watchdog.stop();
        self.retry_in = None;
        self.set_connection(ConnectionState::Closed);
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn buffer(&self) -> &SampleRingBuffer {
        &self.buffer
    }

    fn set_connection(&mut self, next: ConnectionState) {
        if self.connection != next {
            info!("Connection state: {:?} -> {:?}", self.connection, next);
            self.connection = next;
        }
    }
}
