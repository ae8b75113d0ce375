//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! client pointed at `ws://localhost:8765`.

use serde::de::Error;
use serde::Deserialize;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use tokio::time::Duration;

use crate::error::{PulseError, Result};
use crate::map::MapView;
use crate::telemetry::controller::ControllerSettings;
use crate::telemetry::sample::GeoPosition;
use crate::transport::framing::{Framing, DEFAULT_EVENT, DEFAULT_HANDSHAKE};
use crate::transport::manager::ReconnectPolicy;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub buffer: BufferConfig,

    #[serde(default)]
    pub watchdog: WatchdogConfig,

    #[serde(default)]
    pub map: MapConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay wire dialect
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// One JSON object per WebSocket text frame
    Websocket,

    /// Socket.IO events over WebSocket
    Socketio,
}

/// Connection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_protocol")]
    pub protocol: Protocol,

    /// Identification token sent after connecting (websocket protocol)
    #[serde(default = "default_handshake")]
    pub handshake: String,

    /// Event name carrying telemetry (socketio protocol)
    #[serde(default = "default_event")]
    pub event: String,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Unset means retry forever
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Rolling history configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BufferConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

/// Liveness watchdog configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WatchdogConfig {
    #[serde(default = "default_stale_timeout_ms")]
    pub stale_timeout_ms: u64,
}

/// Map configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    #[serde(default = "default_latitude")]
    pub default_latitude: f64,

    #[serde(default = "default_longitude")]
    pub default_longitude: f64,

    #[serde(default = "default_zoom")]
    pub default_zoom: u8,
}

/// Console renderer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily-rotated log files; console only when unset
    #[serde(default)]
    pub file_dir: Option<String>,
}

// Default value functions
fn default_url() -> String { "ws://localhost:8765".to_string() }
fn default_protocol() -> Protocol { Protocol::Websocket }
fn default_handshake() -> String { DEFAULT_HANDSHAKE.to_string() }
fn default_event() -> String { DEFAULT_EVENT.to_string() }
fn default_reconnect_interval_ms() -> u64 { 1000 }
fn default_connect_timeout_ms() -> u64 { 5000 }

fn default_capacity() -> usize { 50 }

fn default_stale_timeout_ms() -> u64 { 5000 }

fn default_latitude() -> f64 { 45.4642 }
fn default_longitude() -> f64 { 9.19 }
fn default_zoom() -> u8 { 13 }

fn default_status_interval_ms() -> u64 { 5000 }

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            protocol: default_protocol(),
            handshake: default_handshake(),
            event: default_event(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_attempts: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { capacity: default_capacity() }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self { stale_timeout_ms: default_stale_timeout_ms() }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_latitude: default_latitude(),
            default_longitude: default_longitude(),
            default_zoom: default_zoom(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { status_interval_ms: default_status_interval_ms() }
    }
}

fn invalid(msg: impl Display) -> PulseError {
    PulseError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pulse_monitor::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        let transport = &self.transport;

        // Validate endpoint
        if transport.url.is_empty() {
            return Err(invalid("transport url cannot be empty"));
        }

        if transport.url.starts_with("wss://") || transport.url.starts_with("https://") {
            return Err(invalid(
                "TLS endpoints (wss://, https://) are not supported; use ws:// or http://",
            ));
        }

        if !transport.url.starts_with("ws://") && !transport.url.starts_with("http://") {
            return Err(invalid("transport url must start with ws:// or http://"));
        }

        if transport.protocol == Protocol::Websocket && transport.url.starts_with("http://") {
            return Err(invalid("http:// urls are only valid with protocol = \"socketio\""));
        }

        if transport.protocol == Protocol::Socketio && transport.event.is_empty() {
            return Err(invalid("event cannot be empty when protocol is socketio"));
        }

        // Validate timing fields
        if transport.reconnect_interval_ms == 0 || transport.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        if transport.connect_timeout_ms == 0 || transport.connect_timeout_ms > 60000 {
            return Err(invalid("connect_timeout_ms must be between 1 and 60000"));
        }

        if self.watchdog.stale_timeout_ms < 100 || self.watchdog.stale_timeout_ms > 600_000 {
            return Err(invalid("stale_timeout_ms must be between 100 and 600000"));
        }

        if self.display.status_interval_ms < 100 || self.display.status_interval_ms > 3_600_000 {
            return Err(invalid("status_interval_ms must be between 100 and 3600000"));
        }

        // Validate buffer size
        if self.buffer.capacity == 0 || self.buffer.capacity > 10_000 {
            return Err(invalid("buffer capacity must be between 1 and 10000"));
        }

        // Validate default map view
        if !(-90.0..=90.0).contains(&self.map.default_latitude) {
            return Err(invalid("default_latitude must be between -90 and 90"));
        }

        if !(-180.0..=180.0).contains(&self.map.default_longitude) {
            return Err(invalid("default_longitude must be between -180 and 180"));
        }

        if self.map.default_zoom > 19 {
            return Err(invalid("default_zoom must be between 0 and 19"));
        }

        if let Some(dir) = &self.logging.file_dir {
            if dir.is_empty() {
                return Err(invalid("logging file_dir cannot be empty when set"));
            }
        }

        Ok(())
    }

    /// Parameters for the telemetry controller
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            capacity: self.buffer.capacity,
            stale_timeout: Duration::from_millis(self.watchdog.stale_timeout_ms),
            default_view: MapView {
                // Checked finite and in range by validate()
                center: GeoPosition {
                    latitude: self.map.default_latitude,
                    longitude: self.map.default_longitude,
                },
                zoom: self.map.default_zoom,
            },
        }
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.display.status_interval_ms)
    }
}

impl TransportConfig {
    pub fn framing(&self) -> Framing {
        match self.protocol {
            Protocol::Websocket => Framing::Plain {
                handshake: self.handshake.clone(),
            },
            Protocol::Socketio => Framing::SocketIo {
                event: self.event.clone(),
            },
        }
    }

    /// Full endpoint URL for the configured dialect
    pub fn endpoint(&self) -> String {
        self.framing().endpoint(&self.url)
    }

    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: Duration::from_millis(self.reconnect_interval_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
