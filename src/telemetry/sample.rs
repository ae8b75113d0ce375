//! # Telemetry Types
//!
//! Core data definitions shared by the transport, the controller and renderers.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// Sensor family that produced a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Chest strap (standard BLE Heart Rate Measurement)
    Band,

    /// Optical arm band
    Armband,

    /// Anything the relay did not identify
    Unknown,
}

impl DeviceType {
    /// Map the relay's `device_type` string onto a known family
    ///
    /// Matching is case-insensitive; unrecognised names map to `Unknown`.
    ///
    /// # Examples
    ///
    /// ```
    /// use pulse_monitor::telemetry::sample::DeviceType;
    ///
    /// assert_eq!(DeviceType::from_wire("heartRateBand"), DeviceType::Band);
    /// assert_eq!(DeviceType::from_wire("armband"), DeviceType::Armband);
    /// assert_eq!(DeviceType::from_wire("COOSPO"), DeviceType::Unknown);
    /// ```
    pub fn from_wire(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "heartrateband" | "heart_rate_band" | "band" => DeviceType::Band,
            "armband" | "arm_band" => DeviceType::Armband,
            _ => DeviceType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Band => "band",
            DeviceType::Armband => "armband",
            DeviceType::Unknown => "unknown",
        }
    }
}

/// Geographic position reported alongside a reading
///
/// Only finiteness is enforced. Out-of-range or `(0, 0)` coordinates are
/// passed through to the map as received.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPosition {
    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,
}

impl GeoPosition {
    /// Build a position, returning `None` if either coordinate is NaN or infinite
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if latitude.is_finite() && longitude.is_finite() {
            Some(Self { latitude, longitude })
        } else {
            None
        }
    }
}

/// A validated heart-rate reading
///
/// Constructed only through [`Sample::from_reading`], which refuses
/// non-positive values, so every `Sample` in the system carries a real reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    value: u32,
    timestamp: DateTime<Utc>,
    device_type: DeviceType,
    device_id: Option<String>,
    rr_intervals: Vec<f64>,
    label: String,
}

impl Sample {
    /// Promote a raw reading into a sample
    ///
    /// Returns `None` when the heart-rate value is not positive.
    pub fn from_reading(reading: &Reading) -> Option<Self> {
        let value = u32::try_from(reading.heart_rate).ok().filter(|v| *v > 0)?;

        Some(Self {
            value,
            timestamp: reading.timestamp,
            device_type: reading.device_type,
            device_id: reading.device_id.clone(),
            rr_intervals: reading.rr_intervals.clone(),
            label: reading
                .timestamp
                .with_timezone(&Local)
                .format("%H:%M:%S")
                .to_string(),
        })
    }

    /// Heart rate in beats per minute
    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Beat-to-beat intervals in milliseconds, when the sensor reports them
    pub fn rr_intervals(&self) -> &[f64] {
        &self.rr_intervals
    }

    /// Chart axis label (local wall-clock time of the reading)
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// One decoded inbound message, before value validation
///
/// `heart_rate` is kept signed so that `0` and negative values survive
/// decoding and can be counted as "no reading" by the controller. A message
/// with no `heart_rate` at all never becomes a `Reading`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub heart_rate: i64,
    pub timestamp: DateTime<Utc>,
    pub device_type: DeviceType,
    pub device_id: Option<String>,
    pub rr_intervals: Vec<f64>,
    pub position: Option<GeoPosition>,
}

impl Reading {
    /// Reading with only a value, stamped now. Mostly useful in tests.
    pub fn with_value(heart_rate: i64) -> Self {
        Self {
            heart_rate,
            timestamp: Utc::now(),
            device_type: DeviceType::Unknown,
            device_id: None,
            rr_intervals: Vec::new(),
            position: None,
        }
    }

    /// Attach a position
    pub fn at(mut self, position: GeoPosition) -> Self {
        self.position = Some(position);
        self
    }
}
