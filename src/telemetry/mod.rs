//! # Telemetry Module
//!
//! Ingestion and state reconciliation for live heart-rate telemetry.
//!
//! This module handles:
//! - Decoding JSON telemetry payloads into readings
//! - Validating readings into samples
//! - Keeping a rolling window of recent samples
//! - Detecting silent upstream stalls (liveness watchdog)
//! - Exposing a renderable snapshot of it all

pub mod controller;
pub mod payload;
pub mod ring_buffer;
pub mod sample;
pub mod watchdog;

pub use controller::{ConnectionState, ControllerSettings, TelemetryController, TelemetrySnapshot};
pub use ring_buffer::SampleRingBuffer;
pub use sample::{DeviceType, GeoPosition, Reading, Sample};
pub use watchdog::{LivenessWatchdog, StaleSignal};
