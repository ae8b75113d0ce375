//! # Pulse Monitor Library
//!
//! Live heart-rate telemetry client for a monitoring dashboard.
//!
//! This library keeps a persistent, self-healing connection to a telemetry
//! relay, holds a bounded rolling history of recent samples, flags silent
//! stalls and decides whether the position map follows new fixes or stays
//! where the user left it.

pub mod config;
pub mod error;
pub mod map;
pub mod session;
pub mod telemetry;
pub mod transport;
