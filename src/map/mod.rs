//! # Map Module
//!
//! Viewport follow logic for the live position map.
//!
//! This module handles:
//! - Follow (auto) vs. user-controlled (manual) viewport state
//! - The commands handed to the map renderer (marker moves, recenters)
//! - The default view shown before any position arrives

pub mod autonomy;

use serde::Serialize;

use crate::telemetry::sample::GeoPosition;

pub use autonomy::{InteractionOrigin, MapAutonomyState, MapMode};

/// Instruction for the map renderer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "position", rename_all = "snake_case")]
pub enum MapCommand {
    /// Move the position marker; the viewport stays where it is
    MoveMarker(GeoPosition),

    /// Move the viewport so the given position is centered
    Recenter(GeoPosition),
}

/// Initial viewport used until the first position is known
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapView {
    pub center: GeoPosition,
    pub zoom: u8,
}
