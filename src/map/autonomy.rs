//! # Map Autonomy State
//!
//! Decides whether a new position should move the viewport or only the marker.
//!
//! The viewport follows incoming positions until the user pans or zooms. From
//! then on only the marker moves, and control is never taken back silently;
//! only an explicit recenter request returns the map to follow mode.

use serde::Serialize;
use tracing::{debug, info};

use crate::telemetry::sample::GeoPosition;

/// Who is driving the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MapMode {
    /// Follow incoming positions
    Auto,

    /// The user has taken control
    Manual,
}

/// Origin of a pan/zoom gesture reported by the map renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionOrigin {
    /// Pointer, touch, wheel or keyboard input
    User,

    /// Camera move issued by the application itself (e.g. a recenter)
    Programmatic,
}

/// Follow/manual state machine for the map viewport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapAutonomyState {
    mode: MapMode,
}

impl MapAutonomyState {
    pub fn new() -> Self {
        Self { mode: MapMode::Auto }
    }

    /// A pan or zoom happened
    ///
    /// User gestures switch to `Manual` (idempotent). Programmatic camera
    /// moves are ignored, otherwise our own recenter would immediately hand
    /// control back to the user.
    ///
    /// # Returns
    ///
    /// * `bool` - `true` if this call changed the mode
    pub fn on_user_interaction(&mut self, origin: InteractionOrigin) -> bool {
        match origin {
            InteractionOrigin::Programmatic => {
                debug!("Ignoring programmatic map move");
                false
            }
            InteractionOrigin::User => self.transition(MapMode::Manual),
        }
    }

    /// Explicit "recenter" action: back to `Auto` (idempotent)
    ///
    /// The caller is expected to issue one recenter to the latest known
    /// position right away.
    ///
    /// # Returns
    ///
    /// * `bool` - `true` if this call changed the mode
    pub fn on_recenter_requested(&mut self) -> bool {
        self.transition(MapMode::Auto)
    }

    /// Whether a new position should also move the viewport. Pure query.
    pub fn should_recenter(&self, _position: &GeoPosition) -> bool {
        self.mode == MapMode::Auto
    }

    pub fn mode(&self) -> MapMode {
        self.mode
    }

    fn transition(&mut self, next: MapMode) -> bool {
        if self.mode == next {
            return false;
        }
        info!("Map follow mode: {:?} -> {:?}", self.mode, next);
        self.mode = next;
        true
    }
}

impl Default for MapAutonomyState {
    fn default() -> Self {
        Self::new()
    }
}
