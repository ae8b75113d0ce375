//! # Transport Module
//!
//! Handles the persistent connection to the telemetry relay.
//!
//! This module handles:
//! - Connecting over WebSocket (plain JSON frames or Socket.IO)
//! - Identification handshake and protocol keep-alive replies
//! - Decoding inbound frames into telemetry readings
//! - Disconnect detection and fixed-interval reconnection

pub mod channel;
pub mod framing;
pub mod manager;
pub mod websocket;

pub use channel::{Channel, Connector};
pub use framing::Framing;
pub use manager::{ReconnectPolicy, TransportEvent, TransportHandle, TransportManager};
pub use websocket::WsConnector;
