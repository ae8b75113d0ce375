//! # Wire Framing
//!
//! Turns raw text frames into telemetry payloads for the two supported relay
//! dialects.
//!
//! ## Plain WebSocket
//!
//! Every text frame is one JSON telemetry object. Right after connecting the
//! client sends a fixed identification token so the relay files it as a viewer.
//!
//! ## Socket.IO (Engine.IO v4 over WebSocket)
//!
//! ```text
//! 0{"sid":..}            server open        -> reply "40" (join default namespace)
//! 2                      ping               -> reply "3"
//! 40{"sid":..}           namespace joined
//! 42["event",{...}]      event              -> payload if the name matches
//! 42/ns,17["event",{..}] event with namespace and ack id
//! 41 / 1                 disconnect / close -> channel closed
//! 44{...}                connect error
//! ```

use serde_json::Value;
use tracing::debug;

use crate::error::{PulseError, Result};
use crate::telemetry::payload::parse_json;

/// Default identification token sent on plain WebSocket connections
pub const DEFAULT_HANDSHAKE: &str = "dashboard";

/// Default Socket.IO event carrying telemetry
pub const DEFAULT_EVENT: &str = "new_heart_rate";

/// Path and query of the Engine.IO WebSocket endpoint
pub const SOCKETIO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// What a decoded frame asks the transport to do
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A telemetry object to decode into a reading
    Payload(Value),

    /// Protocol control reply to send back (pong, namespace connect)
    Reply(String),

    /// Nothing to do
    Ignore,

    /// Server ended the session
    Close,
}

/// Wire dialect spoken by the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// One JSON object per text frame
    Plain {
        /// Sent once right after connecting; empty means no handshake
        handshake: String,
    },

    /// Socket.IO v5 over Engine.IO v4
    SocketIo {
        /// Event name carrying telemetry
        event: String,
    },
}

impl Framing {
    /// Messages to send as soon as the channel is open
    pub fn on_open(&self) -> Vec<String> {
        match self {
            Framing::Plain { handshake } if !handshake.is_empty() => vec![handshake.clone()],
            Framing::Plain { .. } => Vec::new(),
            // Socket.IO waits for the server's open packet first
            Framing::SocketIo { .. } => Vec::new(),
        }
    }

    /// Decode one text frame
    ///
    /// # Errors
    ///
    /// - `PulseError::Payload` if a plain frame is not JSON
    /// - `PulseError::Frame` if a Socket.IO frame is malformed or a connect
    ///   error packet arrives
    pub fn decode(&self, text: &str) -> Result<Inbound> {
        match self {
            Framing::Plain { .. } => parse_json(text).map(Inbound::Payload),
            Framing::SocketIo { event } => decode_engineio(text, event),
        }
    }

    /// Endpoint URL for this dialect
    ///
    /// Plain URLs are used as given. For Socket.IO a bare base URL gets the
    /// Engine.IO path appended and `http(s)` is mapped onto `ws(s)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use pulse_monitor::transport::framing::Framing;
    ///
    /// let framing = Framing::SocketIo { event: "new_heart_rate".into() };
    /// assert_eq!(
    ///     framing.endpoint("http://localhost:10000"),
    ///     "ws://localhost:10000/socket.io/?EIO=4&transport=websocket"
    /// );
    /// ```
    pub fn endpoint(&self, url: &str) -> String {
        match self {
            Framing::Plain { .. } => url.to_string(),
            Framing::SocketIo { .. } => {
                let url = if let Some(rest) = url.strip_prefix("http://") {
                    format!("ws://{}", rest)
                } else if let Some(rest) = url.strip_prefix("https://") {
                    format!("wss://{}", rest)
                } else {
                    url.to_string()
                };

                if url.contains("/socket.io/") {
                    url
                } else {
                    format!("{}{}", url.trim_end_matches('/'), SOCKETIO_PATH)
                }
            }
        }
    }
}

/// Decode an Engine.IO packet
fn decode_engineio(text: &str, event: &str) -> Result<Inbound> {
    let mut chars = text.chars();
    let packet_type = chars
        .next()
        .ok_or_else(|| PulseError::Frame("Empty Engine.IO packet".to_string()))?;
    let body = chars.as_str();

    match packet_type {
        '0' => {
            debug!("Engine.IO open: {}", body);
            Ok(Inbound::Reply("40".to_string()))
        }
        '1' => Ok(Inbound::Close),
        '2' => Ok(Inbound::Reply(format!("3{}", body))),
        '3' | '5' | '6' => Ok(Inbound::Ignore),
        '4' => decode_socketio(body, event),
        other => Err(PulseError::Frame(format!(
            "Unknown Engine.IO packet type: {:?}",
            other
        ))),
    }
}

/// Decode a Socket.IO packet (the body of an Engine.IO message)
fn decode_socketio(body: &str, event: &str) -> Result<Inbound> {
    let mut chars = body.chars();
    let packet_type = chars
        .next()
        .ok_or_else(|| PulseError::Frame("Empty Socket.IO packet".to_string()))?;
    let rest = chars.as_str();

    match packet_type {
        '0' => {
            debug!("Socket.IO namespace joined");
            Ok(Inbound::Ignore)
        }
        '1' => Ok(Inbound::Close),
        '2' => decode_event(rest, event),
        '4' => Err(PulseError::Frame(format!("Socket.IO connect error: {}", rest))),
        // Acks and binary events carry nothing for us
        _ => Ok(Inbound::Ignore),
    }
}

/// Decode `[/namespace,][ack id]["name", data...]`
fn decode_event(rest: &str, event: &str) -> Result<Inbound> {
    let rest = if rest.starts_with('/') {
        match rest.find(',') {
            Some(idx) => &rest[idx + 1..],
            None => return Err(PulseError::Frame("Unterminated namespace".to_string())),
        }
    } else {
        rest
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    let array: Vec<Value> = serde_json::from_str(rest)
        .map_err(|e| PulseError::Frame(format!("Invalid event arguments: {}", e)))?;

    match array.as_slice() {
        [Value::String(name), data, ..] if name == event => Ok(Inbound::Payload(data.clone())),
        [Value::String(name), ..] => {
            debug!("Ignoring Socket.IO event {:?}", name);
            Ok(Inbound::Ignore)
        }
        _ => Err(PulseError::Frame("Event without a name".to_string())),
    }
}
