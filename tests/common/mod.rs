//! In-memory relay for driving a session end to end

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use pulse_monitor::error::{PulseError, Result};
use pulse_monitor::map::MapView;
use pulse_monitor::session::{SessionHandle, SessionOptions};
use pulse_monitor::telemetry::controller::ControllerSettings;
use pulse_monitor::telemetry::sample::GeoPosition;
use pulse_monitor::telemetry::TelemetrySnapshot;
use pulse_monitor::transport::{Channel, Connector, Framing, ReconnectPolicy};

/// Channel fed by a [`Link`]; dropping the link closes it from the peer side
pub struct PipeChannel {
    inbound: mpsc::UnboundedReceiver<String>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Channel for PipeChannel {
    async fn recv(&mut self) -> Result<Option<String>> {
        Ok(self.inbound.recv().await)
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

/// Connector handing out queued pipes; refuses when none is queued
pub struct PipeConnector {
    pending: Arc<Mutex<VecDeque<PipeChannel>>>,
}

#[async_trait]
impl Connector for PipeConnector {
    async fn connect(&mut self) -> Result<Box<dyn Channel>> {
        match self.pending.lock().unwrap().pop_front() {
            Some(channel) => Ok(Box::new(channel)),
            None => Err(PulseError::Transport("Connection refused".to_string())),
        }
    }

    fn endpoint(&self) -> String {
        "pipe://relay".to_string()
    }
}

/// Test side of the relay
#[derive(Clone)]
pub struct Relay {
    pending: Arc<Mutex<VecDeque<PipeChannel>>>,
    sent: Arc<Mutex<Vec<String>>>,
}

/// One accepted connection, as seen by the relay
pub struct Link {
    outbound: mpsc::UnboundedSender<String>,
}

impl Link {
    pub fn send(&self, value: Value) {
        self.outbound.send(value.to_string()).unwrap();
    }

    pub fn send_raw(&self, text: &str) {
        self.outbound.send(text.to_string()).unwrap();
    }
}

pub fn relay() -> (PipeConnector, Relay) {
    let pending = Arc::new(Mutex::new(VecDeque::new()));
    let relay = Relay {
        pending: pending.clone(),
        sent: Arc::new(Mutex::new(Vec::new())),
    };
    (PipeConnector { pending }, relay)
}

impl Relay {
    /// Queue a connection for the next attempt
    pub fn accept(&self) -> Link {
        let (outbound, inbound) = mpsc::unbounded_channel();
        self.pending.lock().unwrap().push_back(PipeChannel {
            inbound,
            sent: self.sent.clone(),
        });
        Link { outbound }
    }

    /// Everything the client sent, across all connections
    pub fn received(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

pub fn options(capacity: usize, stale_ms: u64) -> SessionOptions {
    SessionOptions {
        framing: Framing::Plain {
            handshake: "dashboard".to_string(),
        },
        policy: ReconnectPolicy::fixed(Duration::from_millis(1000)),
        controller: ControllerSettings {
            capacity,
            stale_timeout: Duration::from_millis(stale_ms),
            default_view: MapView {
                center: GeoPosition::new(45.4642, 9.19).unwrap(),
                zoom: 13,
            },
        },
    }
}

/// Wait until a published snapshot satisfies `condition`
pub async fn wait_for<F>(handle: &SessionHandle, condition: F) -> TelemetrySnapshot
where
    F: Fn(&TelemetrySnapshot) -> bool,
{
    let mut rx = handle.subscribe();
    let wait = async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if condition(&snapshot) {
                    return snapshot.clone();
                }
            }
            rx.changed().await.expect("session ended before condition was met");
        }
    };
    timeout(Duration::from_secs(120), wait)
        .await
        .expect("condition not reached in time")
}

pub fn values(snapshot: &TelemetrySnapshot) -> Vec<u32> {
    snapshot.samples.iter().map(|s| s.value()).collect()
}
