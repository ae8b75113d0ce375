//! # Session
//!
//! Owns one transport, one telemetry controller and the event loop that
//! serializes everything between them.
//!
//! ```text
//! TransportManager --TransportEvent--> +-------------+ --snapshot (watch)--> renderer
//! watchdog deadline ------------------>| Session loop| --MapCommand-------->  renderer
//! SessionHandle --UserInput----------->+-------------+
//! ```
//!
//! Only the loop touches the controller, so message handling, watchdog
//! firings and user gestures never interleave.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::map::{InteractionOrigin, MapCommand};
use crate::telemetry::controller::{ControllerSettings, TelemetryController, TelemetrySnapshot};
use crate::transport::channel::Connector;
use crate::transport::framing::Framing;
use crate::transport::manager::{
    stopped, ReconnectPolicy, TransportEvent, TransportHandle, TransportManager,
};

/// Everything needed to start a [`Session`] besides the connector
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub framing: Framing,
    pub policy: ReconnectPolicy,
    pub controller: ControllerSettings,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            framing: config.transport.framing(),
            policy: config.transport.policy(),
            controller: config.controller_settings(),
        }
    }
}

/// Gestures and requests coming from the rendering side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInput {
    /// Viewport pan or zoom
    Interaction(InteractionOrigin),

    /// Explicit "recenter" action
    Recenter,
}

/// The event loop state; lives inside the spawned task
pub struct Session {
    controller: TelemetryController,
    transport: TransportHandle,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    input: mpsc::UnboundedReceiver<UserInput>,
    commands: mpsc::UnboundedSender<MapCommand>,
    snapshots: watch::Sender<TelemetrySnapshot>,
}

impl Session {
    /// Start the transport and the event loop
    ///
    /// # Arguments
    ///
    /// * `connector` - Channel factory for the relay
    /// * `options` - Framing, reconnect policy and controller settings
    ///
    /// # Returns
    ///
    /// * `SessionHandle` - Rendering interface; dropping it ends the session
    pub fn start<C: Connector + 'static>(connector: C, options: SessionOptions) -> SessionHandle {
        let controller = TelemetryController::new(options.controller);
        let (snapshots, snapshot_rx) = watch::channel(controller.current_snapshot());

        let (event_tx, events) = mpsc::unbounded_channel();
        let transport =
            TransportManager::new(connector, options.framing, options.policy, event_tx).spawn();

        let (input_tx, input) = mpsc::unbounded_channel();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let session = Session {
            controller,
            transport,
            events,
            input,
            commands,
            snapshots,
        };
        let task = tokio::spawn(session.run(stop_rx));

        SessionHandle {
            snapshots: snapshot_rx,
            input: input_tx,
            commands: command_rx,
            stop: stop_tx,
            task: Some(task),
        }
    }

    async fn run(mut self, mut stop: watch::Receiver<bool>) -> TelemetrySnapshot {
        let mut transport_done = false;
        let mut input_done = false;

        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut stop) => break,
                event = self.events.recv(), if !transport_done => match event {
                    Some(event) => {
                        let commands = self.controller.handle_event(event);
                        self.dispatch(commands);
                    }
                    None => {
                        info!("Transport finished; no further connection attempts");
                        transport_done = true;
                    }
                },
                input = self.input.recv(), if !input_done => match input {
                    Some(UserInput::Interaction(origin)) => {
                        self.controller.notify_user_interaction(origin)
                    }
                    Some(UserInput::Recenter) => {
                        if let Some(command) = self.controller.request_recenter() {
                            self.dispatch(vec![command]);
                        }
                    }
                    None => input_done = true,
                },
                signal = self.controller.next_stale() => self.controller.on_stale(signal),
            }
            self.publish();
        }

        self.teardown().await
    }

    async fn teardown(mut self) -> TelemetrySnapshot {
        debug!("Session teardown");
        self.transport.disconnect();
        self.transport.join().await;

        // Apply the final Closed the transport emits on its way out
        while let Ok(event) = self.events.try_recv() {
            self.controller.handle_event(event);
        }
        self.controller.shutdown();
        self.publish();

        let snapshot = self.controller.current_snapshot();
        info!(
            "Session ended: {} messages, {} rejected, {} samples buffered",
            snapshot.stats.messages_received,
            snapshot.stats.readings_rejected,
            snapshot.samples.len()
        );
        snapshot
    }

    fn dispatch(&self, commands: Vec<MapCommand>) {
        for command in commands {
            if self.commands.send(command).is_err() {
                debug!("Map command dropped: receiver gone");
            }
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.controller.current_snapshot());
    }
}

/// Rendering-side interface to a running [`Session`]
///
/// Dropping the handle stops the session and its transport.
#[derive(Debug)]
pub struct SessionHandle {
    snapshots: watch::Receiver<TelemetrySnapshot>,
    input: mpsc::UnboundedSender<UserInput>,
    commands: mpsc::UnboundedReceiver<MapCommand>,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<TelemetrySnapshot>>,
}

impl SessionHandle {
    /// Latest published state
    pub fn get_snapshot(&self) -> TelemetrySnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.snapshots.clone()
    }

    /// The user panned or zoomed the map
    pub fn notify_user_panned(&self) {
        self.notify_interaction(InteractionOrigin::User);
    }

    /// A viewport change with a known origin
    pub fn notify_interaction(&self, origin: InteractionOrigin) {
        self.send_input(UserInput::Interaction(origin));
    }

    /// Return to follow mode and jump to the latest position
    pub fn request_recenter(&self) {
        self.send_input(UserInput::Recenter);
    }

    /// Next map command; `None` once the session has ended
    pub async fn next_command(&mut self) -> Option<MapCommand> {
        self.commands.recv().await
    }

    /// Next map command if one is already queued
    pub fn try_next_command(&mut self) -> Option<MapCommand> {
        self.commands.try_recv().ok()
    }

    /// Stop the transport and the loop, returning the final state
    pub async fn shutdown(mut self) -> TelemetrySnapshot {
        self.stop.send_replace(true);
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(snapshot) => return snapshot,
                Err(e) => warn!("Session task ended abnormally: {}", e),
            }
        }
        self.get_snapshot()
    }

    fn send_input(&self, input: UserInput) {
        if self.input.send(input).is_err() {
            debug!("User input dropped: session ended");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}
