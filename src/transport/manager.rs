//! # Transport Manager
//!
//! Owns the telemetry connection: connects, decodes frames into readings,
//! notices disconnects and reconnects on a fixed delay until stopped.
//!
//! ```text
//! Connecting --ok--> Open --peer close / error--> Closed
//!     ^   \                                         |
//!     |    +--------------connect error------------>+
//!     |                                             |
//!     +------------- after policy delay ------------+   (or stop when exhausted)
//! ```
//!
//! Every state change is reported as a [`TransportEvent`]. The manager never
//! touches the buffer, the watchdog or the map state.

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use super::channel::{Channel, Connector};
use super::framing::{Framing, Inbound};
use crate::telemetry::payload::decode_reading;
use crate::telemetry::sample::Reading;

/// Default delay between reconnect attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Events raised by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection attempt started (first connect or after the retry delay)
    Connecting,

    /// Channel established
    Opened,

    /// A decoded inbound message (value not yet validated)
    Telemetry(Reading),

    /// Channel lost or connect attempt failed
    Closed {
        reason: String,
        /// Delay before the next attempt; `None` when no attempt will follow
        retry_in: Option<Duration>,
    },
}

/// Connection phase as seen by the transport itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Connecting,
    Open,
    Closed,
}

/// Fixed-interval retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay between a close and the next attempt
    pub delay: Duration,

    /// Consecutive failed attempts tolerated before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Retry forever with a fixed delay
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Delay before reconnecting after `failures` consecutive closes
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use pulse_monitor::transport::manager::ReconnectPolicy;
    ///
    /// let policy = ReconnectPolicy { delay: Duration::from_secs(1), max_attempts: Some(2) };
    /// assert_eq!(policy.next_delay(1), Some(Duration::from_secs(1)));
    /// assert_eq!(policy.next_delay(2), Some(Duration::from_secs(1)));
    /// assert_eq!(policy.next_delay(3), None);
    /// ```
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if failures > max => None,
            _ => Some(self.delay),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

/// Why the read loop ended
enum Exit {
    Stopped,
    Lost(String),
}

/// Reconnecting telemetry transport
pub struct TransportManager<C: Connector> {
    connector: C,
    framing: Framing,
    policy: ReconnectPolicy,
    events: mpsc::UnboundedSender<TransportEvent>,
    state: LinkState,
}

impl<C: Connector + 'static> TransportManager<C> {
    /// # Arguments
    ///
    /// * `connector` - Produces a fresh channel per attempt
    /// * `framing` - Wire dialect of the relay
    /// * `policy` - Reconnect delay and attempt limit
    /// * `events` - Where `Connecting` / `Opened` / `Telemetry` / `Closed` go
    pub fn new(
        connector: C,
        framing: Framing,
        policy: ReconnectPolicy,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            connector,
            framing,
            policy,
            events,
            state: LinkState::Closed,
        }
    }

    /// Run the connect loop as a background task
    pub fn spawn(self) -> TransportHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        TransportHandle {
            stop: stop_tx,
            task: Some(task),
        }
    }

    /// Connect loop; returns once stopped or the retry policy is exhausted
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let endpoint = self.connector.endpoint();
        let mut failures: u32 = 0;

        loop {
            self.set_state(LinkState::Connecting);
            info!("Connecting to {}", endpoint);

            let attempt = tokio::select! {
                biased;
                _ = stopped(&mut stop) => break,
                attempt = self.connector.connect() => attempt,
            };

            let reason = match attempt {
                Ok(mut channel) => {
                    failures = 0;
                    self.set_state(LinkState::Open);
                    info!("Connected to {}", endpoint);
                    self.emit(TransportEvent::Opened);

                    let exit = self.pump(channel.as_mut(), &mut stop).await;
                    channel.close().await;

                    match exit {
                        Exit::Stopped => break,
                        Exit::Lost(reason) => reason,
                    }
                }
                Err(e) => e.to_string(),
            };

            failures = failures.saturating_add(1);
            self.set_state(LinkState::Closed);

            let retry_in = self.policy.next_delay(failures);
            match retry_in {
                Some(delay) => warn!(
                    "Connection to {} closed: {} (retry in {} ms)",
                    endpoint,
                    reason,
                    delay.as_millis()
                ),
                None => warn!(
                    "Connection to {} closed: {} (giving up after {} attempts)",
                    endpoint, reason, failures
                ),
            }
            self.emit(TransportEvent::Closed { reason, retry_in });

            let Some(delay) = retry_in else { break };
            tokio::select! {
                biased;
                _ = stopped(&mut stop) => break,
                _ = sleep(delay) => {}
            }
        }

        if self.state != LinkState::Closed {
            self.set_state(LinkState::Closed);
            self.emit(TransportEvent::Closed {
                reason: "Disconnect requested".to_string(),
                retry_in: None,
            });
        }
        info!("Transport to {} stopped", endpoint);
    }

    /// Read frames until the channel dies or a stop is requested
    async fn pump(
        &mut self,
        channel: &mut dyn Channel,
        stop: &mut watch::Receiver<bool>,
    ) -> Exit {
        for message in self.framing.on_open() {
            if let Err(e) = channel.send(&message).await {
                return Exit::Lost(format!("Handshake failed: {}", e));
            }
            debug!("Sent handshake {:?}", message);
        }

        loop {
            let received = tokio::select! {
                biased;
                _ = stopped(stop) => return Exit::Stopped,
                received = channel.recv() => received,
            };

            let text = match received {
                Ok(Some(text)) => text,
                Ok(None) => return Exit::Lost("Closed by peer".to_string()),
                Err(e) => return Exit::Lost(e.to_string()),
            };

            match self.framing.decode(&text) {
                Ok(Inbound::Payload(value)) => match decode_reading(&value, Utc::now()) {
                    Ok(reading) => self.emit(TransportEvent::Telemetry(reading)),
                    Err(e) => warn!("Dropping malformed telemetry: {}", e),
                },
                Ok(Inbound::Reply(reply)) => {
                    if let Err(e) = channel.send(&reply).await {
                        return Exit::Lost(format!("Reply failed: {}", e));
                    }
                }
                Ok(Inbound::Ignore) => {}
                Ok(Inbound::Close) => return Exit::Lost("Session closed by server".to_string()),
                Err(e) => warn!("Dropping undecodable frame: {}", e),
            }
        }
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            debug!("Transport event dropped: receiver gone");
        }
    }

    fn set_state(&mut self, next: LinkState) {
        if self.state != next {
            debug!("Transport state: {:?} -> {:?}", self.state, next);
            self.state = next;
            if next == LinkState::Connecting {
                self.emit(TransportEvent::Connecting);
            }
        }
    }
}

/// Resolves once a stop was requested or the handle was dropped
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// Control handle for a spawned [`TransportManager`]
///
/// Dropping the handle stops the transport.
#[derive(Debug)]
pub struct TransportHandle {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl TransportHandle {
    /// Cancel any pending reconnect and close the channel. Idempotent.
    pub fn disconnect(&self) {
        self.stop.send_replace(true);
    }

    /// Wait for the transport task to finish
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Transport task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PulseError;
    use crate::transport::channel::mocks::{Attempt, MockChannel, ScriptedConnector, Step};
    use crate::transport::channel::MockConnector;
    use crate::transport::framing::{DEFAULT_EVENT, DEFAULT_HANDSHAKE};
    use tokio::time::Instant;

    fn plain() -> Framing {
        Framing::Plain {
            handshake: DEFAULT_HANDSHAKE.to_string(),
        }
    }

    fn values(events: &[TransportEvent]) -> Vec<i64> {
        events
            .iter()
            .filter_map(|e| match e {
                TransportEvent::Telemetry(r) => Some(r.heart_rate),
                _ => None,
            })
            .collect()
    }

    async fn collect_until_closed(
        rx: &mut mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = matches!(event, TransportEvent::Closed { .. });
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[test]
    fn test_policy_unbounded() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay, Duration::from_millis(1000));
        for failures in [1, 10, 10_000, u32::MAX] {
            assert_eq!(policy.next_delay(failures), Some(Duration::from_millis(1000)));
        }
    }

    #[test]
    fn test_policy_zero_attempts_never_retries() {
        let policy = ReconnectPolicy {
            delay: Duration::from_millis(500),
            max_attempts: Some(0),
        };
        assert_eq!(policy.next_delay(1), None);
    }

    fn manager<C: Connector + 'static>(
        connector: C,
        framing: Framing,
    ) -> (TransportManager<C>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = TransportManager::new(connector, framing, ReconnectPolicy::default(), tx);
        (manager, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_scheduled_after_each_failure() {
        let connector = ScriptedConnector::new(Vec::new());
        let (manager, mut rx) = manager(connector.clone(), plain());
        let mut handle = manager.spawn();

        for _ in 0..5 {
            assert_eq!(rx.recv().await, Some(TransportEvent::Connecting));
            match rx.recv().await.unwrap() {
                TransportEvent::Closed { retry_in, .. } => {
                    assert_eq!(retry_in, Some(Duration::from_millis(1000)));
                }
                other => panic!("Expected Closed, got: {:?}", other),
            }
        }

        // Stop mid-backoff: no further attempt may happen
        handle.disconnect();
        handle.join().await;
        let attempts = connector.attempt_count();
        assert_eq!(attempts, 5);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.attempt_count(), attempts);

        let times = connector.get_attempt_times();
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_idempotent_and_safe_after_exit() {
        let connector = ScriptedConnector::new(Vec::new());
        let (manager, _rx) = manager(connector, plain());
        let mut handle = manager.spawn();

        handle.disconnect();
        handle.disconnect();
        handle.join().await;
        handle.disconnect();
        handle.join().await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_when_attempts_exhausted() {
        let connector = ScriptedConnector::new(Vec::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy {
            delay: Duration::from_millis(200),
            max_attempts: Some(2),
        };
        let mut handle = TransportManager::new(connector.clone(), plain(), policy, tx).spawn();
        handle.join().await;

        let mut retries = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TransportEvent::Closed { retry_in, .. } = event {
                retries.push(retry_in);
            }
        }
        assert_eq!(
            retries,
            vec![Some(Duration::from_millis(200)), Some(Duration::from_millis(200)), None]
        );
        assert_eq!(connector.attempt_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_connector_single_attempt() {
        let mut connector = MockConnector::new();
        connector
            .expect_endpoint()
            .return_const("mock://refused".to_string());
        connector
            .expect_connect()
            .times(1)
            .returning(|| Err(PulseError::Transport("Connection refused".to_string())));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy {
            delay: Duration::from_millis(100),
            max_attempts: Some(0),
        };
        let (_stop_tx, stop_rx) = watch::channel(false);
        TransportManager::new(connector, plain(), policy, tx).run(stop_rx).await;

        assert_eq!(rx.recv().await, Some(TransportEvent::Connecting));
        match rx.recv().await.unwrap() {
            TransportEvent::Closed { reason, retry_in } => {
                assert!(reason.contains("Connection refused"));
                assert_eq!(retry_in, None);
            }
            other => panic!("Expected Closed, got: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_payloads_dropped() {
        let channel = MockChannel::new(vec![
            Step::Message(r#"{"heart_rate": 72}"#.to_string()),
            Step::Message("garbage".to_string()),
            Step::Message(r#"{"heart_rate": "abc"}"#.to_string()),
            Step::Message(r#"{"timestamp": 1714559415123}"#.to_string()),
            Step::Message(r#"{"heart_rate": -1}"#.to_string()),
            Step::Message(r#"{"heart_rate": 75}"#.to_string()),
            Step::Close,
        ]);
        let connector = ScriptedConnector::new(vec![Attempt::Open(channel.clone())]);
        let (manager, mut rx) = manager(connector, plain());
        let _handle = manager.spawn();

        let events = collect_until_closed(&mut rx).await;
        assert_eq!(events[..2], [TransportEvent::Connecting, TransportEvent::Opened]);
        assert_eq!(values(&events), vec![72, -1, 75]);
        match events.last() {
            Some(TransportEvent::Closed { reason, retry_in }) => {
                assert_eq!(reason, "Closed by peer");
                assert_eq!(*retry_in, Some(DEFAULT_RECONNECT_DELAY));
            }
            other => panic!("Expected Closed, got: {:?}", other),
        }

        assert_eq!(channel.get_sent(), vec!["dashboard".to_string()]);
        assert!(channel.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_error_closes_and_reconnects() {
        let first = MockChannel::new(vec![
            Step::Message(r#"{"heart_rate": 60}"#.to_string()),
            Step::Error("Connection reset".to_string()),
        ]);
        let second = MockChannel::messages([r#"{"heart_rate": 61}"#]);
        let connector = ScriptedConnector::new(vec![
            Attempt::Open(first),
            Attempt::Refused("Connection refused".to_string()),
            Attempt::Open(second.clone()),
        ]);
        let (manager, mut rx) = manager(connector.clone(), plain());
        let mut handle = manager.spawn();

        let first_session = collect_until_closed(&mut rx).await;
        assert_eq!(values(&first_session), vec![60]);

        let refused = collect_until_closed(&mut rx).await;
        assert_eq!(refused.len(), 2);
        assert_eq!(refused[0], TransportEvent::Connecting);

        assert_eq!(rx.recv().await, Some(TransportEvent::Connecting));
        assert_eq!(rx.recv().await, Some(TransportEvent::Opened));
        match rx.recv().await {
            Some(TransportEvent::Telemetry(r)) => assert_eq!(r.heart_rate, 61),
            other => panic!("Expected Telemetry, got: {:?}", other),
        }

        // Disconnect while open: channel closed, final Closed without retry
        handle.disconnect();
        handle.join().await;
        assert!(second.is_closed());
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Closed {
                reason: "Disconnect requested".to_string(),
                retry_in: None,
            })
        );
        assert_eq!(connector.attempt_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_socketio_session() {
        let channel = MockChannel::messages([
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#,
            r#"40{"sid":"def"}"#,
            "2",
            concat!(
                r#"42["new_heart_rate","#,
                r#"{"device_id":"COOSPO","heart_rate":88,"latitude":45.46,"longitude":9.19}]"#
            ),
            r#"42["stats",{"avg_bpm":70}]"#,
            "41",
        ]);
        let connector = ScriptedConnector::new(vec![Attempt::Open(channel.clone())]);
        let framing = Framing::SocketIo {
            event: DEFAULT_EVENT.to_string(),
        };
        let (manager, mut rx) = manager(connector, framing);
        let _handle = manager.spawn();

        let events = collect_until_closed(&mut rx).await;
        assert_eq!(values(&events), vec![88]);
        match &events[2] {
            TransportEvent::Telemetry(reading) => {
                assert_eq!(reading.device_id.as_deref(), Some("COOSPO"));
                assert!(reading.position.is_some());
            }
            other => panic!("Expected Telemetry, got: {:?}", other),
        }
        assert_eq!(channel.get_sent(), vec!["40".to_string(), "3".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_transport() {
        let connector = ScriptedConnector::new(Vec::new());
        let (manager, mut rx) = manager(connector.clone(), plain());
        let handle = manager.spawn();

        assert_eq!(rx.recv().await, Some(TransportEvent::Connecting));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Closed { .. })));
        drop(handle);

        // Sender is dropped once the task exits
        while rx.recv().await.is_some() {}
        assert_eq!(connector.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_then_connecting_then_open() {
        let channel = MockChannel::new(Vec::new());
        let connector = ScriptedConnector::new(vec![
            Attempt::Refused("Connection refused".to_string()),
            Attempt::Open(channel),
        ]);
        let (manager, mut rx) = manager(connector.clone(), plain());
        let _handle = manager.spawn();

        assert_eq!(rx.recv().await, Some(TransportEvent::Connecting));
        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Closed { retry_in: Some(_), .. })
        ));

        // Raised once the retry delay has elapsed
        let refused_at = connector.get_attempt_times()[0];
        assert_eq!(rx.recv().await, Some(TransportEvent::Connecting));
        assert!(Instant::now() - refused_at >= DEFAULT_RECONNECT_DELAY);
        assert_eq!(rx.recv().await, Some(TransportEvent::Opened));
        assert_eq!(connector.attempt_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_attempt_stays_connecting() {
        let connector = ScriptedConnector::new(vec![
            Attempt::Refused("Connection refused".to_string()),
            Attempt::Stall,
        ]);
        let (manager, mut rx) = manager(connector.clone(), plain());
        let mut handle = manager.spawn();

        assert_eq!(rx.recv().await, Some(TransportEvent::Connecting));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Closed { .. })));
        assert_eq!(rx.recv().await, Some(TransportEvent::Connecting));

        sleep(Duration::from_secs(3)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(connector.attempt_count(), 2);

        // Stop while connecting: a final Closed without retry
        handle.disconnect();
        handle.join().await;
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Closed {
                reason: "Disconnect requested".to_string(),
                retry_in: None,
            })
        );
    }
}
