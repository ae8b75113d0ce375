//! # Liveness Watchdog
//!
//! Detects silent upstream stalls: a socket can stay open while the sensor
//! behind the relay has stopped producing data. The watchdog knows nothing
//! about the transport; it only sees `feed()` calls for valid samples.
//!
//! ```text
//! Idle --arm--> Armed --feed--> Armed (deadline pushed back)
//!                 |  \
//!                 |   timeout --> fires `stale`, stays Armed (next period)
//!                 +--stop--> Idle
//! ```

use std::future;

use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

/// Default silence threshold before data is reported as stale
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Watchdog timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Idle,
    Armed,
}

/// Emitted once per elapsed timeout period without a `feed()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleSignal {
    /// 1 for the first firing after the last feed, 2 for the next period, ...
    pub consecutive: u32,

    /// Time since the last feed (or since arming)
    pub silent_for: Duration,
}

/// Single re-arming timer that fires `stale` on silence
///
/// The timer is driven by awaiting [`LivenessWatchdog::expired`], which is
/// cancel-safe and meant to sit in a `tokio::select!` next to other event
/// sources.
#[derive(Debug)]
pub struct LivenessWatchdog {
    timeout: Duration,
    deadline: Option<Instant>,
    last_activity: Instant,
    consecutive: u32,
}

impl LivenessWatchdog {
    /// Create an idle watchdog with the given silence threshold
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
            last_activity: Instant::now(),
            consecutive: 0,
        }
    }

    /// Start or restart the timer with a (possibly new) timeout
    pub fn arm(&mut self, timeout: Duration) {
        let now = Instant::now();
        self.timeout = timeout;
        self.deadline = Some(now + timeout);
        self.last_activity = now;
        self.consecutive = 0;
        debug!("Liveness watchdog armed ({} ms)", timeout.as_millis());
    }

    /// Record activity, pushing the deadline back by a full timeout
    ///
    /// No-op while idle: feeding never arms the watchdog.
    pub fn feed(&mut self) {
        if self.deadline.is_none() {
            return;
        }
        let now = Instant::now();
        self.deadline = Some(now + self.timeout);
        self.last_activity = now;
        self.consecutive = 0;
    }

    /// Cancel any pending firing. Safe to call in any state.
    pub fn stop(&mut self) {
        if self.deadline.take().is_some() {
            debug!("Liveness watchdog stopped");
        }
        self.consecutive = 0;
    }

    /// Wait for the next stale firing
    ///
    /// Never resolves while idle. After firing, the next deadline is exactly
    /// one timeout later, so continued silence produces one signal per period.
    ///
    /// Cancel-safe: dropping the future before it resolves changes nothing.
    pub async fn expired(&mut self) -> StaleSignal {
        let deadline = match self.deadline {
            Some(deadline) => deadline,
            None => return future::pending().await,
        };

        sleep_until(deadline).await;

        self.deadline = Some(deadline + self.timeout);
        self.consecutive += 1;

        StaleSignal {
            consecutive: self.consecutive,
            silent_for: deadline.saturating_duration_since(self.last_activity),
        }
    }

    pub fn state(&self) -> WatchdogState {
        if self.deadline.is_some() {
            WatchdogState::Armed
        } else {
            WatchdogState::Idle
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for LivenessWatchdog {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_TIMEOUT)
    }
}
