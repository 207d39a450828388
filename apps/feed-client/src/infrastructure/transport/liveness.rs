//! Liveness Monitor
//!
//! Detects a channel that reports itself open but has silently stopped
//! delivering data. NATs and proxies can leave a socket "open"
//! indefinitely with no detectable error, so heartbeat staleness is the
//! only reliable signal for such a zombie connection.
//!
//! The monitor drives the reconnect, not a display flag: when a stale
//! connection is detected, the client tears the transport down and
//! enters the same reconnect path used for errors and closes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for staleness detection.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// How often the last-heartbeat timestamp is checked.
    pub poll_interval: Duration,
    /// Elapsed time without a heartbeat before the connection is
    /// declared dead. Roughly 3x the expected server cadence.
    pub stale_after: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            stale_after: Duration::from_secs(45),
        }
    }
}

/// Events emitted by the liveness monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessEvent {
    /// No heartbeat within the threshold; the connection must be torn
    /// down and reopened.
    Stale,
}

/// Last-heartbeat timestamp shared between the router and the monitor.
///
/// Reset at every successful open so a legitimate startup window never
/// reads as staleness.
#[derive(Debug)]
pub struct LivenessState {
    last_heartbeat: RwLock<Instant>,
}

impl Default for LivenessState {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessState {
    /// Create new liveness state, stamped now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_heartbeat: RwLock::new(Instant::now()),
        }
    }

    /// Record a heartbeat-tagged frame.
    pub fn record_heartbeat(&self) {
        *self.last_heartbeat.write() = Instant::now();
    }

    /// Reset for a fresh connection.
    pub fn reset(&self) {
        *self.last_heartbeat.write() = Instant::now();
    }

    /// Time since the last heartbeat (or the last reset).
    #[must_use]
    pub fn time_since_heartbeat(&self) -> Duration {
        self.last_heartbeat.read().elapsed()
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, by: Duration) {
        if let Some(past) = Instant::now().checked_sub(by) {
            *self.last_heartbeat.write() = past;
        }
    }
}

/// Poll loop that watches one connection's heartbeat timestamp.
pub struct LivenessMonitor {
    config: LivenessConfig,
    state: Arc<LivenessState>,
    event_tx: mpsc::Sender<LivenessEvent>,
    cancel: CancellationToken,
}

impl LivenessMonitor {
    /// Create a new monitor.
    #[must_use]
    pub const fn new(
        config: LivenessConfig,
        state: Arc<LivenessState>,
        event_tx: mpsc::Sender<LivenessEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run the poll loop until cancelled or staleness is detected.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so a fresh
        // connection gets a full poll interval before its first check.
        interval.tick().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Liveness monitor cancelled");
                    return;
                }
                _ = interval.tick() => {
                    let elapsed = self.state.time_since_heartbeat();
                    if elapsed > self.config.stale_after {
                        tracing::warn!(
                            elapsed_secs = elapsed.as_secs(),
                            stale_after_secs = self.config.stale_after.as_secs(),
                            "Heartbeat stale, declaring connection dead"
                        );
                        let _ = self.event_tx.send(LivenessEvent::Stale).await;
                        return;
                    }
                }
            }
        }
    }
}
