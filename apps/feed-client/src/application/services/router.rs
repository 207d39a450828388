//! Frame Router
//!
//! Decodes raw inbound frames and applies them to the domain state
//! buckets. A frame that fails to decode is logged and dropped; the
//! stream keeps flowing. Accepted updates are written through to the
//! snapshot cache when one is configured.

use std::sync::Arc;

use crate::domain::state::FeedState;
use crate::infrastructure::cache::SnapshotCache;
use crate::infrastructure::transport::LivenessState;
use crate::infrastructure::wire::{FeedCodec, FeedMessage};

/// Per-domain cache keys.
const CACHE_DOMAIN_QUOTES: &str = "quotes";
const CACHE_DOMAIN_PORTFOLIO: &str = "portfolio";
const CACHE_DOMAIN_POSITIONS: &str = "positions";
const CACHE_DOMAIN_ALERTS: &str = "alerts";

/// Routes decoded messages into the shared feed state.
pub struct FrameRouter {
    codec: FeedCodec,
    state: Arc<FeedState>,
    liveness: Arc<LivenessState>,
    cache: Option<Arc<SnapshotCache>>,
}

impl FrameRouter {
    /// Create a router over the given state and liveness tracker.
    #[must_use]
    pub const fn new(
        state: Arc<FeedState>,
        liveness: Arc<LivenessState>,
        cache: Option<Arc<SnapshotCache>>,
    ) -> Self {
        Self {
            codec: FeedCodec::new(),
            state,
            liveness,
            cache,
        }
    }

    /// Decode one raw frame and apply it. Malformed frames are dropped
    /// with a warning so one bad payload never stalls the stream.
    pub fn route(&self, raw: &str) {
        match self.codec.decode(raw) {
            Ok(message) => self.dispatch(message),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable frame");
            }
        }
    }

    fn dispatch(&self, message: FeedMessage) {
        match message {
            FeedMessage::PriceUpdate(update) => {
                let accepted = self.state.quotes.merge(update.data.into_values());
                tracing::debug!(accepted, "Applied price update");
                if accepted > 0 {
                    self.persist_quotes();
                }
            }
            FeedMessage::PortfolioUpdate(update) => {
                self.state.replace_portfolio(update.data);
                tracing::debug!("Applied portfolio update");
                self.persist_portfolio();
            }
            FeedMessage::PositionUpdate(update) => {
                let mut accepted = 0usize;
                for position in update.data.into_values() {
                    if self.state.positions.upsert(position) {
                        accepted += 1;
                    }
                }
                tracing::debug!(accepted, "Applied position update");
                if accepted > 0 {
                    self.persist_positions();
                }
            }
            FeedMessage::TradingAlert(alert) => {
                self.state.alerts.push(alert.data);
                tracing::debug!("Recorded trading alert");
                self.persist_alerts();
            }
            FeedMessage::Heartbeat(_) | FeedMessage::Pong => {
                self.liveness.record_heartbeat();
            }
            FeedMessage::SubscriptionConfirmed(confirmation) => {
                tracing::debug!(keys = ?confirmation.keys, "Subscription confirmed");
            }
            FeedMessage::Connection(info) => {
                tracing::debug!(msg = ?info.msg, "Connection status message");
            }
            FeedMessage::Unknown(tag) => {
                tracing::debug!(tag, "Ignoring unrecognized message type");
            }
        }
    }

    fn persist_quotes(&self) {
        if let Some(cache) = &self.cache {
            match serde_json::to_value(self.state.quotes.snapshot()) {
                Ok(value) => cache.write(CACHE_DOMAIN_QUOTES, &value),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize quote snapshot"),
            }
        }
    }

    fn persist_portfolio(&self) {
        if let Some(cache) = &self.cache
            && let Some(portfolio) = self.state.portfolio()
        {
            match serde_json::to_value(portfolio) {
                Ok(value) => cache.write(CACHE_DOMAIN_PORTFOLIO, &value),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize portfolio snapshot"),
            }
        }
    }

    fn persist_positions(&self) {
        if let Some(cache) = &self.cache {
            match serde_json::to_value(self.state.positions.snapshot()) {
                Ok(value) => cache.write(CACHE_DOMAIN_POSITIONS, &value),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize position snapshot"),
            }
        }
    }

    fn persist_alerts(&self) {
        if let Some(cache) = &self.cache {
            match serde_json::to_value(self.state.alerts.snapshot()) {
                Ok(value) => cache.write(CACHE_DOMAIN_ALERTS, &value),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize alert snapshot"),
            }
        }
    }
}

/// Paint state buckets from cached snapshots that are still inside the
/// freshness window. Used once at startup before any connection opens.
pub fn restore_from_cache(
    state: &FeedState,
    cache: &SnapshotCache,
    max_age: std::time::Duration,
) -> usize {
    use crate::domain::state::{AlertEntry, PortfolioSnapshot, PositionRecord, QuoteRecord};
    use std::collections::HashMap;

    let mut restored = 0usize;

    if let Some(value) = cache.read_if_fresh(CACHE_DOMAIN_QUOTES, max_age) {
        match serde_json::from_value::<HashMap<String, QuoteRecord>>(value) {
            Ok(quotes) => {
                restored += state.quotes.merge(quotes.into_values());
            }
            Err(e) => tracing::warn!(error = %e, "Discarding malformed cached quotes"),
        }
    }

    if let Some(value) = cache.read_if_fresh(CACHE_DOMAIN_PORTFOLIO, max_age) {
        match serde_json::from_value::<PortfolioSnapshot>(value) {
            Ok(portfolio) => {
                state.replace_portfolio(portfolio);
                restored += 1;
            }
            Err(e) => tracing::warn!(error = %e, "Discarding malformed cached portfolio"),
        }
    }

    if let Some(value) = cache.read_if_fresh(CACHE_DOMAIN_POSITIONS, max_age) {
        match serde_json::from_value::<HashMap<String, PositionRecord>>(value) {
            Ok(positions) => {
                for position in positions.into_values() {
                    if state.positions.upsert(position) {
                        restored += 1;
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Discarding malformed cached positions"),
        }
    }

    if let Some(value) = cache.read_if_fresh(CACHE_DOMAIN_ALERTS, max_age) {
        match serde_json::from_value::<Vec<AlertEntry>>(value) {
            Ok(alerts) => {
                // Cached alerts are newest first; pushing oldest first
                // rebuilds the same ordering.
                for alert in alerts.into_iter().rev() {
                    state.alerts.push(alert);
                    restored += 1;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Discarding malformed cached alerts"),
        }
    }

    restored
}
