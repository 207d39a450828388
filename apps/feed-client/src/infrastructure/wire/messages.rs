//! Feed Wire Message Types
//!
//! One JSON object per frame, each carrying a `type` field and a
//! payload. Observed inbound types:
//!
//! - `price_update`: map of channel key to quote record
//! - `portfolio_update`: single portfolio snapshot
//! - `position_update`: map of symbol to position record
//! - `trading_alert`: one alert entry
//! - `heartbeat`: liveness proof, no visible state change
//! - `subscription_confirmed`: echoed key list (informational)
//! - `connection`: banner (informational)
//! - `pong`: informational
//!
//! Outbound requests are `{"type":"subscribe"|"unsubscribe","keys":[...]}`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::state::{AlertEntry, ChannelKey, PortfolioSnapshot, PositionRecord, QuoteRecord};

// =============================================================================
// Inbound Frames
// =============================================================================

/// Quote updates for a subset of the subscribed keys.
///
/// # Wire Format
/// ```json
/// {"type":"price_update","data":{"AAPL":{"key":"AAPL","price":"150.00","asOf":"2026-08-29T14:00:00Z","kind":"trade"}}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdateMessage {
    /// Message type (always "price_update").
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Updated records, keyed by channel key.
    pub data: HashMap<ChannelKey, QuoteRecord>,
}

/// Wholesale portfolio replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioUpdateMessage {
    /// Message type (always "portfolio_update").
    #[serde(rename = "type")]
    pub msg_type: String,
    /// The new snapshot.
    pub data: PortfolioSnapshot,
}

/// Position upserts, keyed by symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdateMessage {
    /// Message type (always "position_update").
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Updated positions.
    pub data: HashMap<String, PositionRecord>,
}

/// One trading alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingAlertMessage {
    /// Message type (always "trading_alert").
    #[serde(rename = "type")]
    pub msg_type: String,
    /// The alert.
    pub data: AlertEntry,
}

/// Periodic no-op frame proving connection liveness.
///
/// # Wire Format
/// ```json
/// {"type":"heartbeat","timestamp":"2026-08-29T14:00:00Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    /// Message type (always "heartbeat").
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Server clock at send time, when the feed carries it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Echo of the currently confirmed key set. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfirmedMessage {
    /// Message type (always "subscription_confirmed").
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Confirmed channel keys.
    #[serde(default)]
    pub keys: Vec<ChannelKey>,
}

/// Connection banner sent once after open. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMessage {
    /// Message type (always "connection").
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Free-form banner text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

/// Decoded inbound frame, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// Quote updates.
    PriceUpdate(PriceUpdateMessage),
    /// Portfolio snapshot replacement.
    PortfolioUpdate(PortfolioUpdateMessage),
    /// Position upserts.
    PositionUpdate(PositionUpdateMessage),
    /// Trading alert.
    TradingAlert(TradingAlertMessage),
    /// Liveness heartbeat.
    Heartbeat(HeartbeatMessage),
    /// Subscription confirmation.
    SubscriptionConfirmed(SubscriptionConfirmedMessage),
    /// Connection banner.
    Connection(ConnectionMessage),
    /// Reply to an application-level ping.
    Pong,
    /// Unrecognized frame type, carried for logging.
    Unknown(String),
}

// =============================================================================
// Outbound Requests
// =============================================================================

/// Outbound subscribe/unsubscribe request.
///
/// Subscribes are idempotent server-side; replaying the full set after
/// a reconnect is harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// "subscribe" or "unsubscribe".
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Channel keys the request applies to.
    pub keys: Vec<ChannelKey>,
}

impl SubscriptionRequest {
    /// Build a subscribe request.
    #[must_use]
    pub fn subscribe(keys: Vec<ChannelKey>) -> Self {
        Self {
            msg_type: "subscribe".to_string(),
            keys,
        }
    }

    /// Build an unsubscribe request.
    #[must_use]
    pub fn unsubscribe(keys: Vec<ChannelKey>) -> Self {
        Self {
            msg_type: "unsubscribe".to_string(),
            keys,
        }
    }
}
