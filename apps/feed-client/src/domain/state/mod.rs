//! Feed State Buckets
//!
//! Independent state buckets fed by the message router:
//!
//! - [`QuoteBook`]: per-key quote records, latest-`as_of` wins
//! - [`PortfolioSnapshot`]: single record, replaced wholesale
//! - [`PositionBook`]: per-symbol position records, latest wins
//! - [`AlertLog`]: newest-first log, capped with oldest-first eviction
//!
//! Updates within one connection arrive in delivery order; across a
//! reconnect there is no ordering guarantee, so every bucket resolves
//! conflicts as latest-wins rather than relying on sequencing.

use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default cap on retained alerts.
pub const DEFAULT_ALERT_CAP: usize = 50;

/// Opaque identifier for a subscribable feed channel.
pub type ChannelKey = String;

// =============================================================================
// Records
// =============================================================================

/// Whether a quote record came from a trade print or a quote update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteKind {
    /// Last-trade price update.
    Trade,
    /// Bid/ask quote update.
    Quote,
}

/// Latest known quote for one channel key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRecord {
    /// Channel key this record belongs to.
    pub key: ChannelKey,
    /// Last price.
    pub price: Decimal,
    /// Best bid, if the feed carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<Decimal>,
    /// Best ask, if the feed carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<Decimal>,
    /// Trade/quote size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    /// Server timestamp of the update. Conflict resolution key.
    pub as_of: DateTime<Utc>,
    /// Trade vs quote.
    pub kind: QuoteKind,
}

/// Account-level snapshot, replaced wholesale on each update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    /// Total account equity.
    pub equity: Decimal,
    /// Cash balance.
    pub cash: Decimal,
    /// Buying power, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buying_power: Option<Decimal>,
    /// Day change in account value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_change: Option<Decimal>,
    /// Server timestamp of the snapshot.
    pub as_of: DateTime<Utc>,
}

/// Open position for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    /// Position symbol.
    pub symbol: String,
    /// Signed quantity (negative = short).
    pub quantity: Decimal,
    /// Average entry price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_price: Option<Decimal>,
    /// Current market value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_value: Option<Decimal>,
    /// Unrealized profit/loss.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unrealized_pl: Option<Decimal>,
    /// Server timestamp of the update.
    pub as_of: DateTime<Utc>,
}

/// One trading alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEntry {
    /// Alert text.
    pub message: String,
    /// Severity label, when the feed provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// Related symbol, when the feed provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Server timestamp of the alert.
    pub at: DateTime<Utc>,
}

// =============================================================================
// Quote Book
// =============================================================================

/// Map of channel key to latest quote record.
///
/// Merges never replace the whole map: many keys may be subscribed
/// simultaneously and a `price_update` frame typically carries only a
/// subset of them.
#[derive(Debug, Default)]
pub struct QuoteBook {
    inner: RwLock<HashMap<ChannelKey, QuoteRecord>>,
}

impl QuoteBook {
    /// Create an empty quote book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one quote record. Returns `false` when the record is older
    /// than the stored one and was dropped.
    pub fn apply(&self, record: QuoteRecord) -> bool {
        let mut map = self.inner.write();
        match map.get(&record.key) {
            Some(existing) if existing.as_of > record.as_of => false,
            _ => {
                map.insert(record.key.clone(), record);
                true
            }
        }
    }

    /// Merge a batch of records. Returns how many were accepted.
    pub fn merge(&self, records: impl IntoIterator<Item = QuoteRecord>) -> usize {
        records.into_iter().filter(|r| self.apply(r.clone())).count()
    }

    /// Latest record for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<QuoteRecord> {
        self.inner.read().get(key).cloned()
    }

    /// Snapshot of the full book.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<ChannelKey, QuoteRecord> {
        self.inner.read().clone()
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the book is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

// =============================================================================
// Position Book
// =============================================================================

/// Map of symbol to latest position record.
#[derive(Debug, Default)]
pub struct PositionBook {
    inner: RwLock<HashMap<String, PositionRecord>>,
}

impl PositionBook {
    /// Create an empty position book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert one position record, latest-`as_of` wins.
    pub fn upsert(&self, record: PositionRecord) -> bool {
        let mut map = self.inner.write();
        match map.get(&record.symbol) {
            Some(existing) if existing.as_of > record.as_of => false,
            _ => {
                map.insert(record.symbol.clone(), record);
                true
            }
        }
    }

    /// Latest record for a symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<PositionRecord> {
        self.inner.read().get(symbol).cloned()
    }

    /// Snapshot of all positions.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, PositionRecord> {
        self.inner.read().clone()
    }
}

// =============================================================================
// Alert Log
// =============================================================================

/// Newest-first alert log with a fixed cap.
#[derive(Debug)]
pub struct AlertLog {
    inner: RwLock<VecDeque<AlertEntry>>,
    cap: usize,
}

impl AlertLog {
    /// Create an empty log with the given cap.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            inner: RwLock::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    /// Prepend an alert, evicting the oldest entries beyond the cap.
    pub fn push(&self, entry: AlertEntry) {
        let mut log = self.inner.write();
        log.push_front(entry);
        log.truncate(self.cap);
    }

    /// Snapshot, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AlertEntry> {
        self.inner.read().iter().cloned().collect()
    }

    /// Number of retained alerts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Configured cap.
    #[must_use]
    pub const fn cap(&self) -> usize {
        self.cap
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_CAP)
    }
}

// =============================================================================
// Composed Feed State
// =============================================================================

/// All state buckets for one feed client.
///
/// Mutated only from the client's actor context; reads are cheap
/// snapshots for the UI layer.
#[derive(Debug)]
pub struct FeedState {
    /// Quote records keyed by channel key.
    pub quotes: QuoteBook,
    /// Latest portfolio snapshot, if any has arrived.
    portfolio: RwLock<Option<PortfolioSnapshot>>,
    /// Position records keyed by symbol.
    pub positions: PositionBook,
    /// Capped trading-alert log.
    pub alerts: AlertLog,
}

impl FeedState {
    /// Create empty state with the given alert cap.
    #[must_use]
    pub fn new(alert_cap: usize) -> Self {
        Self {
            quotes: QuoteBook::new(),
            portfolio: RwLock::new(None),
            positions: PositionBook::new(),
            alerts: AlertLog::new(alert_cap),
        }
    }

    /// Replace the portfolio snapshot wholesale.
    pub fn replace_portfolio(&self, snapshot: PortfolioSnapshot) {
        *self.portfolio.write() = Some(snapshot);
    }

    /// Latest portfolio snapshot.
    #[must_use]
    pub fn portfolio(&self) -> Option<PortfolioSnapshot> {
        self.portfolio.read().clone()
    }
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_CAP)
    }
}

// =============================================================================
// Tests
// =============================================================================
