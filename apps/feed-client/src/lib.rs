#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Feed Client - Real-Time Streaming State
//!
//! A client for real-time streaming feeds that maintains local state
//! buckets (quotes, portfolio, positions, alerts) from a server-pushed
//! JSON message stream, over either a duplex WebSocket or a
//! receive-only SSE push stream.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: State buckets and subscription tracking
//!   - `state`: Quote book, portfolio snapshot, positions, alert log
//!   - `subscription`: Channel-key registry and change deltas
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: The transport interface
//!   - `services`: Frame routing into state buckets
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `transport`: WebSocket and SSE adapters, backoff, liveness
//!   - `wire`: Message types and JSON codec
//!   - `cache`: Durable snapshot cache (SQLite)
//!   - `config`: Environment-variable configuration
//!   - `client`: The public facade and its lifecycle actor
//!
//! # Data Flow
//!
//! ```text
//! Feed server ──► transport ──► router ──► state buckets ──► accessors
//!                    │                          │
//!              liveness monitor           snapshot cache
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - State buckets and subscription tracking.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::state::{
    AlertEntry, ChannelKey, FeedState, PortfolioSnapshot, PositionRecord, QuoteKind, QuoteRecord,
};
pub use domain::subscription::{SubscriptionChanges, SubscriptionRegistry};

// Transport port and adapters (for integration tests and custom wiring)
pub use application::ports::Transport;
pub use infrastructure::transport::{
    BackoffConfig, LivenessConfig, SseTransport, TransportConnection, TransportError,
    TransportEvent, TransportKind, WebSocketTransport,
};

// Wire message types (for integration tests)
pub use infrastructure::wire::{FeedCodec, FeedMessage, SubscriptionRequest};

// Snapshot cache
pub use infrastructure::cache::{CacheError, SnapshotCache};

// Configuration
pub use infrastructure::config::{CacheSettings, ConfigError, FeedSettings};

// Client facade
pub use infrastructure::client::{ConnectionState, FeedClient, FeedClientError};
