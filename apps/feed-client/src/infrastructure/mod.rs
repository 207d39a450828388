//! Infrastructure Layer - Adapters and external integrations.

/// Snapshot cache backed by a local SQLite database.
pub mod cache;

/// Feed client facade and its lifecycle actor.
pub mod client;

/// Configuration loaded from environment variables.
pub mod config;

/// Transport adapters, reconnection policy, and liveness monitoring.
pub mod transport;

/// Wire message types and the JSON codec.
pub mod wire;
