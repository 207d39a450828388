//! Domain layer - Feed state and subscription tracking.
//!
//! No I/O here: these types are mutated by the application layer and
//! read by the consuming UI.

/// Feed state buckets (quotes, portfolio, positions, alerts).
pub mod state;

/// Desired-subscription registry.
pub mod subscription;
