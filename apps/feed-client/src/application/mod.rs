//! Application Layer - Ports and services.
//!
//! The transport port is the seam between the client actor and the
//! concrete network adapters; the router service turns raw frames into
//! state-bucket updates.

/// Port interfaces for external systems.
pub mod ports;

/// Application services (frame routing).
pub mod services;
