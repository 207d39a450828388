//! Application Services
//!
//! Stateless-ish coordinators that sit between transports and domain
//! state.

pub mod router;

pub use router::FrameRouter;
