//! Port Interfaces
//!
//! The `Transport` port is the only driven port: it is how the client
//! reaches the network. Concrete adapters live in
//! `infrastructure::transport`.

use async_trait::async_trait;

use crate::infrastructure::transport::{
    OpenRequest, TransportConnection, TransportError, TransportKind,
};

/// A factory for live feed connections.
///
/// An `open` failure is the construction-failure case of the error
/// taxonomy: the caller funnels it into the same reconnect path as a
/// runtime error or close.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which kind of channel this transport opens.
    fn kind(&self) -> TransportKind;

    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the channel cannot be
    /// established.
    async fn open(&self, request: OpenRequest) -> Result<TransportConnection, TransportError>;
}
