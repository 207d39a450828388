//! Transport Adapters
//!
//! Normalizes the two supported network channels (duplex WebSocket and
//! receive-only SSE push stream) to one event shape. Transport-specific
//! wiring stays here; parsing and state updates belong to the router.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::state::ChannelKey;

/// Duplex WebSocket transport.
pub mod websocket;

/// Receive-only SSE transport.
pub mod sse;

/// Exponential backoff reconnection policy.
pub mod reconnect;

/// Heartbeat staleness monitor.
pub mod liveness;

pub use liveness::{LivenessConfig, LivenessEvent, LivenessMonitor, LivenessState};
pub use reconnect::{BackoffConfig, ReconnectPolicy};
pub use sse::SseTransport;
pub use websocket::WebSocketTransport;

/// Capacity of the per-connection inbound event channel.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Capacity of the per-connection outbound text channel.
pub(crate) const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// Which kind of channel a transport opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Duplex socket: the client can send after opening.
    #[default]
    Duplex,
    /// Receive-only push stream: subscription intent must be encoded
    /// into the request target because the channel cannot send.
    PushStream,
}

/// One inbound event from a live connection.
///
/// A single tagged channel replaces open/message/error/close callback
/// wiring; the client actor consumes these in delivery order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The channel is open and ready.
    Opened,
    /// One raw inbound frame. Parsing belongs to the router.
    Message(String),
    /// Transport-level error. The connection is no longer usable.
    Error(String),
    /// The channel closed (clean or abnormal).
    Closed,
}

/// Everything the client needs to open a connection.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// Feed endpoint.
    pub url: String,
    /// Desired channel keys at open time. Push-stream transports encode
    /// these into the request target; duplex transports ignore them and
    /// replay over the wire instead.
    pub keys: Vec<ChannelKey>,
}

/// Handle to one live connection.
///
/// At most one of these exists per client; the facade closes the
/// previous handle before opening a replacement.
#[derive(Debug)]
pub struct TransportConnection {
    /// Inbound events, in delivery order.
    pub events: mpsc::Receiver<TransportEvent>,
    /// Outbound text frames. `None` for receive-only transports.
    pub outbound: Option<mpsc::Sender<String>>,
    cancel: CancellationToken,
}

impl TransportConnection {
    pub(crate) const fn new(
        events: mpsc::Receiver<TransportEvent>,
        outbound: Option<mpsc::Sender<String>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            events,
            outbound,
            cancel,
        }
    }

    /// Whether this connection can send.
    #[must_use]
    pub const fn can_send(&self) -> bool {
        self.outbound.is_some()
    }

    /// Tear the connection down, stopping its pump tasks.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TransportConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Errors raised while opening or driving a connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connecting to the endpoint failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The endpoint URL could not be built.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),

    /// The server rejected the stream request.
    #[error("stream request rejected with status {0}")]
    Rejected(u16),
}
