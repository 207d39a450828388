//! WebSocket Transport
//!
//! Duplex adapter over tokio-tungstenite. One pump task per connection
//! moves frames between the socket and the client's event/outbound
//! channels; transport-level pings are answered here so the protocol
//! layer never sees them.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::{
    EVENT_CHANNEL_CAPACITY, OUTBOUND_CHANNEL_CAPACITY, OpenRequest, TransportConnection,
    TransportError, TransportEvent, TransportKind,
};
use crate::application::ports::Transport;

/// Duplex WebSocket transport.
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Duplex
    }

    async fn open(&self, request: OpenRequest) -> Result<TransportConnection, TransportError> {
        tracing::debug!(url = %request.url, "Opening WebSocket connection");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&request.url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let _ = event_tx.send(TransportEvent::Opened).await;
        tokio::spawn(pump(ws_stream, outbound_rx, event_tx, cancel.clone()));

        Ok(TransportConnection::new(
            event_rx,
            Some(outbound_tx),
            cancel,
        ))
    }
}

/// Move frames between the socket and the connection channels until
/// the socket ends or the connection is cancelled.
async fn pump(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    mut outbound_rx: mpsc::Receiver<String>,
    event_tx: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) {
    let (mut write, mut read) = ws_stream.split();
    let mut outbound_open = true;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("WebSocket pump cancelled");
                let _ = write.send(Message::Close(None)).await;
                return;
            }
            maybe_text = outbound_rx.recv(), if outbound_open => {
                match maybe_text {
                    Some(text) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                            return;
                        }
                    }
                    None => outbound_open = false,
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if event_tx
                            .send(TransportEvent::Message(text.to_string()))
                            .await
                            .is_err()
                        {
                            // Consumer is gone; nothing left to pump for.
                            return;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::debug!("Server sent close frame");
                        let _ = event_tx.send(TransportEvent::Closed).await;
                        return;
                    }
                    Some(Ok(_)) => {
                        // Binary/pong frames carry nothing for this protocol.
                    }
                    Some(Err(e)) => {
                        let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                        return;
                    }
                    None => {
                        tracing::debug!("WebSocket stream ended");
                        let _ = event_tx.send(TransportEvent::Closed).await;
                        return;
                    }
                }
            }
        }
    }
}
