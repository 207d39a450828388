//! Server-Sent Events Transport
//!
//! Receive-only adapter over a streaming HTTP response. Subscription
//! intent travels in the request target as a `channels` query parameter,
//! so a registry change while connected requires a fresh request.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    EVENT_CHANNEL_CAPACITY, OpenRequest, TransportConnection, TransportError, TransportEvent,
    TransportKind,
};
use crate::application::ports::Transport;
use crate::domain::state::ChannelKey;

/// Receive-only SSE transport.
#[derive(Debug, Default, Clone)]
pub struct SseTransport {
    client: reqwest::Client,
}

impl SseTransport {
    /// Create a new SSE transport with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::PushStream
    }

    async fn open(&self, request: OpenRequest) -> Result<TransportConnection, TransportError> {
        let url = encode_channels(&request.url, &request.keys);
        tracing::debug!(url = %url, "Opening SSE stream");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected(status.as_u16()));
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let _ = event_tx.send(TransportEvent::Opened).await;
        tokio::spawn(pump(response, event_tx, cancel.clone()));

        Ok(TransportConnection::new(event_rx, None, cancel))
    }
}

async fn pump(
    response: reqwest::Response,
    event_tx: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) {
    let mut stream = response.bytes_stream().eventsource();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("SSE pump cancelled");
                return;
            }
            event = stream.next() => {
                match event {
                    Some(Ok(event)) => {
                        if event_tx
                            .send(TransportEvent::Message(event.data))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                        return;
                    }
                    None => {
                        tracing::debug!("SSE stream ended");
                        let _ = event_tx.send(TransportEvent::Closed).await;
                        return;
                    }
                }
            }
        }
    }
}

/// Append the subscription keys to the request target. An empty key set
/// leaves the target untouched.
fn encode_channels(url: &str, keys: &[ChannelKey]) -> String {
    if keys.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}channels={}", keys.join(","))
}
