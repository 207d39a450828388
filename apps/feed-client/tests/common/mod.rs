//! Shared helpers for integration tests: a real in-process WebSocket
//! feed server bound to an ephemeral port.

use std::time::Duration;

use feed_client::{BackoffConfig, ConnectionState, FeedClient, FeedSettings};
use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

pub type ServerSocket = WebSocketStream<TcpStream>;

/// Bind an ephemeral port and hand each accepted WebSocket connection
/// back to the test.
pub async fn spawn_feed_server() -> (String, mpsc::Receiver<ServerSocket>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (conn_tx, conn_rx) = mpsc::channel(4);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(socket) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            if conn_tx.send(socket).await.is_err() {
                return;
            }
        }
    });

    (format!("ws://{addr}/feed"), conn_rx)
}

/// Settings with a tight backoff so reconnect tests run in milliseconds.
pub fn fast_settings(url: &str) -> FeedSettings {
    let mut settings = FeedSettings::new(url);
    settings.backoff = BackoffConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        multiplier: 2.0,
        jitter_factor: 0.0,
        max_attempts: 0,
    };
    settings.auto_activate = false;
    settings
}

/// Next text frame from the server side, skipping control frames.
pub async fn next_text(socket: &mut ServerSocket) -> String {
    loop {
        match tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("server should receive a frame")
            .expect("connection should stay open")
            .expect("frame should be readable")
        {
            Message::Text(text) => return text.to_string(),
            _ => continue,
        }
    }
}

/// Poll until the client reaches the wanted lifecycle state.
pub async fn wait_for_state(client: &FeedClient, wanted: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if client.connection_state() == wanted {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client should reach the wanted state");
}
