//! Feed Client Facade
//!
//! Owns the connection lifecycle for one streaming feed: opening the
//! transport, replaying subscriptions, routing inbound frames, watching
//! heartbeat liveness, and reconnecting with exponential backoff. All
//! lifecycle work happens on a single actor task; the facade itself is
//! cheap to share and query.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::Transport;
use crate::application::services::{FrameRouter, router::restore_from_cache};
use crate::domain::state::{
    AlertEntry, ChannelKey, FeedState, PortfolioSnapshot, PositionRecord, QuoteRecord,
};
use crate::domain::subscription::{SubscriptionChanges, SubscriptionRegistry};
use crate::infrastructure::cache::{CacheError, SnapshotCache};
use crate::infrastructure::config::FeedSettings;
use crate::infrastructure::transport::{
    LivenessEvent, LivenessMonitor, LivenessState, OpenRequest, ReconnectPolicy, SseTransport,
    TransportConnection, TransportEvent, TransportKind, WebSocketTransport,
};
use crate::infrastructure::wire::{FeedCodec, SubscriptionRequest};

/// Capacity of the facade-to-actor command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Errors surfaced by the client facade.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// Opening the snapshot cache failed.
    #[error("snapshot cache error: {0}")]
    Cache(#[from] CacheError),

    /// The actor task is gone or saturated and cannot take commands.
    #[error("client is not accepting commands")]
    CommandChannel,
}

/// Connection lifecycle states, observable at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none wanted.
    Idle,
    /// First connection attempt in flight.
    Connecting,
    /// Live connection established.
    Connected,
    /// Connection lost; retrying with backoff.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// Retry budget exhausted; waiting for a manual reconnect.
    Failed,
}

/// Commands the facade sends to its actor task.
enum ClientCommand {
    /// Registry changed; wire the delta (or rewire a push stream).
    UpdateSubscriptions(SubscriptionChanges),
    /// Send a raw text frame if the connection can carry it.
    Send(String),
    /// Tear down and reconnect immediately with a fresh retry budget.
    Reconnect,
    /// Tear down and stay idle until told to reconnect.
    Disconnect,
}

/// How one connection session ended.
enum SessionEnd {
    /// Client is shutting down for good.
    Shutdown,
    /// Deliberate teardown; wait for a reconnect command.
    Manual,
    /// Immediate reconnect wanted with a fresh retry budget.
    Rewire,
    /// Connection lost; retry with backoff.
    Lost,
}

/// Streaming feed client.
///
/// Construct with [`FeedClient::new`], call [`FeedClient::connect`] from
/// within a Tokio runtime, then query the snapshot accessors at any
/// time. Subscription changes are accepted in every lifecycle state and
/// take effect on the next (or current) connection.
pub struct FeedClient {
    state: Arc<FeedState>,
    registry: Arc<SubscriptionRegistry>,
    connection_state: Arc<RwLock<ConnectionState>>,
    command_tx: mpsc::Sender<ClientCommand>,
    cancel: CancellationToken,
    seed: Mutex<Option<ClientActor>>,
}

impl FeedClient {
    /// Create a client using the transport adapter named in settings.
    ///
    /// With `auto_activate` set (the default), this also starts
    /// connecting, which requires a Tokio runtime context.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cache cannot be opened.
    pub fn new(settings: FeedSettings) -> Result<Self, FeedClientError> {
        let transport: Arc<dyn Transport> = match settings.transport {
            TransportKind::Duplex => Arc::new(WebSocketTransport::new()),
            TransportKind::PushStream => Arc::new(SseTransport::new()),
        };
        Self::with_transport(settings, transport)
    }

    /// Create a client over an explicit transport adapter.
    ///
    /// With `auto_activate` set (the default), this also starts
    /// connecting, which requires a Tokio runtime context.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cache cannot be opened.
    pub fn with_transport(
        settings: FeedSettings,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, FeedClientError> {
        let auto_activate = settings.auto_activate;
        let cache = match &settings.cache.path {
            Some(path) => Some(Arc::new(SnapshotCache::open(path)?)),
            None => None,
        };

        let state = Arc::new(FeedState::new(settings.alert_log_cap));
        if let Some(cache) = &cache {
            let restored = restore_from_cache(&state, cache, settings.cache.max_age);
            if restored > 0 {
                tracing::info!(restored, "Painted state from cached snapshots");
            }
        }

        let registry = Arc::new(SubscriptionRegistry::new());
        let connection_state = Arc::new(RwLock::new(ConnectionState::Idle));
        let liveness = Arc::new(LivenessState::new());
        let router = FrameRouter::new(Arc::clone(&state), Arc::clone(&liveness), cache);

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let actor = ClientActor {
            settings,
            transport,
            codec: FeedCodec::new(),
            registry: Arc::clone(&registry),
            router,
            liveness,
            connection_state: Arc::clone(&connection_state),
            command_rx,
            cancel: cancel.clone(),
        };

        let client = Self {
            state,
            registry,
            connection_state,
            command_tx,
            cancel,
            seed: Mutex::new(Some(actor)),
        };
        if auto_activate {
            client.connect()?;
        }
        Ok(client)
    }

    /// Start connecting. The first call spawns the actor task; later
    /// calls behave like [`FeedClient::reconnect`].
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor has shut down and cannot accept
    /// the restart command.
    pub fn connect(&self) -> Result<(), FeedClientError> {
        if let Some(actor) = self.seed.lock().take() {
            tokio::spawn(actor.run());
            Ok(())
        } else {
            self.command_tx
                .try_send(ClientCommand::Reconnect)
                .map_err(|_| FeedClientError::CommandChannel)
        }
    }

    /// Add channel keys to the subscription set. Keys already present
    /// are ignored; only genuinely new keys are wired to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor cannot accept the change.
    pub fn subscribe(&self, keys: &[ChannelKey]) -> Result<(), FeedClientError> {
        let changes = self.registry.add(keys);
        self.push_changes(changes)
    }

    /// Remove channel keys from the subscription set. Keys not present
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor cannot accept the change.
    pub fn unsubscribe(&self, keys: &[ChannelKey]) -> Result<(), FeedClientError> {
        let changes = self.registry.remove(keys);
        self.push_changes(changes)
    }

    /// Replace the desired set wholesale. Only the delta against the
    /// current registry is wired; unaffected keys see no gap.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor cannot accept the change.
    pub fn set_subscriptions(&self, keys: &[ChannelKey]) -> Result<(), FeedClientError> {
        let changes = self.registry.diff(keys);
        self.push_changes(changes)
    }

    fn push_changes(&self, changes: SubscriptionChanges) -> Result<(), FeedClientError> {
        if changes.is_empty() {
            return Ok(());
        }
        if self.seed.lock().is_some() {
            // Not started yet; the registry alone drives the first open.
            return Ok(());
        }
        self.command_tx
            .try_send(ClientCommand::UpdateSubscriptions(changes))
            .map_err(|_| FeedClientError::CommandChannel)
    }

    /// Send a raw text frame. Frames are dropped with a debug log when
    /// no sendable connection exists; nothing is queued for later.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor cannot accept the frame.
    pub fn send(&self, text: impl Into<String>) -> Result<(), FeedClientError> {
        self.command_tx
            .try_send(ClientCommand::Send(text.into()))
            .map_err(|_| FeedClientError::CommandChannel)
    }

    /// Tear down any current connection and reconnect immediately with
    /// a fresh retry budget. Also the way out of [`ConnectionState::Failed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the actor cannot accept the command.
    pub fn reconnect(&self) -> Result<(), FeedClientError> {
        self.command_tx
            .try_send(ClientCommand::Reconnect)
            .map_err(|_| FeedClientError::CommandChannel)
    }

    /// Tear down any current connection and stay idle. The actor keeps
    /// running and accepts [`FeedClient::reconnect`] later.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor cannot accept the command.
    pub fn disconnect(&self) -> Result<(), FeedClientError> {
        self.command_tx
            .try_send(ClientCommand::Disconnect)
            .map_err(|_| FeedClientError::CommandChannel)
    }

    /// Stop the actor task for good. The client cannot be restarted
    /// afterwards; snapshot accessors keep working.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Current connection lifecycle state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read()
    }

    /// The shared state buckets, for callers that want direct reads.
    #[must_use]
    pub fn state(&self) -> &FeedState {
        &self.state
    }

    /// Currently subscribed channel keys, sorted.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<ChannelKey> {
        self.registry.replay_set()
    }

    /// Latest quote for a channel key, if any.
    #[must_use]
    pub fn quote(&self, key: &str) -> Option<QuoteRecord> {
        self.state.quotes.get(key)
    }

    /// All current quotes keyed by channel.
    #[must_use]
    pub fn quotes(&self) -> std::collections::HashMap<ChannelKey, QuoteRecord> {
        self.state.quotes.snapshot()
    }

    /// Latest portfolio snapshot, if any.
    #[must_use]
    pub fn portfolio(&self) -> Option<PortfolioSnapshot> {
        self.state.portfolio()
    }

    /// All current positions keyed by symbol.
    #[must_use]
    pub fn positions(&self) -> std::collections::HashMap<String, PositionRecord> {
        self.state.positions.snapshot()
    }

    /// Retained alerts, newest first.
    #[must_use]
    pub fn alerts(&self) -> Vec<AlertEntry> {
        self.state.alerts.snapshot()
    }
}

impl Drop for FeedClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Owns the connection lifecycle on its own task.
struct ClientActor {
    settings: FeedSettings,
    transport: Arc<dyn Transport>,
    codec: FeedCodec,
    registry: Arc<SubscriptionRegistry>,
    router: FrameRouter,
    liveness: Arc<LivenessState>,
    connection_state: Arc<RwLock<ConnectionState>>,
    command_rx: mpsc::Receiver<ClientCommand>,
    cancel: CancellationToken,
}

impl ClientActor {
    async fn run(mut self) {
        let mut policy = ReconnectPolicy::new(self.settings.backoff.clone());
        self.set_state(ConnectionState::Connecting);

        loop {
            if self.cancel.is_cancelled() {
                self.set_state(ConnectionState::Idle);
                return;
            }

            match self.connect_and_run(&mut policy).await {
                SessionEnd::Shutdown => {
                    self.set_state(ConnectionState::Idle);
                    return;
                }
                SessionEnd::Manual => {
                    tracing::info!("Feed disconnected on request");
                    self.set_state(ConnectionState::Idle);
                    policy.reset();
                    if !self.wait_for_restart().await {
                        return;
                    }
                    self.set_state(ConnectionState::Connecting);
                }
                SessionEnd::Rewire => {
                    policy.reset();
                    self.set_state(ConnectionState::Connecting);
                }
                SessionEnd::Lost => {
                    if let Some(delay) = policy.next_delay() {
                        let attempt = policy.attempt_count();
                        self.set_state(ConnectionState::Reconnecting { attempt });
                        tracing::info!(
                            attempt,
                            delay_ms = delay.as_millis(),
                            "Reconnecting to feed"
                        );
                        match self.backoff_wait(delay).await {
                            SessionEnd::Shutdown => {
                                self.set_state(ConnectionState::Idle);
                                return;
                            }
                            SessionEnd::Manual => {
                                self.set_state(ConnectionState::Idle);
                                policy.reset();
                                if !self.wait_for_restart().await {
                                    return;
                                }
                                self.set_state(ConnectionState::Connecting);
                            }
                            SessionEnd::Rewire => {
                                policy.reset();
                                self.set_state(ConnectionState::Connecting);
                            }
                            SessionEnd::Lost => self.set_state(ConnectionState::Connecting),
                        }
                    } else {
                        tracing::error!("Reconnect attempts exhausted");
                        self.set_state(ConnectionState::Failed);
                        if !self.wait_for_restart().await {
                            return;
                        }
                        policy.reset();
                        self.set_state(ConnectionState::Connecting);
                    }
                }
            }
        }
    }

    /// Open one connection and drive it until it ends.
    async fn connect_and_run(&mut self, policy: &mut ReconnectPolicy) -> SessionEnd {
        let request = OpenRequest {
            url: self.settings.url.clone(),
            keys: self.registry.replay_set(),
        };

        let mut conn = match self.transport.open(request).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open feed connection");
                return SessionEnd::Lost;
            }
        };

        self.liveness.reset();
        let (liveness_tx, mut liveness_rx) = mpsc::channel::<LivenessEvent>(4);
        let liveness_cancel = CancellationToken::new();
        let monitor = LivenessMonitor::new(
            self.settings.liveness.clone(),
            Arc::clone(&self.liveness),
            liveness_tx,
            liveness_cancel.clone(),
        );
        tokio::spawn(monitor.run());
        let mut liveness_open = true;

        let end = loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    break SessionEnd::Shutdown;
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ClientCommand::UpdateSubscriptions(changes)) => {
                            if let Some(end) = self.apply_changes(&conn, changes).await {
                                break end;
                            }
                        }
                        Some(ClientCommand::Send(text)) => {
                            if let Some(outbound) = &conn.outbound {
                                if outbound.send(text).await.is_err() {
                                    tracing::debug!("Outbound channel closed; dropping frame");
                                }
                            } else {
                                tracing::debug!("Connection cannot send; dropping frame");
                            }
                        }
                        Some(ClientCommand::Reconnect) => break SessionEnd::Rewire,
                        Some(ClientCommand::Disconnect) => break SessionEnd::Manual,
                        None => break SessionEnd::Shutdown,
                    }
                }
                liveness_event = liveness_rx.recv(), if liveness_open => {
                    match liveness_event {
                        Some(LivenessEvent::Stale) => {
                            tracing::warn!("Heartbeats stale; recycling connection");
                            break SessionEnd::Lost;
                        }
                        None => liveness_open = false,
                    }
                }
                event = conn.events.recv() => {
                    match event {
                        Some(TransportEvent::Opened) => {
                            policy.reset();
                            self.liveness.record_heartbeat();
                            self.set_state(ConnectionState::Connected);
                            tracing::info!("Feed connected");
                            self.replay_subscriptions(&conn).await;
                        }
                        Some(TransportEvent::Message(raw)) => {
                            self.router.route(&raw);
                        }
                        Some(TransportEvent::Error(e)) => {
                            tracing::warn!(error = %e, "Feed connection error");
                            break SessionEnd::Lost;
                        }
                        Some(TransportEvent::Closed) => {
                            tracing::info!("Feed connection closed");
                            break SessionEnd::Lost;
                        }
                        None => break SessionEnd::Lost,
                    }
                }
            }
        };

        liveness_cancel.cancel();
        conn.close();
        end
    }

    /// Replay the full subscription set over a sendable connection.
    /// Push streams already carried the keys in the request target.
    async fn replay_subscriptions(&self, conn: &TransportConnection) {
        let keys = self.registry.replay_set();
        if keys.is_empty() || !conn.can_send() {
            return;
        }
        let count = keys.len();
        self.send_request(conn, &SubscriptionRequest::subscribe(keys))
            .await;
        tracing::debug!(count, "Replayed subscriptions");
    }

    /// Wire a subscription delta. A push stream cannot send, so any
    /// change there forces a rewire with the new key set.
    async fn apply_changes(
        &self,
        conn: &TransportConnection,
        changes: SubscriptionChanges,
    ) -> Option<SessionEnd> {
        if changes.is_empty() {
            return None;
        }
        if !conn.can_send() {
            tracing::info!("Subscription change on push stream; rewiring");
            return Some(SessionEnd::Rewire);
        }
        if !changes.subscribe.is_empty() {
            self.send_request(conn, &SubscriptionRequest::subscribe(changes.subscribe))
                .await;
        }
        if !changes.unsubscribe.is_empty() {
            self.send_request(conn, &SubscriptionRequest::unsubscribe(changes.unsubscribe))
                .await;
        }
        None
    }

    async fn send_request(&self, conn: &TransportConnection, request: &SubscriptionRequest) {
        let Some(outbound) = &conn.outbound else {
            return;
        };
        match self.codec.encode(request) {
            Ok(json) => {
                if outbound.send(json).await.is_err() {
                    tracing::debug!("Outbound channel closed; dropping subscription request");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode subscription request"),
        }
    }

    /// Sit out a backoff delay while still honoring commands.
    async fn backoff_wait(&mut self, delay: std::time::Duration) -> SessionEnd {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return SessionEnd::Shutdown,
                () = &mut sleep => return SessionEnd::Lost,
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ClientCommand::UpdateSubscriptions(_)) => {
                            // Registry already holds the change; the next
                            // open replays the full set.
                        }
                        Some(ClientCommand::Send(_)) => {
                            tracing::debug!("Not connected; dropping frame");
                        }
                        Some(ClientCommand::Reconnect) => return SessionEnd::Rewire,
                        Some(ClientCommand::Disconnect) => return SessionEnd::Manual,
                        None => return SessionEnd::Shutdown,
                    }
                }
            }
        }
    }

    /// Stay idle until a reconnect command arrives. Returns false when
    /// the actor should exit instead.
    async fn wait_for_restart(&mut self) -> bool {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return false,
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ClientCommand::Reconnect) => return true,
                        Some(ClientCommand::UpdateSubscriptions(_)) => {
                            // Registry already holds the change.
                        }
                        Some(ClientCommand::Send(_)) => {
                            tracing::debug!("Not connected; dropping frame");
                        }
                        Some(ClientCommand::Disconnect) => {
                            // Already idle.
                        }
                        None => return false,
                    }
                }
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let mut current = self.connection_state.write();
        if *current != next {
            tracing::debug!(from = ?*current, to = ?next, "Connection state change");
            *current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockTransport;
    use crate::infrastructure::transport::{BackoffConfig, TransportError};
    use std::time::Duration;

    fn fast_settings() -> FeedSettings {
        let mut settings = FeedSettings::new("ws://localhost:9000/feed");
        settings.backoff = BackoffConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 2,
        };
        settings.auto_activate = false;
        settings
    }

    /// Test double that hands out pre-scripted connections in order.
    struct ScriptedTransport {
        connections: Mutex<Vec<TransportConnection>>,
    }

    impl ScriptedTransport {
        fn new(connections: Vec<TransportConnection>) -> Self {
            Self {
                connections: Mutex::new(connections),
            }
        }
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Duplex
        }

        async fn open(&self, _request: OpenRequest) -> Result<TransportConnection, TransportError> {
            let mut connections = self.connections.lock();
            if connections.is_empty() {
                Err(TransportError::ConnectionFailed("script exhausted".into()))
            } else {
                Ok(connections.remove(0))
            }
        }
    }

    fn scripted_connection() -> (
        TransportConnection,
        mpsc::Sender<TransportEvent>,
        mpsc::Receiver<String>,
    ) {
        let (event_tx, event_rx) = mpsc::channel(16);
        let (outbound_tx, outbound_rx) = mpsc::channel(16);
        let conn = TransportConnection::new(event_rx, Some(outbound_tx), CancellationToken::new());
        (conn, event_tx, outbound_rx)
    }

    #[tokio::test]
    async fn exhausted_attempts_end_in_failed_state() {
        let mut mock = MockTransport::new();
        mock.expect_kind().return_const(TransportKind::Duplex);
        mock.expect_open()
            .returning(|_| Err(TransportError::ConnectionFailed("refused".into())));

        let client = FeedClient::with_transport(fast_settings(), Arc::new(mock)).unwrap();
        client.connect().unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if client.connection_state() == ConnectionState::Failed {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("client should give up after the retry budget");
    }

    #[tokio::test]
    async fn failed_opens_stop_exactly_at_the_attempt_budget() {
        let transport = Arc::new(CountingFailTransport::default());
        let mut settings = fast_settings();
        settings.backoff.max_attempts = 5;

        let client = FeedClient::with_transport(settings, transport.clone()).unwrap();
        client.connect().unwrap();

        wait_for_state(&client, ConnectionState::Failed).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            *transport.opens.lock(),
            5,
            "the fifth failed open is terminal"
        );
    }

    #[tokio::test]
    async fn reopen_after_backoff_passes_through_connecting() {
        let transport = Arc::new(GatedTransport::default());
        let mut settings = fast_settings();
        settings.backoff.initial_delay = Duration::from_millis(50);
        settings.backoff.max_attempts = 0;

        let client = FeedClient::with_transport(settings, transport.clone()).unwrap();
        client.connect().unwrap();
        wait_for_state(&client, ConnectionState::Connecting).await;

        transport.release_first.notify_one();
        wait_for_state(&client, ConnectionState::Reconnecting { attempt: 1 }).await;
        wait_for_state(&client, ConnectionState::Connecting).await;

        // The second open never resolves, so the state holds.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(client.connection_state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn connect_after_shutdown_reports_the_closed_channel() {
        let (conn, _event_tx, _outbound_rx) = scripted_connection();
        let transport = ScriptedTransport::new(vec![conn]);

        let client = FeedClient::with_transport(fast_settings(), Arc::new(transport)).unwrap();
        client.connect().unwrap();
        client.shutdown();

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if client.connect().is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connect should surface the closed command channel");
    }

    #[tokio::test]
    async fn manual_reconnect_leaves_failed_state() {
        let (conn, event_tx, _outbound_rx) = scripted_connection();
        // Two failed opens spend the budget; reconnect() eats one more
        // failure before the scripted connection comes through.
        let transport = FailFirst::new(ScriptedTransport::new(vec![conn]), 3);

        let client = FeedClient::with_transport(fast_settings(), Arc::new(transport)).unwrap();
        client.connect().unwrap();

        wait_for_state(&client, ConnectionState::Failed).await;
        client.reconnect().unwrap();
        let _ = event_tx.send(TransportEvent::Opened).await;
        wait_for_state(&client, ConnectionState::Connected).await;
    }

    #[tokio::test]
    async fn messages_flow_into_state_and_replay_happens_once_per_open() {
        let (conn, event_tx, mut outbound_rx) = scripted_connection();
        let transport = ScriptedTransport::new(vec![conn]);

        let client = FeedClient::with_transport(fast_settings(), Arc::new(transport)).unwrap();
        client.subscribe(&["quotes.AAPL".to_string()]).unwrap();
        client.connect().unwrap();

        event_tx.send(TransportEvent::Opened).await.unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        // The full registry goes out exactly once on open.
        let replay = tokio::time::timeout(Duration::from_secs(1), outbound_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(replay.contains("\"subscribe\""));
        assert!(replay.contains("quotes.AAPL"));

        event_tx
            .send(TransportEvent::Message(
                r#"{"type":"price_update","data":{"quotes.AAPL":{
                    "key":"quotes.AAPL","price":"187.23","asOf":"2026-08-28T14:30:00Z","kind":"quote"}}}"#
                    .to_string(),
            ))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if client.quote("quotes.AAPL").is_some() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("price update should land in the quote book");
    }

    #[tokio::test]
    async fn subscribe_while_connected_sends_only_the_delta() {
        let (conn, event_tx, mut outbound_rx) = scripted_connection();
        let transport = ScriptedTransport::new(vec![conn]);

        let client = FeedClient::with_transport(fast_settings(), Arc::new(transport)).unwrap();
        client.subscribe(&["quotes.AAPL".to_string()]).unwrap();
        client.connect().unwrap();
        event_tx.send(TransportEvent::Opened).await.unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        // Drain the replay frame.
        let _ = tokio::time::timeout(Duration::from_secs(1), outbound_rx.recv()).await;

        client
            .subscribe(&["quotes.AAPL".to_string(), "portfolio".to_string()])
            .unwrap();

        let delta = tokio::time::timeout(Duration::from_secs(1), outbound_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(delta.contains("portfolio"));
        assert!(!delta.contains("quotes.AAPL"));
    }

    #[tokio::test]
    async fn wholesale_set_wires_subscribe_and_unsubscribe_deltas() {
        let (conn, event_tx, mut outbound_rx) = scripted_connection();
        let transport = ScriptedTransport::new(vec![conn]);

        let client = FeedClient::with_transport(fast_settings(), Arc::new(transport)).unwrap();
        client
            .subscribe(&["quotes.AAPL".to_string(), "quotes.MSFT".to_string()])
            .unwrap();
        client.connect().unwrap();
        event_tx.send(TransportEvent::Opened).await.unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        // Drain the replay frame.
        let _ = tokio::time::timeout(Duration::from_secs(1), outbound_rx.recv()).await;

        client
            .set_subscriptions(&["quotes.MSFT".to_string(), "alerts".to_string()])
            .unwrap();

        let subscribe = tokio::time::timeout(Duration::from_secs(1), outbound_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(subscribe.contains("\"subscribe\""));
        assert!(subscribe.contains("alerts"));
        assert!(!subscribe.contains("quotes.MSFT"));

        let unsubscribe = tokio::time::timeout(Duration::from_secs(1), outbound_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(unsubscribe.contains("\"unsubscribe\""));
        assert!(unsubscribe.contains("quotes.AAPL"));

        let mut remaining = client.subscriptions();
        remaining.sort();
        assert_eq!(remaining, vec!["alerts".to_string(), "quotes.MSFT".to_string()]);
    }

    #[tokio::test]
    async fn disconnect_goes_idle_and_stays_there() {
        let (conn, event_tx, _outbound_rx) = scripted_connection();
        let transport = ScriptedTransport::new(vec![conn]);

        let client = FeedClient::with_transport(fast_settings(), Arc::new(transport)).unwrap();
        client.connect().unwrap();
        event_tx.send(TransportEvent::Opened).await.unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        client.disconnect().unwrap();
        wait_for_state(&client, ConnectionState::Idle).await;

        // No reconnect attempt happens on its own.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn send_while_disconnected_is_dropped_not_queued() {
        let (conn, event_tx, mut outbound_rx) = scripted_connection();
        let transport = ScriptedTransport::new(vec![conn]);

        let client = FeedClient::with_transport(fast_settings(), Arc::new(transport)).unwrap();
        client.connect().unwrap();
        event_tx.send(TransportEvent::Opened).await.unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        client.disconnect().unwrap();
        wait_for_state(&client, ConnectionState::Idle).await;

        client.send(r#"{"type":"ping"}"#).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(outbound_rx.try_recv().is_err());
    }

    async fn wait_for_state(client: &FeedClient, wanted: ConnectionState) {
        tokio::time::timeout(Duration::from_secs(1), async {
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

    /// Test double that refuses every open and counts the attempts.
    #[derive(Default)]
    struct CountingFailTransport {
        opens: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl Transport for CountingFailTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Duplex
        }

        async fn open(&self, _request: OpenRequest) -> Result<TransportConnection, TransportError> {
            *self.opens.lock() += 1;
            Err(TransportError::ConnectionFailed("refused".into()))
        }
    }

    /// First open blocks until released and then fails; later opens
    /// never resolve.
    #[derive(Default)]
    struct GatedTransport {
        release_first: tokio::sync::Notify,
        opens: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl Transport for GatedTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Duplex
        }

        async fn open(&self, _request: OpenRequest) -> Result<TransportConnection, TransportError> {
            let first = {
                let mut opens = self.opens.lock();
                *opens += 1;
                *opens == 1
            };
            if first {
                self.release_first.notified().await;
                Err(TransportError::ConnectionFailed("refused".into()))
            } else {
                std::future::pending().await
            }
        }
    }

    /// Wraps a transport and fails the first `n` opens.
    struct FailFirst<T> {
        inner: T,
        remaining: Mutex<u32>,
    }

    impl<T> FailFirst<T> {
        fn new(inner: T, failures: u32) -> Self {
            Self {
                inner,
                remaining: Mutex::new(failures),
            }
        }
    }

    #[async_trait::async_trait]
    impl<T: Transport> Transport for FailFirst<T> {
        fn kind(&self) -> TransportKind {
            self.inner.kind()
        }

        async fn open(&self, request: OpenRequest) -> Result<TransportConnection, TransportError> {
            {
                let mut remaining = self.remaining.lock();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(TransportError::ConnectionFailed("refused".into()));
                }
            }
            self.inner.open(request).await
        }
    }
}
