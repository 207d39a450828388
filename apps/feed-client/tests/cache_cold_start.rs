//! Cold start against the durable snapshot cache: a client that ran
//! before leaves snapshots behind, and the next client paints its state
//! from them before any connection opens.

mod common;

use std::time::Duration;

use common::{fast_settings, next_text, spawn_feed_server, wait_for_state};
use feed_client::{ConnectionState, FeedClient, FeedSettings};
use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;

const PRICE_UPDATE: &str = r#"{"type":"price_update","data":{"quotes.AAPL":{
    "key":"quotes.AAPL","price":"187.23","asOf":"2026-08-28T14:30:00Z","kind":"quote"}}}"#;

const PORTFOLIO_UPDATE: &str = r#"{"type":"portfolio_update","data":{
    "equity":"10500.00","cash":"2500.00","asOf":"2026-08-28T14:30:00Z"}}"#;

#[tokio::test]
async fn cold_start_paints_state_from_cached_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("snapshots.db");

    let (url, mut conns) = spawn_feed_server().await;
    let mut settings = fast_settings(&url);
    settings.cache.path = Some(db_path.clone());

    // First run: receive live updates, which write through to the cache.
    {
        let client = FeedClient::new(settings).unwrap();
        client.subscribe(&["quotes.AAPL".to_string()]).unwrap();
        client.connect().unwrap();

        let mut server = conns.recv().await.unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;
        let _ = next_text(&mut server).await;

        server
            .send(Message::Text(PRICE_UPDATE.into()))
            .await
            .unwrap();
        server
            .send(Message::Text(PORTFOLIO_UPDATE.into()))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if client.quote("quotes.AAPL").is_some() && client.portfolio().is_some() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("updates should apply before shutdown");

        client.shutdown();
    }

    // Second run: never connects, yet starts with yesterday's picture.
    let mut warm_settings = FeedSettings::new("ws://127.0.0.1:1/feed");
    warm_settings.auto_activate = false;
    warm_settings.cache.path = Some(db_path);
    let warm = FeedClient::new(warm_settings).unwrap();

    let quote = warm.quote("quotes.AAPL").expect("cached quote");
    assert_eq!(quote.price.to_string(), "187.23");
    let portfolio = warm.portfolio().expect("cached portfolio");
    assert_eq!(portfolio.equity.to_string(), "10500.00");
    assert_eq!(warm.connection_state(), ConnectionState::Idle);
}

#[tokio::test]
async fn cold_start_with_no_prior_cache_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = FeedSettings::new("ws://127.0.0.1:1/feed");
    settings.auto_activate = false;
    settings.cache.path = Some(dir.path().join("fresh.db"));

    let client = FeedClient::new(settings).unwrap();

    assert!(client.quotes().is_empty());
    assert!(client.portfolio().is_none());
    assert!(client.positions().is_empty());
    assert!(client.alerts().is_empty());
}
