//! Launch feed against a local WebSocket server

use futures_util::{SinkExt, StreamExt};
use launch_sniper::config::FeedConfig;
use launch_sniper::source::{EventSource, LaunchFeed};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

const SUBSCRIBE: &str = r#"{"op":"subscribe","channel":"new_pairs"}"#;

fn launch(address: &str, liquidity: u64) -> String {
    format!(r#"{{"type":"new_pair","token_address":"{address}","liquidity_usd":{liquidity}}}"#)
}

/// Serves one scripted session per connection, then closes it
async fn serve(listener: TcpListener, sessions: Vec<Vec<String>>) {
    for frames in sessions {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let first = ws.next().await.unwrap().unwrap();
        assert_eq!(first, Message::Text(SUBSCRIBE.to_string()));

        for frame in frames {
            ws.send(Message::Text(frame)).await.unwrap();
        }
        ws.close(None).await.unwrap();
    }
}

#[tokio::test]
async fn test_feed_survives_reconnect_and_absorbs_retransmissions() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let sessions = vec![
        vec![
            r#"{"type":"subscribed"}"#.to_string(),
            launch("0xAA01", 6000),
            launch("0xAA01", 6000),
            "not json".to_string(),
            launch("0xBB02", 7000),
        ],
        // The feed replays its last frame after the reconnect
        vec![launch("0xBB02", 7000), launch("0xCC03", 8000)],
    ];
    let server = tokio::spawn(serve(listener, sessions));

    let feed = LaunchFeed::new(
        &FeedConfig {
            name: "local".into(),
            url: format!("ws://{addr}"),
            subscribe: Some(SUBSCRIBE.into()),
            initial_backoff_ms: 20,
            max_backoff_ms: 100,
            backoff_jitter: 0.0,
        },
        Duration::from_secs(30),
        64,
    );
    let stats = feed.stats();
    let mut events = feed.subscribe().await.unwrap();

    let mut ids = Vec::new();
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        ids.push(event.asset_id);
    }
    assert_eq!(ids, vec!["0xaa01", "0xbb02", "0xcc03"]);

    server.await.unwrap();
    let snap = stats.snapshot();
    assert_eq!(snap.duplicates, 2);
    assert_eq!(snap.malformed, 1);
    assert_eq!(snap.events, 3);
    assert!(snap.reconnects >= 1);
}
