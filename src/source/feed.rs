//! WebSocket launch feed

use super::dedup::DedupWindow;
use super::normalize::{parse_frame, Frame};
use super::{AssetEvent, EventSource, SourceStats};
use crate::config::FeedConfig;
use crate::ws::{WsClient, WsConfig, WsMessage};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One upstream launch feed delivering JSON frames over WebSocket
pub struct LaunchFeed {
    name: String,
    ws: WsConfig,
    dedup_window: Duration,
    dedup_capacity: usize,
    channel_capacity: usize,
    stats: Arc<SourceStats>,
}

impl LaunchFeed {
    pub fn new(feed: &FeedConfig, dedup_window: Duration, dedup_capacity: usize) -> Self {
        let mut ws = WsConfig::new(feed.url.clone())
            .initial_delay(Duration::from_millis(feed.initial_backoff_ms))
            .max_delay(Duration::from_millis(feed.max_backoff_ms))
            .jitter(feed.backoff_jitter);
        if let Some(frame) = &feed.subscribe {
            ws = ws.subscribe(frame.clone());
        }

        Self {
            name: feed.name.clone(),
            ws,
            dedup_window,
            dedup_capacity,
            channel_capacity: 1024,
            stats: Arc::new(SourceStats::default()),
        }
    }

    /// Buffer between this feed and its consumer
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Share counters with other feeds of the same process
    pub fn with_stats(mut self, stats: Arc<SourceStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> Arc<SourceStats> {
        Arc::clone(&self.stats)
    }

    /// Turn raw WebSocket traffic into canonical events
    async fn run_message_loop(
        name: String,
        mut ws_rx: mpsc::Receiver<WsMessage>,
        event_tx: mpsc::Sender<AssetEvent>,
        mut dedup: DedupWindow,
        stats: Arc<SourceStats>,
    ) {
        while let Some(msg) = ws_rx.recv().await {
            let text = match msg {
                WsMessage::Text(text) => text,
                WsMessage::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(_) => {
                        stats.record_malformed(&name);
                        tracing::debug!(feed = %name, "Dropping non-utf8 binary frame");
                        continue;
                    }
                },
                WsMessage::Connected => {
                    tracing::info!(feed = %name, "Launch feed connected");
                    continue;
                }
                WsMessage::Reconnecting { attempt, delay } => {
                    stats.record_reconnect(&name);
                    tracing::warn!(
                        feed = %name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Launch feed reconnecting"
                    );
                    continue;
                }
                WsMessage::Disconnected => {
                    tracing::error!(feed = %name, "Launch feed disconnected for good");
                    break;
                }
            };

            if let Some(event) = Self::ingest(&name, &text, &mut dedup, &stats) {
                if event_tx.send(event).await.is_err() {
                    tracing::debug!(feed = %name, "Event receiver dropped, stopping feed");
                    break;
                }
            }
        }
    }

    /// Dedup, parse and account a single frame
    fn ingest(
        name: &str,
        text: &str,
        dedup: &mut DedupWindow,
        stats: &SourceStats,
    ) -> Option<AssetEvent> {
        stats.record_frame(name);

        if !dedup.admit(text.as_bytes()) {
            stats.record_duplicate(name);
            return None;
        }

        match parse_frame(name, text) {
            Frame::Launch(event) => {
                stats.record_event(name);
                Some(event)
            }
            Frame::Control => None,
            Frame::Malformed(reason) => {
                stats.record_malformed(name);
                tracing::debug!(feed = %name, %reason, "Dropping malformed frame");
                None
            }
        }
    }
}

#[async_trait]
impl EventSource for LaunchFeed {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<AssetEvent>> {
        let (event_tx, event_rx) = mpsc::channel(self.channel_capacity);

        tracing::info!(feed = %self.name, url = %self.ws.url, "Subscribing to launch feed");

        let ws_rx = WsClient::new(self.ws.clone()).connect();
        let dedup = DedupWindow::new(self.dedup_window, self.dedup_capacity);
        let name = self.name.clone();
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            Self::run_message_loop(name, ws_rx, event_tx, dedup, stats).await;
        });

        Ok(event_rx)
    }
}
