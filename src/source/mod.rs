//! Event source adapter
//!
//! Normalizes raw launch feeds into a stream of canonical [`AssetEvent`]s.
//! Delivery is best-effort and at-least-once: byte-identical retransmissions
//! inside a short window are absorbed, gaps during reconnects are not
//! back-filled, and malformed payloads are counted and dropped.

mod dedup;
mod feed;
pub mod normalize;
mod types;

pub use dedup::DedupWindow;
pub use feed::LaunchFeed;
pub use normalize::{parse_frame, Frame};
pub use types::{canonical_asset_id, AssetEvent, Metadata};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Trait for launch event sources
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Start the source; the returned stream ends only when the source gives up
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<AssetEvent>>;
}

/// Ingest counters shared by the feeds of one process
#[derive(Debug, Default)]
pub struct SourceStats {
    frames: AtomicU64,
    duplicates: AtomicU64,
    malformed: AtomicU64,
    events: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of [`SourceStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStatsSnapshot {
    pub frames: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub events: u64,
    pub reconnects: u64,
}

impl SourceStats {
    fn record_frame(&self, feed: &str) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sniper_source_frames_total", "feed" => feed.to_string()).increment(1);
    }

    fn record_duplicate(&self, feed: &str) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sniper_source_duplicates_total", "feed" => feed.to_string())
            .increment(1);
    }

    fn record_malformed(&self, feed: &str) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sniper_source_malformed_total", "feed" => feed.to_string())
            .increment(1);
    }

    fn record_event(&self, feed: &str) {
        self.events.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sniper_source_events_total", "feed" => feed.to_string()).increment(1);
    }

    fn record_reconnect(&self, feed: &str) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sniper_source_reconnects_total", "feed" => feed.to_string())
            .increment(1);
    }

    pub fn snapshot(&self) -> SourceStatsSnapshot {
        SourceStatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Fans several sources into a single stream
pub struct MergedSource {
    sources: Vec<Arc<dyn EventSource>>,
    capacity: usize,
}

impl MergedSource {
    pub fn new(sources: Vec<Arc<dyn EventSource>>, capacity: usize) -> Self {
        Self {
            sources,
            capacity: capacity.max(1),
        }
    }
}

#[async_trait]
impl EventSource for MergedSource {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<AssetEvent>> {
        let (tx, rx) = mpsc::channel(self.capacity);

        for source in &self.sources {
            let mut upstream = source.subscribe().await?;
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(event) = upstream.recv().await {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            });
        }

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// Source replaying a fixed list of events
    struct FixedSource(Vec<AssetEvent>);

    #[async_trait]
    impl EventSource for FixedSource {
        async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<AssetEvent>> {
            let (tx, rx) = mpsc::channel(16);
            for event in self.0.clone() {
                tx.send(event).await?;
            }
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn test_merged_source_forwards_all() {
        let a: Arc<dyn EventSource> = Arc::new(FixedSource(vec![
            AssetEvent::new("0xa1", dec!(1)),
            AssetEvent::new("0xa2", dec!(2)),
        ]));
        let b: Arc<dyn EventSource> = Arc::new(FixedSource(vec![AssetEvent::new("0xb1", dec!(3))]));

        let mut rx = MergedSource::new(vec![a, b], 8).subscribe().await.unwrap();

        let mut ids = Vec::new();
        while let Some(event) = rx.recv().await {
            ids.push(event.asset_id);
        }
        ids.sort();
        assert_eq!(ids, vec!["0xa1", "0xa2", "0xb1"]);
    }

    #[test]
    fn test_stats_snapshot_starts_empty() {
        assert_eq!(SourceStats::default().snapshot(), SourceStatsSnapshot::default());
    }
}
