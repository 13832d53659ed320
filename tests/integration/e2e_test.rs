//! End-to-end runs through the pipeline against a SQLite ledger

use crate::common::{coordinator, sqlite_url, CountingVenue};
use launch_sniper::ledger::{Ledger, RecordState, SqliteLedger};
use launch_sniper::pipeline::Pipeline;
use launch_sniper::source::AssetEvent;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

async fn sqlite_ledger(url: &str) -> Arc<dyn Ledger> {
    Arc::new(
        SqliteLedger::connect(url, 4, Duration::from_secs(5))
            .await
            .unwrap(),
    )
}

/// Feed `events` through a fresh pipeline and wait for it to drain
async fn run_events(
    ledger: Arc<dyn Ledger>,
    venue: Arc<CountingVenue>,
    process_tag: &str,
    events: Vec<AssetEvent>,
) -> launch_sniper::pipeline::PipelineStatsSnapshot {
    let pipeline = Pipeline::new(
        coordinator(Arc::clone(&ledger), venue, process_tag),
        ledger,
        8,
        Duration::from_secs(60),
    );
    let (tx, rx) = mpsc::channel(events.len().max(1));
    for event in events {
        tx.send(event).await.unwrap();
    }
    drop(tx);

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    pipeline.run(rx, shutdown_rx).await
}

#[tokio::test]
async fn test_qualifying_asset_executes_once() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = sqlite_ledger(&sqlite_url(&dir)).await;
    let venue = Arc::new(CountingVenue::default());

    let stats = run_events(
        Arc::clone(&ledger),
        Arc::clone(&venue),
        "e2e",
        vec![AssetEvent::new("0xABC", dec!(50000))],
    )
    .await;
    assert_eq!(stats.executed, 1);

    let record = ledger.get("0xABC").await.unwrap().unwrap();
    assert_eq!(record.state, RecordState::Executed("ord-1".into()));

    let stats = run_events(
        Arc::clone(&ledger),
        Arc::clone(&venue),
        "e2e",
        vec![AssetEvent::new("0xABC", dec!(50000))],
    )
    .await;
    assert_eq!(stats.dropped_terminal, 1);
    assert_eq!(stats.executed, 0);
    assert_eq!(venue.calls(), 1);
}

#[tokio::test]
async fn test_illiquid_asset_is_rejected_without_trading() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = sqlite_ledger(&sqlite_url(&dir)).await;
    let venue = Arc::new(CountingVenue::default());

    let stats = run_events(
        Arc::clone(&ledger),
        Arc::clone(&venue),
        "e2e",
        vec![AssetEvent::new("0xDEF", dec!(10))],
    )
    .await;

    assert_eq!(stats.rejected, 1);
    let record = ledger.get("0xDEF").await.unwrap().unwrap();
    assert_eq!(
        record.state,
        RecordState::Rejected("liquidity_below_threshold".into())
    );
    assert_eq!(venue.calls(), 0);
}

#[tokio::test]
async fn test_two_processes_share_one_execution_per_asset() {
    let dir = tempfile::tempdir().unwrap();
    let url = sqlite_url(&dir);
    let venue = Arc::new(CountingVenue::default());

    // Each asset is announced three times to each process
    let events: Vec<AssetEvent> = (0..5)
        .flat_map(|i| {
            let id = format!("0x{i:040x}");
            (0..3).map(move |_| AssetEvent::new(id.clone(), dec!(9000)))
        })
        .collect();

    let first = sqlite_ledger(&url).await;
    let second = sqlite_ledger(&url).await;
    let (a, b) = tokio::join!(
        run_events(first, Arc::clone(&venue), "proc-a", events.clone()),
        run_events(second, Arc::clone(&venue), "proc-b", events),
    );

    assert_eq!(a.executed + b.executed, 5);
    assert_eq!(venue.calls(), 5);
    assert_eq!(a.errors + b.errors, 0);
    assert_eq!(a.finished() + b.finished(), 30);

    let ledger = sqlite_ledger(&url).await;
    let counts = ledger.state_counts().await.unwrap();
    assert_eq!(counts.get("executed").copied(), Some(5));
}
