//! Ledger behavior across independent connection pools on one database file

use crate::common::sqlite_url;
use launch_sniper::ledger::{
    Admission, BeginOutcome, CommitOutcome, LeaseOwner, Ledger, RecordState, SqliteLedger,
    TerminalState,
};
use launch_sniper::source::AssetEvent;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

async fn open(url: &str) -> Arc<SqliteLedger> {
    Arc::new(
        SqliteLedger::connect(url, 2, Duration::from_secs(5))
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn test_concurrent_pools_grant_one_lease() {
    let dir = tempfile::tempdir().unwrap();
    let url = sqlite_url(&dir);
    let event = AssetEvent::new("0xrace", dec!(10000));

    let mut handles = Vec::new();
    for i in 0..4 {
        let ledger = open(&url).await;
        let event = event.clone();
        handles.push(tokio::spawn(async move {
            let owner = LeaseOwner::generate(&format!("proc-{i}"));
            ledger
                .try_begin_evaluation(&event, &owner, Duration::from_secs(30), Admission::Fresh)
                .await
                .unwrap()
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if let BeginOutcome::LeaseGranted(_) = handle.await.unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 1);
}

#[tokio::test]
async fn test_crashed_holder_is_superseded_after_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let url = sqlite_url(&dir);
    let event = AssetEvent::new("0xcrash", dec!(10000));

    let crashed = open(&url).await;
    let stale_owner = LeaseOwner::generate("crashed");
    let outcome = crashed
        .try_begin_evaluation(&event, &stale_owner, Duration::from_millis(50), Admission::Fresh)
        .await
        .unwrap();
    assert!(matches!(outcome, BeginOutcome::LeaseGranted(_)));

    let survivor = open(&url).await;
    let owner = LeaseOwner::generate("survivor");
    let outcome = survivor
        .try_begin_evaluation(&event, &owner, Duration::from_secs(30), Admission::Fresh)
        .await
        .unwrap();
    assert!(matches!(outcome, BeginOutcome::AlreadyLeased(_)));

    tokio::time::sleep(Duration::from_millis(80)).await;
    let outcome = survivor
        .try_begin_evaluation(&event, &owner, Duration::from_secs(30), Admission::Fresh)
        .await
        .unwrap();
    assert!(matches!(outcome, BeginOutcome::LeaseGranted(_)));

    let terminal = TerminalState::Executed("ord-9".into());
    assert_eq!(
        crashed.commit("0xcrash", &stale_owner, &terminal).await.unwrap(),
        CommitOutcome::LeaseNotHeld
    );
    assert_eq!(
        survivor.commit("0xcrash", &owner, &terminal).await.unwrap(),
        CommitOutcome::Committed
    );

    let record = crashed.get("0xcrash").await.unwrap().unwrap();
    assert_eq!(record.state, RecordState::Executed("ord-9".into()));
    assert_eq!(record.committed_by.as_deref(), Some(owner.as_str()));
}

#[tokio::test]
async fn test_reaper_on_one_pool_frees_lease_for_another() {
    let dir = tempfile::tempdir().unwrap();
    let url = sqlite_url(&dir);
    let event = AssetEvent::new("0xreap", dec!(10000));

    let first = open(&url).await;
    let owner = LeaseOwner::generate("first");
    first
        .try_begin_evaluation(&event, &owner, Duration::from_millis(20), Admission::Fresh)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = open(&url).await;
    assert_eq!(second.reap_expired_leases().await.unwrap(), 1);
    let record = first.get("0xreap").await.unwrap().unwrap();
    assert_eq!(record.state, RecordState::Seen);
    assert!(record.lease_owner.is_none());
}
