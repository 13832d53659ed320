//! In-process ledger

use super::types::{lease_deadline, Claim};
use super::{
    Admission, BeginOutcome, CommitOutcome, EvaluationRecord, Lease, LeaseOwner, Ledger,
    LedgerError, RecordState, TerminalState,
};
use crate::source::AssetEvent;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Ledger kept in memory behind a single write lock.
///
/// Same transition rules as the durable ledger, but only serializes callers
/// inside one process. Used for paper runs and tests.
#[derive(Default)]
pub struct MemoryLedger {
    records: Arc<RwLock<HashMap<String, EvaluationRecord>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn try_begin_evaluation(
        &self,
        event: &AssetEvent,
        owner: &LeaseOwner,
        ttl: Duration,
        admission: Admission,
    ) -> Result<BeginOutcome, LedgerError> {
        let now = Utc::now();
        let expires_at = lease_deadline(now, ttl);
        let mut records = self.records.write().await;

        let record = records
            .entry(event.asset_id.clone())
            .or_insert_with(|| EvaluationRecord {
                asset_id: event.asset_id.clone(),
                state: RecordState::Seen,
                lease_owner: None,
                lease_expires_at: None,
                updated_at: now,
                committed_by: None,
                snapshot: Some(event.clone()),
            });

        match record.claim(admission, now) {
            Claim::Terminal => return Ok(BeginOutcome::AlreadyTerminal(record.clone())),
            Claim::Leased => return Ok(BeginOutcome::AlreadyLeased(record.clone())),
            Claim::Grant => {}
        }

        record.state = RecordState::Evaluating;
        record.lease_owner = Some(owner.as_str().to_string());
        record.lease_expires_at = Some(expires_at);
        record.committed_by = None;
        record.updated_at = now;

        Ok(BeginOutcome::LeaseGranted(Lease {
            asset_id: event.asset_id.clone(),
            owner: owner.clone(),
            expires_at,
        }))
    }

    async fn commit(
        &self,
        asset_id: &str,
        owner: &LeaseOwner,
        terminal: &TerminalState,
    ) -> Result<CommitOutcome, LedgerError> {
        let now = Utc::now();
        let target = RecordState::from(terminal.clone());
        let mut records = self.records.write().await;

        let Some(record) = records.get_mut(asset_id) else {
            return Ok(CommitOutcome::LeaseNotHeld);
        };

        let holds = record.has_active_lease(now)
            && record.lease_owner.as_deref() == Some(owner.as_str());
        if !holds {
            return Ok(record.commit_miss(owner, &target, now));
        }

        record.state = target;
        record.lease_owner = None;
        record.lease_expires_at = None;
        record.committed_by = Some(owner.as_str().to_string());
        record.updated_at = now;
        Ok(CommitOutcome::Committed)
    }

    async fn confirm_lease(&self, asset_id: &str, owner: &LeaseOwner) -> Result<bool, LedgerError> {
        let now = Utc::now();
        let records = self.records.read().await;
        Ok(records.get(asset_id).is_some_and(|r| {
            r.has_active_lease(now) && r.lease_owner.as_deref() == Some(owner.as_str())
        }))
    }

    async fn release(&self, asset_id: &str, owner: &LeaseOwner) -> Result<bool, LedgerError> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        match records.get_mut(asset_id) {
            Some(record)
                if record.state == RecordState::Evaluating
                    && record.lease_owner.as_deref() == Some(owner.as_str()) =>
            {
                record.state = RecordState::Seen;
                record.lease_owner = None;
                record.lease_expires_at = None;
                record.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reap_expired_leases(&self) -> Result<u64, LedgerError> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let mut reaped = 0;
        for record in records.values_mut() {
            if record.state == RecordState::Evaluating && !record.has_active_lease(now) {
                record.state = RecordState::Seen;
                record.lease_owner = None;
                record.lease_expires_at = None;
                record.updated_at = now;
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    async fn get(&self, asset_id: &str) -> Result<Option<EvaluationRecord>, LedgerError> {
        Ok(self.records.read().await.get(asset_id).cloned())
    }

    async fn state_counts(&self) -> Result<BTreeMap<String, u64>, LedgerError> {
        let records = self.records.read().await;
        let mut counts = BTreeMap::new();
        for record in records.values() {
            *counts.entry(record.state.label().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
