//! Ledger record and outcome types

use crate::source::AssetEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle state of one asset's evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "lowercase")]
pub enum RecordState {
    Seen,
    Evaluating,
    Rejected(String),
    Executed(String),
    Failed(String),
}

impl RecordState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordState::Rejected(_) | RecordState::Executed(_) | RecordState::Failed(_)
        )
    }

    /// Storage label
    pub fn label(&self) -> &'static str {
        match self {
            RecordState::Seen => "seen",
            RecordState::Evaluating => "evaluating",
            RecordState::Rejected(_) => "rejected",
            RecordState::Executed(_) => "executed",
            RecordState::Failed(_) => "failed",
        }
    }

    /// Rejection/failure reason or order reference
    pub fn detail(&self) -> Option<&str> {
        match self {
            RecordState::Rejected(d) | RecordState::Executed(d) | RecordState::Failed(d) => {
                Some(d)
            }
            _ => None,
        }
    }

    /// Rebuild from the stored label/detail pair
    pub fn from_parts(label: &str, detail: Option<String>) -> Option<Self> {
        let detail_or_empty = || detail.clone().unwrap_or_default();
        match label {
            "seen" => Some(RecordState::Seen),
            "evaluating" => Some(RecordState::Evaluating),
            "rejected" => Some(RecordState::Rejected(detail_or_empty())),
            "executed" => Some(RecordState::Executed(detail_or_empty())),
            "failed" => Some(RecordState::Failed(detail_or_empty())),
            _ => None,
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}({})", self.label(), detail),
            None => f.write_str(self.label()),
        }
    }
}

/// States a lease holder may commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalState {
    Rejected(String),
    Executed(String),
    Failed(String),
}

impl From<TerminalState> for RecordState {
    fn from(terminal: TerminalState) -> Self {
        match terminal {
            TerminalState::Rejected(reason) => RecordState::Rejected(reason),
            TerminalState::Executed(order_ref) => RecordState::Executed(order_ref),
            TerminalState::Failed(reason) => RecordState::Failed(reason),
        }
    }
}

/// Identity of one lease holder: `<process tag>:<unique suffix>`.
///
/// Each grant gets a fresh owner so a stale task of the same process can
/// never commit over a newer lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseOwner(String);

impl LeaseOwner {
    pub fn generate(process_tag: &str) -> Self {
        Self(format!("{}:{}", process_tag, uuid::Uuid::new_v4().simple()))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A granted, time-bounded claim on evaluating one asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub asset_id: String,
    pub owner: LeaseOwner,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expires_at - now
    }
}

/// Expiry instant of a lease granted at `now`
pub(crate) fn lease_deadline(now: DateTime<Utc>, ttl: std::time::Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365))
}

/// Durable evaluation record; one per asset id, never deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub asset_id: String,
    pub state: RecordState,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Owner that wrote the terminal state
    pub committed_by: Option<String>,
    /// Event that first created the record
    pub snapshot: Option<AssetEvent>,
}

/// Which records `try_begin_evaluation` may claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Pipeline path: Failed counts as terminal
    Fresh,
    /// Operator path: Failed may re-enter evaluation
    RetryFailed,
}

/// Classification of an existing record against a begin request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    Grant,
    Terminal,
    Leased,
}

impl EvaluationRecord {
    /// Record as it stands right after `lease` was granted for `event`
    pub fn leased(lease: &Lease, event: &AssetEvent) -> Self {
        Self {
            asset_id: lease.asset_id.clone(),
            state: RecordState::Evaluating,
            lease_owner: Some(lease.owner.as_str().to_string()),
            lease_expires_at: Some(lease.expires_at),
            updated_at: Utc::now(),
            committed_by: None,
            snapshot: Some(event.clone()),
        }
    }

    pub fn has_active_lease(&self, now: DateTime<Utc>) -> bool {
        self.state == RecordState::Evaluating
            && self.lease_expires_at.map(|exp| exp > now).unwrap_or(false)
    }

    pub(crate) fn claim(&self, admission: Admission, now: DateTime<Utc>) -> Claim {
        match &self.state {
            RecordState::Seen => Claim::Grant,
            RecordState::Evaluating if self.has_active_lease(now) => Claim::Leased,
            RecordState::Evaluating => Claim::Grant,
            RecordState::Failed(_) if admission == Admission::RetryFailed => Claim::Grant,
            RecordState::Rejected(_) | RecordState::Executed(_) | RecordState::Failed(_) => {
                Claim::Terminal
            }
        }
    }

    /// What a failed conditional commit means for `owner`
    pub(crate) fn commit_miss(
        &self,
        owner: &LeaseOwner,
        terminal: &RecordState,
        now: DateTime<Utc>,
    ) -> CommitOutcome {
        if self.state.is_terminal()
            && &self.state == terminal
            && self.committed_by.as_deref() == Some(owner.as_str())
        {
            return CommitOutcome::AlreadyCommitted;
        }
        if self.state == RecordState::Evaluating
            && self.lease_owner.as_deref() == Some(owner.as_str())
            && !self.has_active_lease(now)
        {
            return CommitOutcome::LeaseExpired;
        }
        CommitOutcome::LeaseNotHeld
    }
}

/// Result of `try_begin_evaluation`
#[derive(Debug, Clone)]
pub enum BeginOutcome {
    LeaseGranted(Lease),
    AlreadyTerminal(EvaluationRecord),
    AlreadyLeased(EvaluationRecord),
}

/// Result of `commit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Terminal state written, lease released
    Committed,
    /// Same owner already committed the same terminal state
    AlreadyCommitted,
    /// Caller never held, or no longer holds, the lease
    LeaseNotHeld,
    /// Caller's lease ran out before the commit
    LeaseExpired,
}

impl CommitOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, CommitOutcome::Committed | CommitOutcome::AlreadyCommitted)
    }
}

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Ledger migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt ledger record {asset_id}: {reason}")]
    Corrupt { asset_id: String, reason: String },

    #[error("Snapshot encoding failed: {0}")]
    Snapshot(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(state: RecordState) -> EvaluationRecord {
        EvaluationRecord {
            asset_id: "0xabc".into(),
            state,
            lease_owner: None,
            lease_expires_at: None,
            updated_at: Utc::now(),
            committed_by: None,
            snapshot: None,
        }
    }

    #[test]
    fn test_state_roundtrip_parts() {
        for state in [
            RecordState::Seen,
            RecordState::Evaluating,
            RecordState::Rejected("liquidity_below_threshold".into()),
            RecordState::Executed("ord-1".into()),
            RecordState::Failed("venue_timeout".into()),
        ] {
            let rebuilt =
                RecordState::from_parts(state.label(), state.detail().map(String::from)).unwrap();
            assert_eq!(rebuilt, state);
        }
        assert!(RecordState::from_parts("bogus", None).is_none());
    }

    #[test]
    fn test_claim_rules() {
        let now = Utc::now();

        assert_eq!(record(RecordState::Seen).claim(Admission::Fresh, now), Claim::Grant);
        assert_eq!(
            record(RecordState::Executed("o".into())).claim(Admission::RetryFailed, now),
            Claim::Terminal
        );
        assert_eq!(
            record(RecordState::Failed("x".into())).claim(Admission::Fresh, now),
            Claim::Terminal
        );
        assert_eq!(
            record(RecordState::Failed("x".into())).claim(Admission::RetryFailed, now),
            Claim::Grant
        );

        let mut leased = record(RecordState::Evaluating);
        leased.lease_owner = Some("p:1".into());
        leased.lease_expires_at = Some(now + Duration::seconds(10));
        assert_eq!(leased.claim(Admission::Fresh, now), Claim::Leased);

        leased.lease_expires_at = Some(now - Duration::seconds(1));
        assert_eq!(leased.claim(Admission::Fresh, now), Claim::Grant);
    }

    #[test]
    fn test_commit_miss_classification() {
        let now = Utc::now();
        let owner = LeaseOwner::from_raw("p:1");

        let mut done = record(RecordState::Executed("ord-1".into()));
        done.committed_by = Some("p:1".into());
        assert_eq!(
            done.commit_miss(&owner, &RecordState::Executed("ord-1".into()), now),
            CommitOutcome::AlreadyCommitted
        );
        assert_eq!(
            done.commit_miss(&owner, &RecordState::Executed("ord-2".into()), now),
            CommitOutcome::LeaseNotHeld
        );

        let mut expired = record(RecordState::Evaluating);
        expired.lease_owner = Some("p:1".into());
        expired.lease_expires_at = Some(now - Duration::seconds(1));
        assert_eq!(
            expired.commit_miss(&owner, &RecordState::Rejected("r".into()), now),
            CommitOutcome::LeaseExpired
        );

        assert_eq!(
            record(RecordState::Seen).commit_miss(&owner, &RecordState::Rejected("r".into()), now),
            CommitOutcome::LeaseNotHeld
        );
    }

    #[test]
    fn test_lease_owner_unique() {
        let a = LeaseOwner::generate("sniper-1");
        let b = LeaseOwner::generate("sniper-1");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("sniper-1:"));
    }
}
