//! Deduplication ledger
//!
//! The single authority on whether an asset may be evaluated. Each asset id
//! moves through `seen → evaluating → {rejected, executed, failed}`; the
//! `evaluating` state carries a time-bounded lease, and only the lease holder
//! may commit the terminal state. Expired leases fall back to `seen` and may
//! be claimed again.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use types::{
    Admission, BeginOutcome, CommitOutcome, EvaluationRecord, Lease, LeaseOwner, LedgerError,
    RecordState, TerminalState,
};

use crate::config::{LedgerBackend, LedgerConfig};
use crate::source::AssetEvent;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Lease-based evaluation ledger.
///
/// Every method is a single atomic transition; callers never hold a lock
/// across an await.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Claim the right to evaluate `event.asset_id`.
    ///
    /// Creates the record on first sight. Grants a lease when the record is
    /// `seen`, when its lease has expired, or (with [`Admission::RetryFailed`])
    /// when it is `failed`.
    async fn try_begin_evaluation(
        &self,
        event: &AssetEvent,
        owner: &LeaseOwner,
        ttl: Duration,
        admission: Admission,
    ) -> Result<BeginOutcome, LedgerError>;

    /// Write a terminal state, only if `owner` holds an unexpired lease
    async fn commit(
        &self,
        asset_id: &str,
        owner: &LeaseOwner,
        terminal: &TerminalState,
    ) -> Result<CommitOutcome, LedgerError>;

    /// Whether `owner` still holds an unexpired lease
    async fn confirm_lease(&self, asset_id: &str, owner: &LeaseOwner) -> Result<bool, LedgerError>;

    /// Give a held lease back without a terminal state (record returns to `seen`)
    async fn release(&self, asset_id: &str, owner: &LeaseOwner) -> Result<bool, LedgerError>;

    /// Return every expired lease to `seen`; returns how many were reaped
    async fn reap_expired_leases(&self) -> Result<u64, LedgerError>;

    async fn get(&self, asset_id: &str) -> Result<Option<EvaluationRecord>, LedgerError>;

    /// Record count per state label
    async fn state_counts(&self) -> Result<BTreeMap<String, u64>, LedgerError>;
}

/// Open the configured ledger backend
pub async fn open_ledger(config: &LedgerConfig) -> Result<Arc<dyn Ledger>, LedgerError> {
    match config.backend {
        LedgerBackend::Sqlite => {
            let ledger = SqliteLedger::connect(
                &config.database_url,
                config.max_connections,
                Duration::from_millis(config.busy_timeout_ms),
            )
            .await?;
            Ok(Arc::new(ledger))
        }
        LedgerBackend::Memory => {
            tracing::warn!(
                target: "ledger",
                "Using in-memory ledger; duplicate protection is limited to this process"
            );
            Ok(Arc::new(MemoryLedger::new()))
        }
    }
}
