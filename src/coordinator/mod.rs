//! Execution coordinator
//!
//! Owns the at-most-once execution guarantee for a single asset id:
//!
//! ```text
//! Candidate → Leased → Filtering → Executing → Executed | Failed
//!                          └──────→ Rejected
//! ```
//!
//! Nothing happens without a lease, the lease is re-confirmed right before
//! the venue call, and the venue is called at most once per lease. A lease
//! too short to cover the venue timeout plus the commit is released
//! instead of submitting. Every terminal outcome is written with a
//! conditional commit; a venue outcome that could not be written is kept
//! in memory and committed by the next evaluation of the same asset
//! instead of trading again.

mod retry;
mod types;

pub use retry::retry_async;
pub use types::{
    AbandonReason, CoordinatorError, Disposition, ErrorCode, ExecutionResult, Phase,
};

use crate::config::Config;
use crate::filter::{ChainDecision, FilterChain, VerdictCache};
use crate::ledger::{
    Admission, BeginOutcome, CommitOutcome, EvaluationRecord, Lease, LeaseOwner, Ledger,
    LedgerError, RecordState, TerminalState,
};
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::source::AssetEvent;
use crate::telemetry::{record_latency, record_outcome, LatencyMetric, OutcomeMetric};
use crate::venue::{TradeParams, TradeVenue};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const COMMIT_ATTEMPTS: usize = 3;
const COMMIT_RETRY_DELAY: Duration = Duration::from_millis(50);
/// Lease time reserved after the venue timeout for the terminal commit
const COMMIT_MARGIN: Duration = Duration::from_millis(250);

/// Timing and sizing knobs of the coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Prefix of every lease owner id issued by this process
    pub process_tag: String,
    pub lease_ttl: Duration,
    pub venue_timeout: Duration,
    pub defer_retry: Duration,
    pub max_defer_attempts: u32,
    pub trade: TradeParams,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            process_tag: config.pipeline.process_tag(),
            lease_ttl: config.ledger.lease_ttl(),
            venue_timeout: config.execution.venue_timeout(),
            defer_retry: Duration::from_millis(config.filters.defer_retry_ms),
            max_defer_attempts: config.filters.max_defer_attempts,
            trade: TradeParams {
                size: config.execution.size,
                max_slippage_bps: config.execution.max_slippage_bps,
            },
        }
    }
}

/// Drives one candidate from lease acquisition to a terminal commit
pub struct ExecutionCoordinator {
    ledger: Arc<dyn Ledger>,
    chain: FilterChain,
    venue: Arc<dyn TradeVenue>,
    notifier: Arc<dyn Notifier>,
    settings: CoordinatorSettings,
    /// Venue outcomes whose commit failed, keyed by asset id
    unrecorded: Mutex<HashMap<String, (TerminalState, ExecutionResult)>>,
}

impl ExecutionCoordinator {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        chain: FilterChain,
        venue: Arc<dyn TradeVenue>,
        notifier: Arc<dyn Notifier>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            ledger,
            chain,
            venue,
            notifier,
            settings,
            unrecorded: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Evaluate a freshly observed event
    pub async fn process(&self, event: &AssetEvent) -> Result<Disposition, CoordinatorError> {
        self.begin(event, Admission::Fresh).await
    }

    /// Operator entry: re-evaluate an asset whose execution Failed.
    ///
    /// Rebuilds the candidate from the stored snapshot and takes a fresh
    /// lease; only records in the Failed state qualify.
    pub async fn retry_failed(&self, asset_id: &str) -> Result<Disposition, CoordinatorError> {
        let record = self
            .ledger
            .get(asset_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(asset_id.to_string()))?;

        if !matches!(record.state, RecordState::Failed(_)) {
            return Err(CoordinatorError::NotRetryable {
                asset_id: asset_id.to_string(),
                state: record.state.to_string(),
            });
        }
        let event = record
            .snapshot
            .ok_or_else(|| CoordinatorError::NoSnapshot(asset_id.to_string()))?;

        tracing::info!(asset_id, previous = %record.state, "Retrying failed evaluation");
        self.begin(&event, Admission::RetryFailed).await
    }

    async fn begin(
        &self,
        event: &AssetEvent,
        admission: Admission,
    ) -> Result<Disposition, CoordinatorError> {
        let started = Instant::now();
        let asset_id = event.asset_id.as_str();
        let owner = LeaseOwner::generate(&self.settings.process_tag);

        tracing::trace!(asset_id, phase = %Phase::Candidate, "Requesting lease");
        let outcome = self
            .ledger
            .try_begin_evaluation(event, &owner, self.settings.lease_ttl, admission)
            .await
            .inspect_err(|_| record_outcome(OutcomeMetric::LedgerError))?;

        let lease = match outcome {
            BeginOutcome::LeaseGranted(lease) => lease,
            BeginOutcome::AlreadyLeased(record) => {
                tracing::debug!(
                    asset_id,
                    holder = ?record.lease_owner,
                    code = %ErrorCode::AlreadyLeased,
                    "Dropping candidate"
                );
                record_outcome(OutcomeMetric::DroppedLeased);
                return Ok(Disposition::Dropped(ErrorCode::AlreadyLeased));
            }
            BeginOutcome::AlreadyTerminal(record) => {
                tracing::debug!(
                    asset_id,
                    state = %record.state,
                    code = %ErrorCode::AlreadyTerminal,
                    "Dropping candidate"
                );
                record_outcome(OutcomeMetric::DroppedTerminal);
                return Ok(Disposition::Dropped(ErrorCode::AlreadyTerminal));
            }
        };

        tracing::debug!(asset_id, owner = %lease.owner, phase = %Phase::Leased, "Lease granted");
        let disposition = self.evaluate(event, &lease).await;
        record_latency(LatencyMetric::Evaluation, started.elapsed());

        if disposition.is_err() {
            record_outcome(OutcomeMetric::LedgerError);
        }
        disposition
    }

    async fn evaluate(
        &self,
        event: &AssetEvent,
        lease: &Lease,
    ) -> Result<Disposition, CoordinatorError> {
        let asset_id = lease.asset_id.as_str();

        // The trade already went out under an earlier lease; only the commit is owed
        let pending = self.unrecorded.lock().await.remove(asset_id);
        if let Some((terminal, result)) = pending {
            tracing::warn!(asset_id, owner = %lease.owner, "Recording earlier venue outcome, no new submission");
            return self.record_execution(lease, terminal, result).await;
        }

        let record = EvaluationRecord::leased(lease, event);
        let mut cache = VerdictCache::new();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let chain_started = Instant::now();
            let report = self.chain.run(event, &record, &mut cache).await;
            record_latency(LatencyMetric::FilterChain, chain_started.elapsed());
            tracing::debug!(
                asset_id,
                phase = %Phase::Filtering,
                attempt,
                verdicts = report.verdicts.len(),
                decision = ?report.decision,
                "Filter chain finished"
            );

            match report.decision {
                ChainDecision::Pass => break,
                ChainDecision::Fail { filter, reason } => {
                    return self.reject(lease, filter, reason).await;
                }
                ChainDecision::Defer { filter } => {
                    if attempt >= self.settings.max_defer_attempts || !self.has_room_to_defer(lease)
                    {
                        return self.give_up(lease, filter).await;
                    }
                    tokio::time::sleep(self.settings.defer_retry).await;
                }
            }
        }

        self.execute(lease).await
    }

    /// Another chain run plus a full submission budget must fit in the lease
    fn has_room_to_defer(&self, lease: &Lease) -> bool {
        lease_covers(lease, self.settings.defer_retry + self.submission_budget())
    }

    /// Venue timeout plus the time reserved for the commit after it
    fn submission_budget(&self) -> Duration {
        self.settings.venue_timeout + COMMIT_MARGIN
    }

    async fn give_up(
        &self,
        lease: &Lease,
        filter: &'static str,
    ) -> Result<Disposition, CoordinatorError> {
        let released = self.ledger.release(&lease.asset_id, &lease.owner).await?;
        tracing::info!(
            asset_id = %lease.asset_id,
            filter,
            released,
            "Deferred past lease budget, returning to seen"
        );
        record_outcome(OutcomeMetric::Abandoned);
        Ok(Disposition::Abandoned(AbandonReason::DeferExhausted {
            filter,
        }))
    }

    async fn reject(
        &self,
        lease: &Lease,
        filter: &'static str,
        reason: String,
    ) -> Result<Disposition, CoordinatorError> {
        let asset_id = lease.asset_id.as_str();
        let terminal = TerminalState::Rejected(reason.clone());

        match self.commit(lease, &terminal).await? {
            CommitOutcome::Committed | CommitOutcome::AlreadyCommitted => {
                tracing::info!(asset_id, filter, %reason, "Rejected");
                record_outcome(OutcomeMetric::Rejected);
                self.notifier.notify(Notification::new(
                    asset_id,
                    NotificationKind::Rejected,
                    format!("rejected by {filter} filter: {reason}"),
                ));
                Ok(Disposition::Rejected { filter, reason })
            }
            lost => {
                let code = lost_code(lost);
                tracing::warn!(asset_id, filter, %code, "Rejection discarded, lease no longer held");
                record_outcome(OutcomeMetric::Abandoned);
                Ok(Disposition::Abandoned(AbandonReason::CommitLost(code)))
            }
        }
    }

    async fn execute(&self, lease: &Lease) -> Result<Disposition, CoordinatorError> {
        let asset_id = lease.asset_id.as_str();

        if !lease_covers(lease, self.submission_budget()) {
            let released = self.ledger.release(asset_id, &lease.owner).await?;
            tracing::warn!(
                asset_id,
                owner = %lease.owner,
                budget_ms = self.submission_budget().as_millis() as u64,
                released,
                "Lease too short for submission, returning to seen"
            );
            record_outcome(OutcomeMetric::Abandoned);
            return Ok(Disposition::Abandoned(AbandonReason::InsufficientLease));
        }

        if !self.ledger.confirm_lease(asset_id, &lease.owner).await? {
            tracing::warn!(asset_id, owner = %lease.owner, "Lease lost before submission, nothing sent");
            record_outcome(OutcomeMetric::Abandoned);
            return Ok(Disposition::Abandoned(AbandonReason::LeaseLost));
        }

        tracing::debug!(asset_id, phase = %Phase::Executing, venue = self.venue.name(), "Submitting");
        let submitted = Instant::now();
        let outcome = tokio::time::timeout(
            self.settings.venue_timeout,
            self.venue.submit(asset_id, &self.settings.trade),
        )
        .await;
        record_latency(LatencyMetric::VenueSubmission, submitted.elapsed());

        let (terminal, result) = match outcome {
            Ok(Ok(order_ref)) => (
                TerminalState::Executed(order_ref.to_string()),
                ExecutionResult::executed(asset_id, order_ref.to_string()),
            ),
            Ok(Err(e)) => {
                tracing::warn!(asset_id, error = %e, "Venue submission failed");
                (
                    TerminalState::Failed(e.reason()),
                    ExecutionResult::failed(asset_id, ErrorCode::VenueError),
                )
            }
            Err(_) => {
                tracing::warn!(
                    asset_id,
                    timeout_ms = self.settings.venue_timeout.as_millis() as u64,
                    "Venue submission timed out"
                );
                (
                    TerminalState::Failed(ErrorCode::VenueTimeout.as_str().to_string()),
                    ExecutionResult::failed(asset_id, ErrorCode::VenueTimeout),
                )
            }
        };

        self.record_execution(lease, terminal, result).await
    }

    async fn record_execution(
        &self,
        lease: &Lease,
        terminal: TerminalState,
        result: ExecutionResult,
    ) -> Result<Disposition, CoordinatorError> {
        let asset_id = lease.asset_id.as_str();

        match self.commit_within_lease(lease, &terminal).await {
            Ok(outcome) if outcome.is_ok() => {}
            Ok(lost) => {
                let code = lost_code(lost);
                tracing::error!(
                    asset_id,
                    order_ref = ?result.order_ref,
                    commit = %code,
                    code = %ErrorCode::LeaseLost,
                    "Lease lost after submission, outcome not recorded"
                );
                return Ok(self
                    .hold_unrecorded(lease, terminal, result, ErrorCode::LeaseLost, code.as_str())
                    .await);
            }
            Err(e) => {
                tracing::error!(
                    asset_id,
                    order_ref = ?result.order_ref,
                    error = %e,
                    code = %ErrorCode::StorageError,
                    "Venue outcome could not be recorded before the lease ran out"
                );
                return Ok(self
                    .hold_unrecorded(lease, terminal, result, ErrorCode::StorageError, "storage_error")
                    .await);
            }
        }

        match terminal {
            TerminalState::Executed(order_ref) => {
                tracing::info!(asset_id, %order_ref, "Executed");
                record_outcome(OutcomeMetric::Executed);
                self.notifier.notify(
                    Notification::new(asset_id, NotificationKind::Executed, "buy filled")
                        .with_order_ref(order_ref),
                );
                Ok(Disposition::Executed(result))
            }
            TerminalState::Failed(reason) | TerminalState::Rejected(reason) => {
                tracing::info!(asset_id, %reason, "Execution failed, awaiting operator retry");
                record_outcome(OutcomeMetric::Failed);
                self.notifier.notify(Notification::new(
                    asset_id,
                    NotificationKind::Failed,
                    format!("execution failed: {reason}"),
                ));
                Ok(Disposition::Failed(result))
            }
        }
    }

    /// Remember an outcome that is not in the ledger so it is never traded again
    async fn hold_unrecorded(
        &self,
        lease: &Lease,
        terminal: TerminalState,
        result: ExecutionResult,
        code: ErrorCode,
        cause: &str,
    ) -> Disposition {
        let asset_id = lease.asset_id.as_str();
        record_outcome(OutcomeMetric::Unrecorded);

        let mut note = Notification::new(
            asset_id,
            NotificationKind::LeaseLost,
            format!("trade submitted but not recorded ({cause})"),
        );
        if let Some(order_ref) = &result.order_ref {
            note = note.with_order_ref(order_ref.clone());
        }
        self.notifier.notify(note);

        self.unrecorded
            .lock()
            .await
            .insert(asset_id.to_string(), (terminal, result.clone()));

        Disposition::Unrecorded(ExecutionResult {
            error: Some(code),
            ..result
        })
    }

    /// Commit a venue outcome, retrying storage errors for as long as the lease holds
    async fn commit_within_lease(
        &self,
        lease: &Lease,
        terminal: &TerminalState,
    ) -> Result<CommitOutcome, LedgerError> {
        loop {
            match self.commit(lease, terminal).await {
                Err(e) if lease.remaining(Utc::now()) > chrono::Duration::zero() => {
                    tracing::warn!(
                        asset_id = %lease.asset_id,
                        error = %e,
                        "Commit still failing, retrying while the lease holds"
                    );
                    tokio::time::sleep(COMMIT_RETRY_DELAY).await;
                }
                other => return other,
            }
        }
    }

    /// Conditional commit, retried on storage errors only
    async fn commit(
        &self,
        lease: &Lease,
        terminal: &TerminalState,
    ) -> Result<CommitOutcome, LedgerError> {
        retry_async(
            |_| self.ledger.commit(&lease.asset_id, &lease.owner, terminal),
            COMMIT_ATTEMPTS,
            COMMIT_RETRY_DELAY,
        )
        .await
    }
}

/// Whether at least `needed` of the lease is left
fn lease_covers(lease: &Lease, needed: Duration) -> bool {
    lease
        .remaining(Utc::now())
        .to_std()
        .map(|remaining| remaining >= needed)
        .unwrap_or(false)
}

fn lost_code(outcome: CommitOutcome) -> ErrorCode {
    match outcome {
        CommitOutcome::LeaseExpired => ErrorCode::LeaseExpired,
        _ => ErrorCode::LeaseNotHeld,
    }
}
