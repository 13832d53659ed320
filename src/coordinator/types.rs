//! Coordinator outcome types

use crate::ledger::LedgerError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Evaluation phase of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Candidate,
    Leased,
    Filtering,
    Executing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Candidate => "candidate",
            Phase::Leased => "leased",
            Phase::Filtering => "filtering",
            Phase::Executing => "executing",
        };
        f.write_str(s)
    }
}

/// Error taxonomy shared by logs, results and notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Feed disconnect; retried inside the source
    TransportError,
    /// Unparseable frame; dropped and counted
    MalformedEvent,
    /// Another evaluator holds the lease
    AlreadyLeased,
    /// Asset already has a final outcome
    AlreadyTerminal,
    /// Business rejection by a filter
    FilterFailure,
    VenueError,
    VenueTimeout,
    LeaseExpired,
    LeaseNotHeld,
    /// Trade submitted but the outcome could not be committed
    LeaseLost,
    StorageError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TransportError => "transport_error",
            ErrorCode::MalformedEvent => "malformed_event",
            ErrorCode::AlreadyLeased => "already_leased",
            ErrorCode::AlreadyTerminal => "already_terminal",
            ErrorCode::FilterFailure => "filter_failure",
            ErrorCode::VenueError => "venue_error",
            ErrorCode::VenueTimeout => "venue_timeout",
            ErrorCode::LeaseExpired => "lease_expired",
            ErrorCode::LeaseNotHeld => "lease_not_held",
            ErrorCode::LeaseLost => "lease_lost",
            ErrorCode::StorageError => "storage_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a venue submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub asset_id: String,
    pub order_ref: Option<String>,
    pub success: bool,
    pub error: Option<ErrorCode>,
}

impl ExecutionResult {
    pub fn executed(asset_id: &str, order_ref: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            order_ref: Some(order_ref.into()),
            success: true,
            error: None,
        }
    }

    pub fn failed(asset_id: &str, code: ErrorCode) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            order_ref: None,
            success: false,
            error: Some(code),
        }
    }
}

/// Why an evaluation ended without a terminal state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    /// Deferred until the lease budget ran out; lease released
    DeferExhausted { filter: &'static str },
    /// Lease gone before trade submission; nothing was sent
    LeaseLost,
    /// Too little lease left to cover the venue timeout and the commit; lease released
    InsufficientLease,
    /// Rejection could not be committed; another evaluator owns the record now
    CommitLost(ErrorCode),
}

/// Final disposition of one `process` / `retry_failed` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Not evaluated: `AlreadyLeased` or `AlreadyTerminal`
    Dropped(ErrorCode),
    Rejected { filter: &'static str, reason: String },
    Executed(ExecutionResult),
    Failed(ExecutionResult),
    /// Trade submitted, but the outcome could not be committed
    Unrecorded(ExecutionResult),
    Abandoned(AbandonReason),
}

impl Disposition {
    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Dropped(ErrorCode::AlreadyTerminal) => "dropped_terminal",
            Disposition::Dropped(_) => "dropped_leased",
            Disposition::Rejected { .. } => "rejected",
            Disposition::Executed(_) => "executed",
            Disposition::Failed(_) => "failed",
            Disposition::Unrecorded(_) => "unrecorded",
            Disposition::Abandoned(_) => "abandoned",
        }
    }
}

/// Coordinator errors
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("No evaluation record for {0}")]
    NotFound(String),

    #[error("{asset_id} is {state}, only failed evaluations can be retried")]
    NotRetryable { asset_id: String, state: String },

    #[error("No event snapshot stored for {0}")]
    NoSnapshot(String),
}

impl CoordinatorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CoordinatorError::Ledger(_) => ErrorCode::StorageError,
            CoordinatorError::NotFound(_) | CoordinatorError::NoSnapshot(_) => {
                ErrorCode::StorageError
            }
            CoordinatorError::NotRetryable { .. } => ErrorCode::AlreadyTerminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCode::VenueTimeout).unwrap();
        assert_eq!(json, "\"venue_timeout\"");
        assert_eq!(ErrorCode::LeaseLost.to_string(), "lease_lost");
    }

    #[test]
    fn test_disposition_labels() {
        assert_eq!(
            Disposition::Dropped(ErrorCode::AlreadyTerminal).label(),
            "dropped_terminal"
        );
        assert_eq!(
            Disposition::Dropped(ErrorCode::AlreadyLeased).label(),
            "dropped_leased"
        );
        assert_eq!(
            Disposition::Executed(ExecutionResult::executed("0xabc", "ord-1")).label(),
            "executed"
        );
    }

    #[test]
    fn test_execution_result_constructors() {
        let ok = ExecutionResult::executed("0xabc", "ord-1");
        assert!(ok.success);
        assert_eq!(ok.order_ref.as_deref(), Some("ord-1"));

        let failed = ExecutionResult::failed("0xabc", ErrorCode::VenueTimeout);
        assert!(!failed.success);
        assert_eq!(failed.error, Some(ErrorCode::VenueTimeout));
    }
}
