//! Pipeline counters

use crate::coordinator::{CoordinatorError, Disposition, ErrorCode};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals of one pipeline
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    dropped_leased: AtomicU64,
    dropped_terminal: AtomicU64,
    rejected: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    unrecorded: AtomicU64,
    errors: AtomicU64,
    reaped: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    pub received: u64,
    pub dropped_leased: u64,
    pub dropped_terminal: u64,
    pub rejected: u64,
    pub executed: u64,
    pub failed: u64,
    pub abandoned: u64,
    pub unrecorded: u64,
    pub errors: u64,
    pub reaped: u64,
}

impl PipelineStats {
    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sniper_pipeline_received_total").increment(1);
    }

    pub(crate) fn record_reaped(&self, count: u64) {
        self.reaped.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record(&self, result: &Result<Disposition, CoordinatorError>) {
        let counter = match result {
            Ok(Disposition::Dropped(ErrorCode::AlreadyTerminal)) => &self.dropped_terminal,
            Ok(Disposition::Dropped(_)) => &self.dropped_leased,
            Ok(Disposition::Rejected { .. }) => &self.rejected,
            Ok(Disposition::Executed(_)) => &self.executed,
            Ok(Disposition::Failed(_)) => &self.failed,
            Ok(Disposition::Abandoned(_)) => &self.abandoned,
            Ok(Disposition::Unrecorded(_)) => &self.unrecorded,
            Err(_) => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dropped_leased: self.dropped_leased.load(Ordering::Relaxed),
            dropped_terminal: self.dropped_terminal.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            unrecorded: self.unrecorded.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            reaped: self.reaped.load(Ordering::Relaxed),
        }
    }
}

impl PipelineStatsSnapshot {
    /// Evaluations that reached a final disposition
    pub fn finished(&self) -> u64 {
        self.dropped_leased
            + self.dropped_terminal
            + self.rejected
            + self.executed
            + self.failed
            + self.abandoned
            + self.unrecorded
            + self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::ExecutionResult;

    #[test]
    fn test_record_dispositions() {
        let stats = PipelineStats::default();
        stats.record_received();
        stats.record_received();
        stats.record(&Ok(Disposition::Executed(ExecutionResult::executed("0xa", "o"))));
        stats.record(&Ok(Disposition::Dropped(ErrorCode::AlreadyTerminal)));
        stats.record(&Err(CoordinatorError::NotFound("0xb".into())));
        stats.record_reaped(3);

        let snap = stats.snapshot();
        assert_eq!(snap.received, 2);
        assert_eq!(snap.executed, 1);
        assert_eq!(snap.dropped_terminal, 1);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.reaped, 3);
        assert_eq!(snap.finished(), 3);
    }
}
