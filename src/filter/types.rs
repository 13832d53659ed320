//! Filter verdict types

use serde::Serialize;
use std::collections::HashSet;

/// Outcome of one filter on one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Pass,
    /// Rejected with a machine-readable reason
    Fail(String),
    /// Not decidable yet; retry the chain later
    Defer,
}

impl Outcome {
    pub fn fail(reason: impl Into<String>) -> Self {
        Outcome::Fail(reason.into())
    }
}

/// Relative cost of a filter; the chain runs cheaper classes first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FilterCost {
    /// Pure function of the event
    Deterministic,
    /// Needs a network read from an external collaborator
    Remote,
    /// Consumes shared capacity (rate limits); must run last
    Admission,
}

/// One filter's verdict on a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterVerdict {
    pub filter_name: &'static str,
    pub outcome: Outcome,
}

/// Aggregate decision of a chain run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChainDecision {
    Pass,
    Fail { filter: &'static str, reason: String },
    Defer { filter: &'static str },
}

/// Ordered verdicts of one chain run plus the resulting decision.
///
/// Verdicts served from the cache are not repeated here.
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub verdicts: Vec<FilterVerdict>,
    pub decision: ChainDecision,
}

/// Pass verdicts of cacheable filters, scoped to one lease
#[derive(Debug, Default, Clone)]
pub struct VerdictCache {
    passed: HashSet<&'static str>,
}

impl VerdictCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_passed(&self, filter_name: &str) -> bool {
        self.passed.contains(filter_name)
    }

    pub(crate) fn record_pass(&mut self, filter_name: &'static str) {
        self.passed.insert(filter_name);
    }

    pub fn len(&self) -> usize {
        self.passed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passed.is_empty()
    }
}
