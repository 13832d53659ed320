//! Eligibility filter chain
//!
//! An ordered list of pass/fail/defer checks run against a leased
//! candidate. Filters are read-only: they never touch the ledger and never
//! trade.

mod remote;
mod rules;
mod types;

pub use remote::{RateLimitFilter, SentimentFilter};
pub use rules::{ContractSafetyFilter, DenylistFilter, LiquidityFilter};
pub use types::{ChainDecision, ChainReport, FilterCost, FilterVerdict, Outcome, VerdictCache};

use crate::config::EligibilityConfig;
use crate::ledger::EvaluationRecord;
use crate::sentiment::SentimentFeed;
use crate::source::AssetEvent;
use async_trait::async_trait;
use std::num::NonZeroU32;
use std::sync::Arc;

/// A single eligibility check
#[async_trait]
pub trait EligibilityFilter: Send + Sync {
    /// Stable name used in verdicts, logs and the cache
    fn name(&self) -> &'static str;

    fn cost(&self) -> FilterCost;

    /// Whether a Pass stays valid for the rest of the lease
    fn cacheable(&self) -> bool {
        self.cost() == FilterCost::Deterministic
    }

    async fn evaluate(&self, event: &AssetEvent, record: &EvaluationRecord) -> Outcome;
}

/// Filters ordered by cost, cheapest first
pub struct FilterChain {
    filters: Vec<Arc<dyn EligibilityFilter>>,
}

impl FilterChain {
    /// Sorts stably by cost; filters of equal cost keep their given order
    pub fn new(mut filters: Vec<Arc<dyn EligibilityFilter>>) -> Self {
        filters.sort_by_key(|f| f.cost());
        Self { filters }
    }

    /// Build the configured chain
    pub fn from_config(config: &EligibilityConfig, sentiment: Arc<dyn SentimentFeed>) -> Self {
        let mut filters: Vec<Arc<dyn EligibilityFilter>> = vec![
            Arc::new(LiquidityFilter::new(config.min_liquidity)),
            Arc::new(DenylistFilter::new(&config.denylist)),
            Arc::new(ContractSafetyFilter {
                max_buy_tax_bps: config.max_buy_tax_bps,
                max_sell_tax_bps: config.max_sell_tax_bps,
                require_renounced: config.require_renounced,
            }),
        ];

        if let Some(min) = config.min_sentiment {
            filters.push(Arc::new(SentimentFilter::new(sentiment, min)));
        }
        if let Some(max) = NonZeroU32::new(config.max_executions_per_minute) {
            filters.push(Arc::new(RateLimitFilter::per_minute(max)));
        }

        Self::new(filters)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run the chain, skipping filters already passed in `cache`.
    ///
    /// Stops at the first Fail or Defer.
    pub async fn run(
        &self,
        event: &AssetEvent,
        record: &EvaluationRecord,
        cache: &mut VerdictCache,
    ) -> ChainReport {
        let mut verdicts = Vec::with_capacity(self.filters.len());

        for filter in &self.filters {
            let name = filter.name();
            if cache.has_passed(name) {
                continue;
            }

            let outcome = filter.evaluate(event, record).await;
            tracing::trace!(asset_id = %event.asset_id, filter = name, ?outcome, "Filter verdict");
            verdicts.push(FilterVerdict {
                filter_name: name,
                outcome: outcome.clone(),
            });

            match outcome {
                Outcome::Pass => {
                    if filter.cacheable() {
                        cache.record_pass(name);
                    }
                }
                Outcome::Fail(reason) => {
                    return ChainReport {
                        verdicts,
                        decision: ChainDecision::Fail {
                            filter: name,
                            reason,
                        },
                    };
                }
                Outcome::Defer => {
                    return ChainReport {
                        verdicts,
                        decision: ChainDecision::Defer { filter: name },
                    };
                }
            }
        }

        ChainReport {
            verdicts,
            decision: ChainDecision::Pass,
        }
    }
}
