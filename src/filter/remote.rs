//! Filters that depend on external reads or shared capacity

use super::{EligibilityFilter, FilterCost, Outcome};
use crate::ledger::EvaluationRecord;
use crate::sentiment::{SentimentFeed, SentimentScore};
use crate::source::AssetEvent;
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Requires a minimum sentiment score; defers while no score exists
pub struct SentimentFilter {
    feed: Arc<dyn SentimentFeed>,
    min_score: f64,
}

impl SentimentFilter {
    pub fn new(feed: Arc<dyn SentimentFeed>, min_score: f64) -> Self {
        Self { feed, min_score }
    }
}

#[async_trait]
impl EligibilityFilter for SentimentFilter {
    fn name(&self) -> &'static str {
        "sentiment"
    }

    fn cost(&self) -> FilterCost {
        FilterCost::Remote
    }

    async fn evaluate(&self, event: &AssetEvent, _record: &EvaluationRecord) -> Outcome {
        match self.feed.score(&event.asset_id).await {
            SentimentScore::Unavailable => Outcome::Defer,
            SentimentScore::Score(score) if score < self.min_score => {
                Outcome::fail("sentiment_below_threshold")
            }
            SentimentScore::Score(_) => Outcome::Pass,
        }
    }
}

/// Process-wide cap on execution admissions.
///
/// Each Pass consumes one unit of quota, so this filter must be the last
/// one in the chain. An exhausted quota defers rather than rejects.
pub struct RateLimitFilter {
    limiter: DirectRateLimiter,
}

impl RateLimitFilter {
    pub fn per_minute(max: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::direct(Quota::per_minute(max)),
        }
    }
}

#[async_trait]
impl EligibilityFilter for RateLimitFilter {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn cost(&self) -> FilterCost {
        FilterCost::Admission
    }

    async fn evaluate(&self, event: &AssetEvent, _record: &EvaluationRecord) -> Outcome {
        match self.limiter.check() {
            Ok(()) => Outcome::Pass,
            Err(_) => {
                tracing::debug!(asset_id = %event.asset_id, "Execution quota exhausted");
                Outcome::Defer
            }
        }
    }
}
