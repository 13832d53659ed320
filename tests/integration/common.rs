//! Shared fixtures for the integration suite

use async_trait::async_trait;
use launch_sniper::config::EligibilityConfig;
use launch_sniper::coordinator::{CoordinatorSettings, ExecutionCoordinator};
use launch_sniper::filter::FilterChain;
use launch_sniper::ledger::Ledger;
use launch_sniper::notify::LogNotifier;
use launch_sniper::sentiment::StaticSentimentFeed;
use launch_sniper::venue::{OrderRef, TradeParams, TradeVenue, VenueError};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Venue that fills every order as `ord-<n>` and counts submissions
#[derive(Default)]
pub struct CountingVenue {
    calls: AtomicUsize,
}

impl CountingVenue {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TradeVenue for CountingVenue {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn submit(&self, _asset_id: &str, _params: &TradeParams) -> Result<OrderRef, VenueError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        // Let concurrent evaluations interleave around the submission
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(OrderRef::from(format!("ord-{n}").as_str()))
    }
}

pub fn eligibility() -> EligibilityConfig {
    EligibilityConfig {
        min_liquidity: dec!(5000),
        denylist: vec![],
        max_buy_tax_bps: None,
        max_sell_tax_bps: None,
        require_renounced: false,
        min_sentiment: None,
        max_executions_per_minute: 0,
        defer_retry_ms: 20,
        max_defer_attempts: 3,
    }
}

pub fn settings(process_tag: &str) -> CoordinatorSettings {
    CoordinatorSettings {
        process_tag: process_tag.into(),
        lease_ttl: Duration::from_secs(30),
        venue_timeout: Duration::from_secs(2),
        defer_retry: Duration::from_millis(20),
        max_defer_attempts: 3,
        trade: TradeParams {
            size: dec!(0.05),
            max_slippage_bps: 300,
        },
    }
}

pub fn coordinator(
    ledger: Arc<dyn Ledger>,
    venue: Arc<CountingVenue>,
    process_tag: &str,
) -> Arc<ExecutionCoordinator> {
    let chain = FilterChain::from_config(&eligibility(), Arc::new(StaticSentimentFeed::new()));
    Arc::new(ExecutionCoordinator::new(
        ledger,
        chain,
        venue,
        Arc::new(LogNotifier),
        settings(process_tag),
    ))
}

pub fn sqlite_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}", dir.path().join("ledger.db").display())
}
