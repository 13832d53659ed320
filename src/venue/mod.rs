//! Trade execution venue
//!
//! Paper and HTTP-bridge venues behind one trait

mod http;
mod paper;
mod types;

pub use http::HttpVenue;
pub use paper::PaperVenue;
pub use types::{Fill, OrderRef, TradeParams, VenueError};

use crate::config::{ExecutionConfig, ExecutionMode};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

/// Trait for venue implementations
#[async_trait]
pub trait TradeVenue: Send + Sync {
    fn name(&self) -> &'static str;

    /// Submit a single buy. Never retried by callers.
    async fn submit(&self, asset_id: &str, params: &TradeParams) -> Result<OrderRef, VenueError>;
}

/// Paper fee rate applied to simulated fills
const PAPER_FEE_RATE: Decimal = dec!(0.003);

/// Build the configured venue
pub fn build_venue(config: &ExecutionConfig) -> anyhow::Result<Arc<dyn TradeVenue>> {
    match config.mode {
        ExecutionMode::Paper => Ok(Arc::new(PaperVenue::new(PAPER_FEE_RATE))),
        ExecutionMode::Http => {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("execution.endpoint is required in http mode"))?;
            Ok(Arc::new(HttpVenue::new(endpoint)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_venue_modes() {
        let mut config = ExecutionConfig {
            mode: ExecutionMode::Paper,
            endpoint: None,
            size: dec!(0.05),
            max_slippage_bps: 300,
            venue_timeout_ms: 5000,
        };
        assert_eq!(build_venue(&config).unwrap().name(), "paper");

        config.mode = ExecutionMode::Http;
        assert!(build_venue(&config).is_err());

        config.endpoint = Some("http://127.0.0.1:8700".into());
        assert_eq!(build_venue(&config).unwrap().name(), "http");
    }
}
