//! Paper trading venue

use super::{Fill, OrderRef, TradeParams, TradeVenue, VenueError};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Venue that fills every order immediately
pub struct PaperVenue {
    fee_rate: Decimal,
    latency: Duration,
    fills: Arc<RwLock<Vec<Fill>>>,
}

impl PaperVenue {
    pub fn new(fee_rate: Decimal) -> Self {
        Self {
            fee_rate,
            latency: Duration::ZERO,
            fills: Arc::new(RwLock::new(vec![])),
        }
    }

    /// Delay every submission by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub async fn fills(&self) -> Vec<Fill> {
        self.fills.read().await.clone()
    }
}

#[async_trait]
impl TradeVenue for PaperVenue {
    fn name(&self) -> &'static str {
        "paper"
    }

    async fn submit(&self, asset_id: &str, params: &TradeParams) -> Result<OrderRef, VenueError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let order_ref = OrderRef(format!("paper-{}", uuid::Uuid::new_v4().simple()));
        let fill = Fill {
            order_ref: order_ref.clone(),
            asset_id: asset_id.to_string(),
            size: params.size,
            fees: params.size * self.fee_rate,
            timestamp: Utc::now(),
        };

        self.fills.write().await.push(fill);

        tracing::info!(asset_id, %order_ref, size = %params.size, "Paper order filled");
        Ok(order_ref)
    }
}
