//! Venue types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Venue-assigned order reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderRef(pub String);

impl OrderRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Parameters of a single buy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeParams {
    /// Quote amount to spend
    pub size: Decimal,
    /// Worst acceptable price impact
    pub max_slippage_bps: u32,
}

/// A simulated fill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_ref: OrderRef,
    pub asset_id: String,
    pub size: Decimal,
    pub fees: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Venue errors
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("Order rejected by venue: {0}")]
    Rejected(String),

    #[error("Venue request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected venue response: {0}")]
    InvalidResponse(String),
}

impl VenueError {
    /// Short reason stored on the Failed record
    pub fn reason(&self) -> String {
        match self {
            VenueError::Rejected(msg) => format!("venue_rejected: {msg}"),
            VenueError::Transport(_) => "venue_unreachable".to_string(),
            VenueError::InvalidResponse(_) => "venue_invalid_response".to_string(),
        }
    }
}
