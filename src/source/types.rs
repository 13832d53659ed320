//! Canonical asset event types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Arbitrary per-event attributes carried from the feed (deployer, taxes, dex...)
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A normalized notification that a tradable asset was observed on a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEvent {
    /// Deterministic identifier derived from the token address
    pub asset_id: String,
    /// Feed timestamp, or local receive time when the feed sent none
    pub observed_at: DateTime<Utc>,
    /// Pool liquidity in quote currency
    pub liquidity: Decimal,
    /// Remaining payload attributes
    #[serde(default)]
    pub metadata: Metadata,
}

impl AssetEvent {
    pub fn new(asset_id: impl Into<String>, liquidity: Decimal) -> Self {
        Self {
            asset_id: asset_id.into(),
            observed_at: Utc::now(),
            liquidity,
            metadata: Metadata::new(),
        }
    }

    /// Builder helper used by adapters and tests
    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn meta_bool(&self, key: &str) -> Option<bool> {
        self.metadata.get(key).and_then(|v| v.as_bool())
    }

    pub fn meta_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(|v| v.as_u64())
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Canonical asset id for a raw token address.
///
/// `0x` hex addresses are case-insensitive, so they are lowercased. Other
/// encodings (base58 mints) are case-sensitive and only trimmed.
pub fn canonical_asset_id(address: &str) -> Option<String> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return None;
    }
    let is_hex = trimmed.len() > 2
        && (trimmed.starts_with("0x") || trimmed.starts_with("0X"))
        && trimmed[2..].chars().all(|c| c.is_ascii_hexdigit());
    if is_hex {
        Some(format!("0x{}", trimmed[2..].to_ascii_lowercase()))
    } else {
        Some(trimmed.to_string())
    }
}
