//! Deterministic eligibility rules

use super::{EligibilityFilter, FilterCost, Outcome};
use crate::ledger::EvaluationRecord;
use crate::source::AssetEvent;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Rejects pools shallower than `min_liquidity`
pub struct LiquidityFilter {
    min_liquidity: Decimal,
}

impl LiquidityFilter {
    pub fn new(min_liquidity: Decimal) -> Self {
        Self { min_liquidity }
    }
}

#[async_trait]
impl EligibilityFilter for LiquidityFilter {
    fn name(&self) -> &'static str {
        "liquidity"
    }

    fn cost(&self) -> FilterCost {
        FilterCost::Deterministic
    }

    async fn evaluate(&self, event: &AssetEvent, _record: &EvaluationRecord) -> Outcome {
        if event.liquidity < self.min_liquidity {
            Outcome::fail("liquidity_below_threshold")
        } else {
            Outcome::Pass
        }
    }
}

/// Rejects listed asset ids and assets from listed deployers
pub struct DenylistFilter {
    entries: HashSet<String>,
}

impl DenylistFilter {
    /// Entries are matched case-insensitively
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|e| e.as_ref().trim().to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    fn listed(&self, value: &str) -> bool {
        self.entries.contains(&value.to_ascii_lowercase())
    }
}

#[async_trait]
impl EligibilityFilter for DenylistFilter {
    fn name(&self) -> &'static str {
        "denylist"
    }

    fn cost(&self) -> FilterCost {
        FilterCost::Deterministic
    }

    async fn evaluate(&self, event: &AssetEvent, _record: &EvaluationRecord) -> Outcome {
        let deployer_listed = event
            .meta_str("deployer")
            .is_some_and(|deployer| self.listed(deployer));
        if self.listed(&event.asset_id) || deployer_listed {
            Outcome::fail("denylisted")
        } else {
            Outcome::Pass
        }
    }
}

/// Contract-safety heuristics reported by the feed
#[derive(Debug, Clone, Default)]
pub struct ContractSafetyFilter {
    pub max_buy_tax_bps: Option<u64>,
    pub max_sell_tax_bps: Option<u64>,
    pub require_renounced: bool,
}

#[async_trait]
impl EligibilityFilter for ContractSafetyFilter {
    fn name(&self) -> &'static str {
        "contract_safety"
    }

    fn cost(&self) -> FilterCost {
        FilterCost::Deterministic
    }

    async fn evaluate(&self, event: &AssetEvent, _record: &EvaluationRecord) -> Outcome {
        if event.meta_bool("honeypot") == Some(true) {
            return Outcome::fail("honeypot_detected");
        }

        if let (Some(max), Some(tax)) = (self.max_buy_tax_bps, event.meta_u64("buy_tax_bps")) {
            if tax > max {
                return Outcome::fail("buy_tax_too_high");
            }
        }
        if let (Some(max), Some(tax)) = (self.max_sell_tax_bps, event.meta_u64("sell_tax_bps")) {
            if tax > max {
                return Outcome::fail("sell_tax_too_high");
            }
        }

        // Unknown ownership counts as not renounced
        if self.require_renounced && event.meta_bool("owner_renounced") != Some(true) {
            return Outcome::fail("ownership_not_renounced");
        }

        Outcome::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::record_for;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[tokio::test]
    async fn test_liquidity_threshold() {
        let filter = LiquidityFilter::new(dec!(5000));
        let rich = AssetEvent::new("0xabc", dec!(50000));
        let poor = AssetEvent::new("0xdef", dec!(10));
        let edge = AssetEvent::new("0x123", dec!(5000));

        assert_eq!(filter.evaluate(&rich, &record_for(&rich)).await, Outcome::Pass);
        assert_eq!(
            filter.evaluate(&poor, &record_for(&poor)).await,
            Outcome::fail("liquidity_below_threshold")
        );
        assert_eq!(filter.evaluate(&edge, &record_for(&edge)).await, Outcome::Pass);
    }

    #[tokio::test]
    async fn test_denylist_matches_asset_and_deployer() {
        let filter = DenylistFilter::new(["0xBAD", "  ", "0xDeployer"]);

        let asset = AssetEvent::new("0xbad", dec!(1));
        let by_deployer = AssetEvent::new("0xok", dec!(1)).with_meta("deployer", json!("0xdeployer"));
        let clean = AssetEvent::new("0xok", dec!(1)).with_meta("deployer", json!("0xother"));

        assert_eq!(
            filter.evaluate(&asset, &record_for(&asset)).await,
            Outcome::fail("denylisted")
        );
        assert_eq!(
            filter.evaluate(&by_deployer, &record_for(&by_deployer)).await,
            Outcome::fail("denylisted")
        );
        assert_eq!(filter.evaluate(&clean, &record_for(&clean)).await, Outcome::Pass);
        assert_eq!(filter.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_contract_safety_reasons() {
        let filter = ContractSafetyFilter {
            max_buy_tax_bps: Some(500),
            max_sell_tax_bps: Some(500),
            require_renounced: true,
        };
        let base = AssetEvent::new("0xabc", dec!(1)).with_meta("owner_renounced", json!(true));

        let cases = [
            (base.clone().with_meta("honeypot", json!(true)), "honeypot_detected"),
            (base.clone().with_meta("buy_tax_bps", json!(900)), "buy_tax_too_high"),
            (base.clone().with_meta("sell_tax_bps", json!(501)), "sell_tax_too_high"),
            (AssetEvent::new("0xabc", dec!(1)), "ownership_not_renounced"),
        ];
        for (event, reason) in cases {
            assert_eq!(
                filter.evaluate(&event, &record_for(&event)).await,
                Outcome::fail(reason)
            );
        }

        let ok = base.with_meta("buy_tax_bps", json!(500));
        assert_eq!(filter.evaluate(&ok, &record_for(&ok)).await, Outcome::Pass);
    }

    #[tokio::test]
    async fn test_contract_safety_lenient_by_default() {
        let filter = ContractSafetyFilter::default();
        let event = AssetEvent::new("0xabc", dec!(1)).with_meta("sell_tax_bps", json!(9900));
        assert_eq!(filter.evaluate(&event, &record_for(&event)).await, Outcome::Pass);
    }
}
