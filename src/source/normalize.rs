//! Raw launch frame parsing

use super::types::{canonical_asset_id, AssetEvent, Metadata};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Event types that announce a new tradable asset
const LAUNCH_TYPES: &[&str] = &["new_pair", "new_token"];

/// Outcome of parsing one feed frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A new-asset announcement
    Launch(AssetEvent),
    /// Heartbeats, subscription acks and other non-launch traffic
    Control,
    /// Undecodable or incomplete payload
    Malformed(String),
}

/// Launch message as sent by the feed
#[derive(Debug, Deserialize)]
struct RawLaunch {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    token_address: Option<String>,
    #[serde(default)]
    liquidity_usd: Option<Decimal>,
    /// Feed timestamp in milliseconds
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(flatten)]
    extra: Metadata,
}

/// Envelope used to classify traffic before committing to the launch schema
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Parse a text frame from feed `source` into a canonical event
pub fn parse_frame(source: &str, text: &str) -> Frame {
    parse_frame_at(source, text, Utc::now())
}

pub fn parse_frame_at(source: &str, text: &str, received_at: DateTime<Utc>) -> Frame {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => return Frame::Malformed(format!("invalid json: {e}")),
    };

    match envelope.kind.as_deref() {
        Some(kind) if LAUNCH_TYPES.contains(&kind) => {}
        Some(_) => return Frame::Control,
        None => return Frame::Malformed("missing type".into()),
    }

    let raw: RawLaunch = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => return Frame::Malformed(format!("invalid launch payload: {e}")),
    };

    let Some(asset_id) = raw.token_address.as_deref().and_then(canonical_asset_id) else {
        return Frame::Malformed("missing token_address".into());
    };

    let liquidity = match raw.liquidity_usd {
        Some(l) if l.is_sign_negative() => {
            return Frame::Malformed(format!("negative liquidity {l}"));
        }
        Some(l) => l,
        None => return Frame::Malformed("missing liquidity_usd".into()),
    };

    let observed_at = match raw.timestamp {
        Some(ms) => match Utc.timestamp_millis_opt(ms).single() {
            Some(ts) => ts,
            None => return Frame::Malformed(format!("invalid timestamp {ms}")),
        },
        None => received_at,
    };

    let mut metadata = raw.extra;
    metadata.insert("event_type".into(), serde_json::Value::String(raw.kind));
    metadata.insert("source".into(), serde_json::Value::String(source.to_string()));

    Frame::Launch(AssetEvent {
        asset_id,
        observed_at,
        liquidity,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn launch(frame: Frame) -> AssetEvent {
        match frame {
            Frame::Launch(event) => event,
            other => panic!("expected launch, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_new_pair() {
        let msg = r#"{
            "type": "new_pair",
            "chain": "base",
            "token_address": "0xABCdef",
            "liquidity_usd": "50000.5",
            "timestamp": 1704067200123,
            "deployer": "0xDeployer",
            "sell_tax_bps": 300
        }"#;

        let event = launch(parse_frame("launches", msg));
        assert_eq!(event.asset_id, "0xabcdef");
        assert_eq!(event.liquidity, dec!(50000.5));
        assert_eq!(event.observed_at.timestamp_millis(), 1704067200123);
        assert_eq!(event.meta_str("chain"), Some("base"));
        assert_eq!(event.meta_str("deployer"), Some("0xDeployer"));
        assert_eq!(event.meta_u64("sell_tax_bps"), Some(300));
        assert_eq!(event.meta_str("source"), Some("launches"));
        assert_eq!(event.meta_str("event_type"), Some("new_pair"));
        assert!(!event.metadata.contains_key("token_address"));
    }

    #[test]
    fn test_parse_numeric_liquidity_and_default_timestamp() {
        let received = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let msg = r#"{"type":"new_token","token_address":"So1aNa","liquidity_usd":1200}"#;

        let event = launch(parse_frame_at("sol", msg, received));
        assert_eq!(event.asset_id, "So1aNa");
        assert_eq!(event.liquidity, dec!(1200));
        assert_eq!(event.observed_at, received);
    }

    #[test]
    fn test_control_frames_ignored() {
        assert_eq!(parse_frame("f", r#"{"type":"heartbeat"}"#), Frame::Control);
        assert_eq!(
            parse_frame("f", r#"{"type":"subscribed","channel":"new_pairs"}"#),
            Frame::Control
        );
    }

    #[test]
    fn test_malformed_frames() {
        let cases = [
            "not json",
            r#"{"token_address":"0xabc"}"#,
            r#"{"type":"new_pair","liquidity_usd":10}"#,
            r#"{"type":"new_pair","token_address":"  ","liquidity_usd":10}"#,
            r#"{"type":"new_pair","token_address":"0xabc"}"#,
            r#"{"type":"new_pair","token_address":"0xabc","liquidity_usd":-5}"#,
            r#"{"type":"new_pair","token_address":"0xabc","liquidity_usd":"lots"}"#,
        ];

        for case in cases {
            assert!(
                matches!(parse_frame("f", case), Frame::Malformed(_)),
                "expected malformed: {case}"
            );
        }
    }
}
