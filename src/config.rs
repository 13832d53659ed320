//! Configuration types for launch-sniper

use crate::telemetry::LogFormat;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub ledger: LedgerConfig,
    pub filters: EligibilityConfig,
    #[serde(default)]
    pub sentiment: SentimentConfig,
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub telemetry: TelemetryConfig,
}

/// Launch feed ingestion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Trailing window for suppressing retransmitted frames (seconds)
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    /// Maximum fingerprints remembered by the dedup window
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// Buffer between the feeds and the pipeline
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

/// A single upstream feed
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    /// Frame sent after each (re)connect
    #[serde(default)]
    pub subscribe: Option<String>,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
}

fn default_dedup_window_secs() -> u64 {
    30
}
fn default_dedup_capacity() -> usize {
    4096
}
fn default_channel_capacity() -> usize {
    1024
}
fn default_initial_backoff_ms() -> u64 {
    1_000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_backoff_jitter() -> f64 {
    0.2
}

impl SourceConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
}

/// Ledger storage backend
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// Durable SQLite file shared by every process on the host
    #[default]
    Sqlite,
    /// Process-local, for paper runs
    Memory,
}

/// Deduplication ledger configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: LedgerBackend,

    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on a locked database before failing (ms)
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Lifetime of an evaluation lease (seconds)
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,

    /// Interval between expired-lease sweeps (seconds)
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

fn default_database_url() -> String {
    "sqlite://sniper.db".to_string()
}
fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout_ms() -> u64 {
    2_000
}
fn default_lease_ttl_secs() -> u64 {
    30
}
fn default_reap_interval_secs() -> u64 {
    5
}

impl LedgerConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

/// Eligibility filter chain configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EligibilityConfig {
    /// Minimum pool liquidity in quote currency
    pub min_liquidity: Decimal,

    /// Asset ids or deployer addresses that are never traded
    #[serde(default)]
    pub denylist: Vec<String>,

    #[serde(default)]
    pub max_buy_tax_bps: Option<u64>,

    #[serde(default)]
    pub max_sell_tax_bps: Option<u64>,

    /// Reject tokens whose owner has not renounced control
    #[serde(default)]
    pub require_renounced: bool,

    /// Minimum sentiment score; the sentiment filter is off when unset
    #[serde(default)]
    pub min_sentiment: Option<f64>,

    /// Execution admissions per minute (0 = unlimited)
    #[serde(default = "default_max_executions_per_minute")]
    pub max_executions_per_minute: u32,

    /// Pause before re-running a deferred chain (ms)
    #[serde(default = "default_defer_retry_ms")]
    pub defer_retry_ms: u64,

    /// Chain runs allowed per lease before giving the lease back
    #[serde(default = "default_max_defer_attempts")]
    pub max_defer_attempts: u32,
}

fn default_max_executions_per_minute() -> u32 {
    10
}
fn default_defer_retry_ms() -> u64 {
    500
}
fn default_max_defer_attempts() -> u32 {
    5
}

/// Sentiment analyzer endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SentimentConfig {
    /// Base URL of the analyzer; without it every score is unavailable
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_sentiment_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_sentiment_timeout_ms() -> u64 {
    800
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_sentiment_timeout_ms(),
        }
    }
}

/// Trade execution configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,

    /// Execution bridge URL (http mode)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Quote amount spent per buy
    pub size: Decimal,

    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u32,

    /// Budget for a single venue submission (ms)
    #[serde(default = "default_venue_timeout_ms")]
    pub venue_timeout_ms: u64,
}

fn default_max_slippage_bps() -> u32 {
    300
}
fn default_venue_timeout_ms() -> u64 {
    5_000
}

impl ExecutionConfig {
    pub fn venue_timeout(&self) -> Duration {
        Duration::from_millis(self.venue_timeout_ms)
    }
}

/// Execution mode: simulated fills or an HTTP execution bridge
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Paper,
    Http,
}

/// Terminal-state notifications
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifyConfig {
    /// Chat front-end webhook; outcomes are only logged when unset
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Evaluations running at once in this process
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Prefix of lease owner ids; defaults to `sniper-<pid>`
    #[serde(default)]
    pub process_tag: Option<String>,
}

fn default_max_in_flight() -> usize {
    32
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            process_tag: None,
        }
    }
}

impl PipelineConfig {
    pub fn process_tag(&self) -> String {
        self.process_tag
            .clone()
            .unwrap_or_else(|| format!("sniper-{}", std::process::id()))
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Prometheus listener port (0 = disabled)
    pub metrics_port: u16,
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// The bundled `config.toml.example`
    pub fn example() -> anyhow::Result<Self> {
        let config: Config = toml::from_str(include_str!("../config.toml.example"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break the single-execution guarantees
    pub fn validate(&self) -> anyhow::Result<()> {
        let lease_ms = self.ledger.lease_ttl_secs.saturating_mul(1000);
        if lease_ms <= self.execution.venue_timeout_ms.saturating_mul(2) {
            anyhow::bail!(
                "ledger.lease_ttl_secs ({}s) must exceed twice execution.venue_timeout_ms ({}ms)",
                self.ledger.lease_ttl_secs,
                self.execution.venue_timeout_ms
            );
        }
        if self.ledger.reap_interval_secs == 0 {
            anyhow::bail!("ledger.reap_interval_secs must be positive");
        }
        if self.pipeline.max_in_flight == 0 {
            anyhow::bail!("pipeline.max_in_flight must be positive");
        }
        if self.filters.max_defer_attempts == 0 {
            anyhow::bail!("filters.max_defer_attempts must be at least 1");
        }
        if self.execution.size <= Decimal::ZERO {
            anyhow::bail!("execution.size must be positive");
        }
        if self.execution.mode == ExecutionMode::Http && self.execution.endpoint.is_none() {
            anyhow::bail!("execution.endpoint is required in http mode");
        }
        for feed in &self.source.feeds {
            if !(0.0..=1.0).contains(&feed.backoff_jitter) {
                anyhow::bail!("feed {}: backoff_jitter must be within [0, 1]", feed.name);
            }
            if feed.initial_backoff_ms == 0 || feed.initial_backoff_ms > feed.max_backoff_ms {
                anyhow::bail!(
                    "feed {}: initial_backoff_ms must be positive and not above max_backoff_ms",
                    feed.name
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const MINIMAL: &str = r#"
        [source]
        [[source.feeds]]
        name = "launches"
        url = "wss://feed.example/ws"
        subscribe = '{"op":"subscribe","channel":"new_pairs"}'

        [ledger]
        database_url = "sqlite://test.db"

        [filters]
        min_liquidity = 5000

        [execution]
        mode = "paper"
        size = 0.05

        [telemetry]
        metrics_port = 0
        log_level = "info"
    "#;

    #[test]
    fn test_config_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.source.dedup_window_secs, 30);
        assert_eq!(config.source.feeds.len(), 1);
        assert_eq!(config.source.feeds[0].initial_backoff_ms, 1_000);
        assert_eq!(config.source.feeds[0].max_backoff_ms, 30_000);
        assert_eq!(config.ledger.backend, LedgerBackend::Sqlite);
        assert_eq!(config.ledger.lease_ttl(), Duration::from_secs(30));
        assert_eq!(config.filters.min_liquidity, dec!(5000));
        assert!(config.filters.min_sentiment.is_none());
        assert_eq!(config.execution.venue_timeout(), Duration::from_secs(5));
        assert_eq!(config.execution.mode, ExecutionMode::Paper);
        assert_eq!(config.pipeline.max_in_flight, 32);
        assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
        assert!(config.notify.webhook_url.is_none());
    }

    #[test]
    fn test_lease_must_outlive_venue_budget() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.ledger.lease_ttl_secs = 8;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lease_ttl_secs"));
    }

    #[test]
    fn test_http_mode_requires_endpoint() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.execution.mode = ExecutionMode::Http;
        assert!(config.validate().is_err());

        config.execution.endpoint = Some("http://127.0.0.1:7000".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_feed_backoff_rejected() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.source.feeds[0].backoff_jitter = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_process_tag_default() {
        let config = PipelineConfig::default();
        assert!(config.process_tag().starts_with("sniper-"));
    }

    #[test]
    fn test_bundled_example_is_valid() {
        let config = Config::example().unwrap();
        assert_eq!(config.source.feeds.len(), 1);
        assert_eq!(config.execution.mode, ExecutionMode::Paper);
        assert_eq!(config.filters.max_buy_tax_bps, Some(1000));
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }
}
