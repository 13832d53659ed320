//! CLI interface for launch-sniper
//!
//! Provides subcommands for:
//! - `run`: Start the detection and execution pipeline
//! - `status`: Ledger record counts per state
//! - `inspect`: Show one asset's evaluation record
//! - `retry`: Operator retry of a Failed execution
//! - `reap`: Return expired leases to `seen` once
//! - `config`: Show the effective configuration

mod admin;
mod retry;
mod run;

pub use admin::{reap, InspectArgs, StatusArgs};
pub use retry::RetryArgs;
pub use run::RunArgs;

use crate::config::Config;
use crate::coordinator::{CoordinatorSettings, ExecutionCoordinator};
use crate::filter::FilterChain;
use crate::ledger::Ledger;
use crate::notify::build_notifier;
use crate::sentiment::{HttpSentimentFeed, SentimentFeed, StaticSentimentFeed};
use crate::venue::build_venue;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "launch-sniper")]
#[command(about = "Detects new token launches and buys each qualifying one at most once")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the pipeline
    Run(RunArgs),
    /// Show record counts per state
    Status(StatusArgs),
    /// Show one asset's evaluation record
    Inspect(InspectArgs),
    /// Retry a Failed execution
    Retry(RetryArgs),
    /// Return expired leases to seen
    Reap,
    /// Show configuration
    Config,
}

impl Commands {
    /// Whether the command runs long enough to serve Prometheus metrics
    pub fn serves_metrics(&self) -> bool {
        matches!(self, Commands::Run(_))
    }
}

/// Wire the coordinator from configuration
pub(crate) fn build_coordinator(
    config: &Config,
    ledger: Arc<dyn Ledger>,
) -> anyhow::Result<Arc<ExecutionCoordinator>> {
    let sentiment: Arc<dyn SentimentFeed> = match &config.sentiment.endpoint {
        Some(endpoint) => Arc::new(HttpSentimentFeed::new(
            endpoint,
            Duration::from_millis(config.sentiment.timeout_ms),
        )?),
        None => Arc::new(StaticSentimentFeed::new()),
    };
    let chain = FilterChain::from_config(&config.filters, sentiment);
    tracing::info!(filters = ?chain.names(), "Filter chain ready");

    Ok(Arc::new(ExecutionCoordinator::new(
        ledger,
        chain,
        build_venue(&config.execution)?,
        build_notifier(&config.notify)?,
        CoordinatorSettings::from_config(config),
    )))
}
