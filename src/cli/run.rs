//! Run command implementation

use crate::config::{Config, ExecutionMode};
use crate::ledger::open_ledger;
use crate::pipeline::Pipeline;
use crate::source::{EventSource, LaunchFeed, MergedSource, SourceStats};
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Force paper execution regardless of configuration
    #[arg(long)]
    pub paper: bool,

    /// Override pipeline.max_in_flight
    #[arg(long)]
    pub max_in_flight: Option<usize>,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut config = config.clone();
        if self.paper {
            config.execution.mode = ExecutionMode::Paper;
        }
        if let Some(n) = self.max_in_flight {
            config.pipeline.max_in_flight = n;
        }
        config.validate()?;

        if config.source.feeds.is_empty() {
            anyhow::bail!("no feeds configured under [[source.feeds]]");
        }

        let ledger = open_ledger(&config.ledger).await?;
        let coordinator = super::build_coordinator(&config, Arc::clone(&ledger))?;

        let source_stats = Arc::new(SourceStats::default());
        let feeds: Vec<Arc<dyn EventSource>> = config
            .source
            .feeds
            .iter()
            .map(|feed| {
                let feed = LaunchFeed::new(
                    feed,
                    config.source.dedup_window(),
                    config.source.dedup_capacity,
                )
                .with_channel_capacity(config.source.channel_capacity)
                .with_stats(Arc::clone(&source_stats));
                Arc::new(feed) as Arc<dyn EventSource>
            })
            .collect();
        let events = MergedSource::new(feeds, config.source.channel_capacity)
            .subscribe()
            .await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received");
                let _ = shutdown_tx.send(true);
            }
        });

        tracing::info!(
            mode = ?config.execution.mode,
            ledger = ?config.ledger.backend,
            process_tag = %coordinator.settings().process_tag,
            feeds = config.source.feeds.len(),
            "Starting launch sniper"
        );

        let pipeline = Pipeline::new(
            coordinator,
            ledger,
            config.pipeline.max_in_flight,
            config.ledger.reap_interval(),
        );
        let summary = pipeline.run(events, shutdown_rx).await;

        let source = source_stats.snapshot();
        tracing::info!(
            frames = source.frames,
            duplicates = source.duplicates,
            malformed = source.malformed,
            reconnects = source.reconnects,
            executed = summary.executed,
            rejected = summary.rejected,
            failed = summary.failed,
            "Shutdown complete"
        );
        Ok(())
    }
}
