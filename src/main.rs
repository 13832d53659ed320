use clap::Parser;
use launch_sniper::cli::{self, Cli, Commands};
use launch_sniper::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            Config::example()?
        }
    };

    // Initialize telemetry
    // Only `run` serves metrics so admin commands can share the host with it
    let _telemetry =
        launch_sniper::telemetry::init_telemetry(&config.telemetry, cli.command.serves_metrics())?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting pipeline");
            args.execute(&config).await?;
        }
        Commands::Status(args) => args.execute(&config).await?,
        Commands::Inspect(args) => args.execute(&config).await?,
        Commands::Retry(args) => args.execute(&config).await?,
        Commands::Reap => cli::reap(&config).await?,
        Commands::Config => {
            println!("Current configuration:");
            println!("  Feeds:");
            for feed in &config.source.feeds {
                println!("    {} -> {}", feed.name, feed.url);
            }
            println!(
                "  Ledger: {:?} {} (lease {}s, reap every {}s)",
                config.ledger.backend,
                config.ledger.database_url,
                config.ledger.lease_ttl_secs,
                config.ledger.reap_interval_secs
            );
            println!(
                "  Filters: min_liquidity={}, denylist={}, min_sentiment={:?}, max/min={}",
                config.filters.min_liquidity,
                config.filters.denylist.len(),
                config.filters.min_sentiment,
                config.filters.max_executions_per_minute
            );
            println!(
                "  Execution: {:?} size={} slippage={}bps timeout={}ms",
                config.execution.mode,
                config.execution.size,
                config.execution.max_slippage_bps,
                config.execution.venue_timeout_ms
            );
            println!("  In flight: {}", config.pipeline.max_in_flight);
        }
    }

    Ok(())
}
