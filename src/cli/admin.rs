//! Read-only ledger commands

use crate::config::Config;
use crate::ledger::open_ledger;
use crate::source::canonical_asset_id;
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let ledger = open_ledger(&config.ledger).await?;
        let counts = ledger.state_counts().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&counts)?);
            return Ok(());
        }

        println!("launch-sniper ledger ({})", config.ledger.database_url);
        for state in ["seen", "evaluating", "rejected", "executed", "failed"] {
            println!("  {:<11} {}", state, counts.get(state).copied().unwrap_or(0));
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Asset id (token address)
    pub asset_id: String,
}

impl InspectArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let asset_id = canonical_asset_id(&self.asset_id)
            .ok_or_else(|| anyhow::anyhow!("asset id must not be empty"))?;
        let ledger = open_ledger(&config.ledger).await?;

        let Some(record) = ledger.get(&asset_id).await? else {
            println!("{}: never seen", asset_id);
            return Ok(());
        };

        println!("asset:      {}", record.asset_id);
        println!("state:      {}", record.state);
        println!("updated:    {}", record.updated_at);
        if let Some(owner) = &record.lease_owner {
            let live = if record.has_active_lease(Utc::now()) {
                "active"
            } else {
                "expired"
            };
            println!("lease:      {} ({})", owner, live);
        }
        if let Some(by) = &record.committed_by {
            println!("committed:  {}", by);
        }
        if let Some(snapshot) = &record.snapshot {
            println!("event:      {}", serde_json::to_string(snapshot)?);
        }
        Ok(())
    }
}

/// `reap` subcommand
pub async fn reap(config: &Config) -> anyhow::Result<()> {
    let ledger = open_ledger(&config.ledger).await?;
    let reaped = ledger.reap_expired_leases().await?;
    println!("Returned {} expired lease(s) to seen", reaped);
    Ok(())
}
