//! Retry command implementation

use crate::config::Config;
use crate::coordinator::Disposition;
use crate::ledger::open_ledger;
use crate::source::canonical_asset_id;
use crate::worker::{RetryRequest, RetryWorker};
use clap::Args;

#[derive(Args, Debug)]
pub struct RetryArgs {
    /// Asset id (token address) of the Failed execution
    pub asset_id: String,

    /// Operator name recorded in the logs
    #[arg(long, default_value = "cli")]
    pub requested_by: String,
}

impl RetryArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        config.validate()?;
        let asset_id = canonical_asset_id(&self.asset_id)
            .ok_or_else(|| anyhow::anyhow!("asset id must not be empty"))?;

        let ledger = open_ledger(&config.ledger).await?;
        let coordinator = super::build_coordinator(config, ledger)?;
        let (requests, worker) = RetryWorker::new(coordinator).spawn(1);

        let (request, reply) = RetryRequest::new(asset_id.clone(), &self.requested_by).with_reply();
        requests
            .send(request)
            .await
            .map_err(|_| anyhow::anyhow!("retry worker stopped"))?;
        drop(requests);

        let outcome = reply.await?;
        worker.await?;

        match outcome? {
            Disposition::Executed(result) => println!(
                "{}: executed ({})",
                asset_id,
                result.order_ref.unwrap_or_default()
            ),
            Disposition::Failed(result) => println!(
                "{}: failed again ({})",
                asset_id,
                result.error.map(|e| e.to_string()).unwrap_or_default()
            ),
            other => println!("{}: {}", asset_id, other.label()),
        }
        Ok(())
    }
}
