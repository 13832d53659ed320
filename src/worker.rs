//! Operator retry worker
//!
//! Accepts manual retry requests for Failed executions (from the chat
//! front end or the CLI) and hands them to the coordinator one at a time.

use crate::coordinator::{CoordinatorError, Disposition, ExecutionCoordinator};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// A manual retry of one Failed asset
#[derive(Debug)]
pub struct RetryRequest {
    pub asset_id: String,
    /// Who asked, for the audit log
    pub requested_by: String,
    /// Receives the outcome when set
    pub reply: Option<oneshot::Sender<Result<Disposition, CoordinatorError>>>,
}

impl RetryRequest {
    pub fn new(asset_id: impl Into<String>, requested_by: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            requested_by: requested_by.into(),
            reply: None,
        }
    }

    /// Attach a reply channel; returns the receiving half
    pub fn with_reply(
        mut self,
    ) -> (
        Self,
        oneshot::Receiver<Result<Disposition, CoordinatorError>>,
    ) {
        let (tx, rx) = oneshot::channel();
        self.reply = Some(tx);
        (self, rx)
    }
}

/// Sequential consumer of [`RetryRequest`]s
pub struct RetryWorker {
    coordinator: Arc<ExecutionCoordinator>,
}

impl RetryWorker {
    pub fn new(coordinator: Arc<ExecutionCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Start the worker; it stops when every sender is dropped
    pub fn spawn(self, capacity: usize) -> (mpsc::Sender<RetryRequest>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    pub async fn run(self, mut requests: mpsc::Receiver<RetryRequest>) {
        while let Some(request) = requests.recv().await {
            self.handle(request).await;
        }
        tracing::debug!("Retry worker stopped");
    }

    async fn handle(&self, request: RetryRequest) {
        let RetryRequest {
            asset_id,
            requested_by,
            reply,
        } = request;

        tracing::info!(%asset_id, %requested_by, "Operator retry requested");
        let result = self.coordinator.retry_failed(&asset_id).await;

        match &result {
            Ok(disposition) => {
                tracing::info!(%asset_id, %requested_by, outcome = disposition.label(), "Operator retry finished")
            }
            Err(e) => {
                tracing::warn!(%asset_id, %requested_by, code = %e.code(), error = %e, "Operator retry refused")
            }
        }

        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{CoordinatorSettings, ExecutionResult};
    use crate::filter::FilterChain;
    use crate::ledger::{Admission, BeginOutcome, LeaseOwner, Ledger, MemoryLedger, TerminalState};
    use crate::notify::LogNotifier;
    use crate::source::AssetEvent;
    use crate::venue::{PaperVenue, TradeParams};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    async fn failed_record(ledger: &dyn Ledger, asset_id: &str) {
        let owner = LeaseOwner::generate("earlier");
        let outcome = ledger
            .try_begin_evaluation(
                &AssetEvent::new(asset_id, dec!(50000)),
                &owner,
                Duration::from_secs(30),
                Admission::Fresh,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, BeginOutcome::LeaseGranted(_)));
        ledger
            .commit(asset_id, &owner, &TerminalState::Failed("venue_timeout".into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_worker_retries_and_replies() {
        let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
        failed_record(ledger.as_ref(), "0xfailed").await;

        let venue = Arc::new(PaperVenue::new(dec!(0)));
        let coordinator = ExecutionCoordinator::new(
            Arc::clone(&ledger),
            FilterChain::new(vec![]),
            venue.clone(),
            Arc::new(LogNotifier),
            CoordinatorSettings {
                process_tag: "worker-test".into(),
                lease_ttl: Duration::from_secs(30),
                venue_timeout: Duration::from_secs(1),
                defer_retry: Duration::from_millis(10),
                max_defer_attempts: 1,
                trade: TradeParams {
                    size: dec!(0.05),
                    max_slippage_bps: 300,
                },
            },
        );
        let (tx, handle) = RetryWorker::new(Arc::new(coordinator)).spawn(4);

        let (request, reply) = RetryRequest::new("0xfailed", "operator").with_reply();
        tx.send(request).await.unwrap();
        let disposition = reply.await.unwrap().unwrap();

        let order_ref = venue.fills().await[0].order_ref.to_string();
        assert_eq!(
            disposition,
            Disposition::Executed(ExecutionResult::executed("0xfailed", order_ref))
        );

        let (request, reply) = RetryRequest::new("0xfailed", "operator").with_reply();
        tx.send(request).await.unwrap();
        assert!(matches!(
            reply.await.unwrap(),
            Err(CoordinatorError::NotRetryable { .. })
        ));

        drop(tx);
        handle.await.unwrap();
        assert_eq!(venue.fills().await.len(), 1);
    }
}
