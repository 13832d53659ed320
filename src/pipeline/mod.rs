//! Ingestion pipeline
//!
//! Pulls events from the source and runs one coordinator evaluation per
//! event, many at once. Per-asset ordering is left entirely to the ledger:
//! two evaluations of the same asset may start together and the lease
//! decides which one proceeds.

mod stats;

pub use stats::{PipelineStats, PipelineStatsSnapshot};

use crate::coordinator::ExecutionCoordinator;
use crate::ledger::Ledger;
use crate::source::AssetEvent;
use crate::telemetry::{record_reaped, set_gauge, GaugeMetric};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

pub struct Pipeline {
    coordinator: Arc<ExecutionCoordinator>,
    ledger: Arc<dyn Ledger>,
    max_in_flight: usize,
    reap_interval: Duration,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    pub fn new(
        coordinator: Arc<ExecutionCoordinator>,
        ledger: Arc<dyn Ledger>,
        max_in_flight: usize,
        reap_interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            ledger,
            max_in_flight: max_in_flight.max(1),
            reap_interval,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `events` closes or `shutdown` flips to true.
    ///
    /// On shutdown intake stops immediately, but evaluations already
    /// started run to completion; they are never cancelled from outside.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<AssetEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> PipelineStatsSnapshot {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        let reaper = self.spawn_reaper(shutdown.clone());

        tracing::info!(
            max_in_flight = self.max_in_flight,
            reap_interval_ms = self.reap_interval.as_millis() as u64,
            "Pipeline started"
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Shutdown requested, stopping intake");
                        break;
                    }
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join(joined);
                }

                next = events.recv() => {
                    let Some(event) = next else {
                        tracing::info!("Event source closed");
                        break;
                    };
                    self.stats.record_received();

                    let permit = tokio::select! {
                        permit = Arc::clone(&permits).acquire_owned() => permit,
                        _ = shutdown.changed() => {
                            tracing::info!(asset_id = %event.asset_id, "Shutdown while waiting for capacity, event dropped");
                            break;
                        }
                    };
                    let Ok(permit) = permit else { break };

                    let coordinator = Arc::clone(&self.coordinator);
                    let stats = Arc::clone(&self.stats);
                    let gauge_permits = Arc::clone(&permits);
                    let max_in_flight = self.max_in_flight;
                    set_gauge(GaugeMetric::InFlight, in_flight(max_in_flight, &permits));

                    tasks.spawn(async move {
                        let result = coordinator.process(&event).await;
                        if let Err(e) = &result {
                            tracing::error!(asset_id = %event.asset_id, code = %e.code(), error = %e, "Evaluation failed");
                        }
                        stats.record(&result);
                        drop(permit);
                        set_gauge(GaugeMetric::InFlight, in_flight(max_in_flight, &gauge_permits));
                    });
                }
            }
        }

        let draining = tasks.len();
        if draining > 0 {
            tracing::info!(in_flight = draining, "Waiting for in-flight evaluations");
        }
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        reaper.abort();

        let snapshot = self.stats.snapshot();
        tracing::info!(?snapshot, "Pipeline stopped");
        snapshot
    }

    fn spawn_reaper(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let ledger = Arc::clone(&self.ledger);
        let stats = Arc::clone(&self.stats);
        let period = self.reap_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match ledger.reap_expired_leases().await {
                            Ok(0) => {}
                            Ok(reaped) => {
                                tracing::info!(reaped, "Expired leases returned to seen");
                                stats.record_reaped(reaped);
                                record_reaped(reaped);
                            }
                            Err(e) => tracing::warn!(error = %e, "Lease reap failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        })
    }
}

fn in_flight(max: usize, permits: &Semaphore) -> f64 {
    max.saturating_sub(permits.available_permits()) as f64
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Evaluation task panicked");
    }
}
