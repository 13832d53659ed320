//! Prometheus metrics

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Full filter chain run
    FilterChain,
    /// Venue submission round-trip
    VenueSubmission,
    /// Candidate to terminal commit
    Evaluation,
}

/// Outcome counters of the coordinator
#[derive(Debug, Clone, Copy)]
pub enum OutcomeMetric {
    DroppedLeased,
    DroppedTerminal,
    Rejected,
    Executed,
    Failed,
    Abandoned,
    /// Trade submitted but the commit lost the lease
    Unrecorded,
    LedgerError,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Evaluations currently running in this process
    InFlight,
}

/// Start the Prometheus scrape endpoint; must run inside the tokio runtime
pub fn install_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::FilterChain => "sniper_filter_chain_latency_ms",
        LatencyMetric::VenueSubmission => "sniper_venue_submission_latency_ms",
        LatencyMetric::Evaluation => "sniper_evaluation_latency_ms",
    };

    metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

/// Count a coordinator outcome
pub fn record_outcome(metric: OutcomeMetric) {
    let outcome = match metric {
        OutcomeMetric::DroppedLeased => "dropped_leased",
        OutcomeMetric::DroppedTerminal => "dropped_terminal",
        OutcomeMetric::Rejected => "rejected",
        OutcomeMetric::Executed => "executed",
        OutcomeMetric::Failed => "failed",
        OutcomeMetric::Abandoned => "abandoned",
        OutcomeMetric::Unrecorded => "unrecorded",
        OutcomeMetric::LedgerError => "ledger_error",
    };

    metrics::counter!("sniper_outcomes_total", "outcome" => outcome).increment(1);
}

/// Count leases returned to Seen by the reaper
pub fn record_reaped(count: u64) {
    metrics::counter!("sniper_leases_reaped_total").increment(count);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::InFlight => "sniper_in_flight_evaluations",
    };

    metrics::gauge!(metric_name).set(value);
}
