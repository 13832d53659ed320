//! Telemetry module
//!
//! Structured logging and Prometheus metrics

mod logging;
mod metrics;

pub use self::logging::{init_logging, LogFormat};
pub use self::metrics::{
    install_exporter, record_latency, record_outcome, record_reaped, set_gauge, GaugeMetric,
    LatencyMetric, OutcomeMetric,
};

use crate::config::TelemetryConfig;

/// Guard that keeps telemetry alive for the lifetime of the process
pub struct TelemetryGuard {
    _priv: (),
}

/// Initialize logging and, when `serve_metrics` is set, the Prometheus exporter.
///
/// Only the long-running pipeline serves metrics; admin commands run next to
/// it on the same host and must not compete for the port.
pub fn init_telemetry(
    config: &TelemetryConfig,
    serve_metrics: bool,
) -> anyhow::Result<TelemetryGuard> {
    init_logging(&config.log_level, config.log_format)?;

    if serve_metrics && config.metrics_port != 0 {
        start_exporter(config.metrics_port);
    }

    Ok(TelemetryGuard { _priv: () })
}

/// Metrics are not worth refusing to trade over: a busy port is logged and skipped
fn start_exporter(port: u16) -> bool {
    match install_exporter(port) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(port, error = %e, "Metrics exporter disabled");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[tokio::test]
    async fn test_busy_metrics_port_is_not_fatal() {
        let held = TcpListener::bind("0.0.0.0:0").unwrap();
        let port = held.local_addr().unwrap().port();

        assert!(!start_exporter(port));
    }
}
