//! # Metrics Collection
//!
//! Prometheus metrics for logins and certificate issuance. Recording goes
//! through the `metrics` facade, so it is a no-op until the exporter is
//! installed.

use std::net::SocketAddr;
use std::time::Duration;

use ::tracing::info;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

pub const LOGINS_TOTAL: &str = "authn_logins_total";
pub const CSR_ISSUED_TOTAL: &str = "authn_csr_issued_total";
pub const CSR_ISSUE_SECONDS: &str = "authn_csr_issue_seconds";

/// Records gateway metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Register metric descriptions with the exporter
    pub fn register(&self) {
        describe_counter!(LOGINS_TOTAL, Unit::Count, "Login attempts by strategy and outcome");
        describe_counter!(CSR_ISSUED_TOTAL, Unit::Count, "Client certificates issued");
        describe_histogram!(
            CSR_ISSUE_SECONDS,
            Unit::Seconds,
            "Time from CSR submission to signed certificate"
        );
    }

    /// Record a login attempt; `outcome` is `success` or an error kind
    pub fn record_login(&self, strategy: &str, outcome: &str) {
        let labels = [("strategy", strategy.to_string()), ("outcome", outcome.to_string())];
        counter!(LOGINS_TOTAL, &labels).increment(1);
    }

    /// Record a successful certificate issuance and how long it took
    pub fn record_csr_issued(&self, elapsed: Duration) {
        counter!(CSR_ISSUED_TOTAL).increment(1);
        histogram!(CSR_ISSUE_SECONDS).record(elapsed.as_secs_f64());
    }
}

/// Install the Prometheus exporter on the configured port
pub async fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let Some(metrics_addr) = config.metrics_bind_address() else {
        return Ok(());
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::configuration(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| Error::configuration(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().register();

    info!(metrics_addr = %metrics_addr, "Metrics exporter listening");
    Ok(())
}
