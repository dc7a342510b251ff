//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming conventions.

use crate::db::models::{EmailStatus, NotificationType};
use crate::errors::{AppError, Result};
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Metrics prefix for all Casefile metrics
pub const METRICS_PREFIX: &str = "casefile";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Install the Prometheus exporter on `port` and register descriptions.
/// A port of 0 disables export.
pub fn install_exporter(port: u16) -> Result<()> {
    if port == 0 {
        tracing::info!("Metrics export disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )
        .map_err(|e| AppError::Configuration {
            message: format!("Invalid metrics buckets: {}", e),
        })?
        .install()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to install metrics exporter: {}", e),
        })?;

    register_metrics();
    tracing::info!(%addr, "Metrics exporter listening");

    Ok(())
}

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_emails_total", METRICS_PREFIX),
        Unit::Count,
        "Queued email delivery outcomes"
    );

    describe_counter!(
        format!("{}_notifications_created_total", METRICS_PREFIX),
        Unit::Count,
        "In-app notifications created"
    );
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Count a delivery outcome (SENT, PENDING for a retry, FAILED)
pub fn record_email(status: EmailStatus) {
    counter!(
        format!("{}_emails_total", METRICS_PREFIX),
        "status" => status.as_str()
    )
    .increment(1);
}

pub fn record_notification(kind: NotificationType) {
    counter!(
        format!("{}_notifications_created_total", METRICS_PREFIX),
        "type" => kind.as_str()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No global recorder installed: these must be no-ops
        let metrics = RequestMetrics::start("GET", "/api/cases");
        metrics.finish(200);
        record_email(EmailStatus::Sent);
        record_notification(NotificationType::CaseUpdated);
    }

    #[test]
    fn test_disabled_exporter() {
        assert!(install_exporter(0).is_ok());
    }
}
