//! Prometheus metrics for Monkey applications.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `monkey_http_requests_total` | Counter | `connector`, `method`, `status` | Total requests |
//! | `monkey_http_request_duration_seconds` | Histogram | `connector` | Request latency |
//! | `monkey_http_in_flight_requests` | Gauge | `connector` | In-flight requests |
//! | `monkey_di_commit_seconds` | Histogram | - | Injector build time |

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use monkey_config::MetricsConfig;

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Metric names emitted by the framework.
pub mod names {
    /// Total HTTP requests served.
    pub const HTTP_REQUESTS_TOTAL: &str = "monkey_http_requests_total";
    /// HTTP request latency.
    pub const HTTP_REQUEST_DURATION: &str = "monkey_http_request_duration_seconds";
    /// HTTP requests currently being served.
    pub const HTTP_IN_FLIGHT: &str = "monkey_http_in_flight_requests";
    /// Time taken to build the injector.
    pub const DI_COMMIT_DURATION: &str = "monkey_di_commit_seconds";
}

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder as the global `metrics` recorder.
///
/// Does nothing when `config.enabled` is false.
///
/// # Errors
///
/// Returns [`TelemetryError::AlreadyInitialized`] on a second call and
/// [`TelemetryError::MetricsInit`] when the buckets are rejected or another
/// recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }
    if METRICS_HANDLE.get().is_some() {
        return Err(TelemetryError::AlreadyInitialized("metrics"));
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(&config.histogram_buckets)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    if METRICS_HANDLE.set(handle).is_err() {
        return Err(TelemetryError::AlreadyInitialized("metrics"));
    }

    register_metric_descriptions();
    tracing::debug!(buckets = config.histogram_buckets.len(), "Prometheus recorder installed");
    Ok(())
}

/// Returns the global metrics handle if initialized.
pub fn metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(names::HTTP_REQUESTS_TOTAL, "Total number of HTTP requests processed");
    describe_histogram!(
        names::HTTP_REQUEST_DURATION,
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        names::HTTP_IN_FLIGHT,
        "Number of HTTP requests currently being processed"
    );
    describe_histogram!(
        names::DI_COMMIT_DURATION,
        Unit::Seconds,
        "Time spent building the injector"
    );
}

/// Records a completed request on `connector` (`application` or `admin`).
pub fn record_request(connector: &'static str, method: &str, status_code: u16, duration: Duration) {
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "connector" => connector,
        "method" => method.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(names::HTTP_REQUEST_DURATION, "connector" => connector)
        .record(duration.as_secs_f64());
}

/// Increments the in-flight requests gauge.
pub fn increment_in_flight(connector: &'static str) {
    gauge!(names::HTTP_IN_FLIGHT, "connector" => connector).increment(1.0);
}

/// Decrements the in-flight requests gauge.
pub fn decrement_in_flight(connector: &'static str) {
    gauge!(names::HTTP_IN_FLIGHT, "connector" => connector).decrement(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_metrics_is_noop() {
        let config = MetricsConfig {
            enabled: false,
            ..MetricsConfig::default()
        };
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_recording_without_recorder_does_not_panic() {
        record_request("application", "GET", 200, Duration::from_millis(12));
        increment_in_flight("admin");
        decrement_in_flight("admin");
    }

    #[test]
    fn test_init_and_render() {
        match init_metrics(&MetricsConfig::default()) {
            Ok(()) => {}
            Err(e) => assert!(e.is_already_initialized(), "unexpected error: {e}"),
        }

        record_request("application", "GET", 200, Duration::from_millis(3));
        let output = render_metrics().unwrap();
        assert!(output.contains(names::HTTP_REQUESTS_TOTAL));
        assert!(metrics_handle().is_some());

        let second = init_metrics(&MetricsConfig::default()).unwrap_err();
        assert!(second.is_already_initialized());
    }
}
