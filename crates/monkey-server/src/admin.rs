//! Operational endpoints served by the admin connector.
//!
//! | Path | Response |
//! |------|----------|
//! | `GET /ping` | `pong` |
//! | `GET /healthcheck` | JSON map of check results; 200 if all healthy, else 500 |
//! | `GET /metrics` | Prometheus text, or the registered metric names as JSON |

use std::collections::BTreeMap;
use std::sync::Arc;

use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};
use monkey_core::health::HealthCheckRegistry;
use monkey_core::http::{HttpRequest, HttpResponse, RouteRegistry};
use monkey_core::metrics::MetricRegistry;

/// Ping endpoint path.
pub const PING_PATH: &str = "/ping";
/// Health check endpoint path.
pub const HEALTHCHECK_PATH: &str = "/healthcheck";
/// Metrics endpoint path.
pub const METRICS_PATH: &str = "/metrics";

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Adds the admin endpoints to `routes`.
pub fn register_admin_routes(
    routes: &RouteRegistry,
    health_checks: Arc<HealthCheckRegistry>,
    metrics: Arc<MetricRegistry>,
) {
    routes.add(Method::GET, PING_PATH, |_req: HttpRequest| async {
        HttpResponse::text(StatusCode::OK, "pong")
    });

    routes.add(Method::GET, HEALTHCHECK_PATH, move |_req: HttpRequest| {
        run_health_checks_blocking(Arc::clone(&health_checks))
    });

    routes.add(Method::GET, METRICS_PATH, move |_req: HttpRequest| {
        let metrics = Arc::clone(&metrics);
        async move { metrics_response(&metrics) }
    });
}

/// Runs the checks on the blocking pool so slow checks cannot stall the
/// connector's worker threads.
async fn run_health_checks_blocking(health_checks: Arc<HealthCheckRegistry>) -> HttpResponse {
    match tokio::task::spawn_blocking(move || healthcheck_response(&health_checks)).await {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(error = %error, "Health checks did not complete");
            HttpResponse::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "healthcheck_failed",
                "health checks did not complete",
            )
        }
    }
}

/// Runs every health check and renders the results.
pub fn healthcheck_response(health_checks: &HealthCheckRegistry) -> HttpResponse {
    let results = health_checks.run_health_checks();
    let status = if results.values().all(|r| r.is_healthy()) {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    HttpResponse::json(status, &results)
}

fn metrics_response(metrics: &MetricRegistry) -> HttpResponse {
    if let Some(rendered) = monkey_telemetry::render_metrics() {
        return HttpResponse::text(StatusCode::OK, rendered)
            .with_header(CONTENT_TYPE, HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE));
    }

    let registered: BTreeMap<String, String> = metrics
        .names()
        .into_iter()
        .filter_map(|name| {
            let kind = metrics.kind(&name)?;
            Some((name, kind.to_string()))
        })
        .collect();
    HttpResponse::json(StatusCode::OK, &registered)
}
