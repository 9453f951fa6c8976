//! Logging and metrics initialisation for Monkey applications.
//!
//! - **Logging**: a `tracing-subscriber` pipeline, JSON in production and
//!   pretty-printed otherwise
//! - **Metrics**: a process-wide Prometheus recorder behind the `metrics` facade
//!
//! Both subsystems are global and are installed once per process by the
//! command runner before any application code runs.
//!
//! # Metrics Endpoint
//!
//! The admin `/metrics` endpoint serves [`render_metrics`]:
//!
//! ```text
//! # HELP monkey_http_requests_total Total number of HTTP requests processed
//! # TYPE monkey_http_requests_total counter
//! monkey_http_requests_total{connector="application",method="GET",status="200"} 1234
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use crate::error::TelemetryError;
pub use crate::logging::{init_logging, LogSettings};
pub use crate::metrics::{init_metrics, render_metrics};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
