//! Named metric registry.
//!
//! Values are recorded through the process-wide [`metrics`] recorder; this
//! registry only remembers which names exist and what kind they are, so the
//! admin endpoint can list them even when no exporter is installed.

use std::fmt;

use dashmap::DashMap;
use serde::Serialize;

/// The kind of a registered metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonic counter.
    Counter,
    /// Point-in-time value.
    Gauge,
    /// Distribution of observations.
    Histogram,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
        };
        f.write_str(name)
    }
}

/// Thread-safe registry of named metrics.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    metrics: DashMap<String, MetricKind>,
}

impl MetricRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, name: &str, kind: MetricKind) {
        let previous = self.metrics.insert(name.to_string(), kind);
        match previous {
            None => tracing::trace!(metric = name, kind = %kind, "Registered metric"),
            Some(old) if old != kind => {
                tracing::warn!(
                    metric = name,
                    old = %old,
                    new = %kind,
                    "Metric re-registered with a different kind"
                );
            }
            Some(_) => {}
        }
    }

    /// Registers (or looks up) a counter.
    pub fn counter(&self, name: &str) -> ::metrics::Counter {
        self.track(name, MetricKind::Counter);
        ::metrics::counter!(name.to_string())
    }

    /// Registers (or looks up) a gauge.
    pub fn gauge(&self, name: &str) -> ::metrics::Gauge {
        self.track(name, MetricKind::Gauge);
        ::metrics::gauge!(name.to_string())
    }

    /// Registers (or looks up) a histogram.
    pub fn histogram(&self, name: &str) -> ::metrics::Histogram {
        self.track(name, MetricKind::Histogram);
        ::metrics::histogram!(name.to_string())
    }

    /// The kind of a registered metric.
    pub fn kind(&self, name: &str) -> Option<MetricKind> {
        self.metrics.get(name).map(|entry| *entry.value())
    }

    /// Sorted names of all registered metrics.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.metrics.iter().map(|entry| entry.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered metrics.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
