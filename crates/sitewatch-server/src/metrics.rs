//! Prometheus metrics for the sitewatch server.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use sitewatch::{CheckOutcome, SweepReport};

/// Labels for check result metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CheckLabels {
    /// Outcome (baseline, unchanged, changed, config_error, ...)
    pub outcome: String,
}

/// Labels for store error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StoreLabels {
    /// Operation (save, delete)
    pub op: String,
}

/// Metrics registry with all sitewatch server metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    /// Completed checks by outcome
    checks_total: Family<CheckLabels, Counter>,
    /// Completed sweeps
    sweeps_total: Counter,
    /// Wall time per sweep
    sweep_duration_seconds: Histogram,
    /// Registered targets
    targets: Gauge,
    /// Failed or dropped store writes
    store_errors_total: Family<StoreLabels, Counter>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        // Counter names get the _total suffix appended on encode
        let checks_total = Family::<CheckLabels, Counter>::default();
        registry.register(
            "sitewatch_checks",
            "Completed checks by outcome",
            checks_total.clone(),
        );

        let sweeps_total = Counter::default();
        registry.register(
            "sitewatch_sweeps",
            "Completed scheduled sweeps",
            sweeps_total.clone(),
        );

        // 10ms to ~160s
        let sweep_duration_seconds = Histogram::new(exponential_buckets(0.01, 2.0, 15));
        registry.register(
            "sitewatch_sweep_duration_seconds",
            "Scheduled sweep duration in seconds",
            sweep_duration_seconds.clone(),
        );

        let targets = Gauge::default();
        registry.register(
            "sitewatch_targets",
            "Number of registered targets",
            targets.clone(),
        );

        let store_errors_total = Family::<StoreLabels, Counter>::default();
        registry.register(
            "sitewatch_store_errors",
            "Store writes that failed or were dropped",
            store_errors_total.clone(),
        );

        Self {
            registry,
            checks_total,
            sweeps_total,
            sweep_duration_seconds,
            targets,
            store_errors_total,
        }
    }

    /// Record one completed check
    pub fn record_check(&self, outcome: CheckOutcome) {
        self.checks_total
            .get_or_create(&CheckLabels {
                outcome: outcome.as_str().to_string(),
            })
            .inc();
    }

    /// Record a finished sweep. Its checks arrive through `record_check`.
    pub fn record_sweep(&self, report: &SweepReport) {
        self.sweeps_total.inc();
        self.sweep_duration_seconds
            .observe(report.elapsed.as_secs_f64());
    }

    pub fn update_target_count(&self, count: usize) {
        self.targets.set(count as i64);
    }

    pub fn record_store_error(&self, op: &str) {
        self.store_errors_total
            .get_or_create(&StoreLabels { op: op.to_string() })
            .inc();
    }

    /// Render in the Prometheus text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
