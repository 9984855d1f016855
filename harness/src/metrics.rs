//! # Prometheus Metrics
//!
//! Counters for a single stress run, kept in a dedicated
//! [`prometheus::Registry`] so several drivers in one process never collide.
//! The binary prints the text exposition when the run ends.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::actions::Action;

/// Outcome label values for [`DriverMetrics::actions_total`].
pub const OUTCOME_EXECUTED: &str = "executed";
pub const OUTCOME_SKIPPED: &str = "skipped";
pub const OUTCOME_FAILED: &str = "failed";

/// Metric handles for a stress run.
///
/// Clone-friendly: prometheus handles are reference counted internally.
#[derive(Clone)]
pub struct DriverMetrics {
    registry: Registry,
    /// Loop iterations started.
    pub iterations_total: IntCounter,
    /// Actions attempted, labelled by `action` and `outcome`.
    pub actions_total: IntCounterVec,
    /// Snapshot reads that failed.
    pub snapshot_failures_total: IntCounter,
    /// Clock advances or block mines that failed.
    pub clock_failures_total: IntCounter,
}

impl DriverMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("elastic_stress".into()), None)?;

        let iterations_total =
            IntCounter::new("iterations_total", "Total number of fuzz loop iterations")?;
        registry.register(Box::new(iterations_total.clone()))?;

        let actions_total = IntCounterVec::new(
            Opts::new("actions_total", "Actions attempted by label and outcome"),
            &["action", "outcome"],
        )?;
        registry.register(Box::new(actions_total.clone()))?;

        let snapshot_failures_total = IntCounter::new(
            "snapshot_failures_total",
            "Snapshot reads that failed and were skipped",
        )?;
        registry.register(Box::new(snapshot_failures_total.clone()))?;

        let clock_failures_total = IntCounter::new(
            "clock_failures_total",
            "Simulated clock operations that failed",
        )?;
        registry.register(Box::new(clock_failures_total.clone()))?;

        Ok(Self {
            registry,
            iterations_total,
            actions_total,
            snapshot_failures_total,
            clock_failures_total,
        })
    }

    pub(crate) fn record_action(&self, action: Action, outcome: &str) {
        self.actions_total
            .with_label_values(&[action.label(), outcome])
            .inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
