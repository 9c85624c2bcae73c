//! Observability infrastructure for the fleet monitor
//!
//! Provides:
//! - Prometheus metrics (cycle latency, selection size, verdict counts, failures)
//! - Structured logging of cycle, decision and termination events with tracing

use crate::error::FleetError;
use crate::models::{Decision, Operation, Verdict};
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle latency (in seconds); cycles shell out per instance
const CYCLE_LATENCY_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<FleetMetricsInner> = OnceLock::new();

struct FleetMetricsInner {
    cycle_latency_seconds: Histogram,
    cycles_completed: IntCounter,
    cycles_failed: IntCounter,
    instances_selected: IntGauge,
    reclaim_candidates: IntGauge,
    abstentions: IntGauge,
    metric_fetches: IntCounter,
    instance_failures: IntCounter,
    terminations_submitted: IntCounter,
}

impl FleetMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "fleet_monitor_cycle_latency_seconds",
                "Time spent running one poll cycle",
                CYCLE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycles_completed: register_int_counter!(
                "fleet_monitor_cycles_completed_total",
                "Poll cycles that ran to completion"
            )
            .expect("Failed to register cycles_completed"),

            cycles_failed: register_int_counter!(
                "fleet_monitor_cycles_failed_total",
                "Poll cycles aborted because the inventory could not be fetched"
            )
            .expect("Failed to register cycles_failed"),

            instances_selected: register_int_gauge!(
                "fleet_monitor_instances_selected",
                "Instances selected in the latest cycle"
            )
            .expect("Failed to register instances_selected"),

            reclaim_candidates: register_int_gauge!(
                "fleet_monitor_reclaim_candidates",
                "Instances with a reclaim verdict in the latest cycle"
            )
            .expect("Failed to register reclaim_candidates"),

            abstentions: register_int_gauge!(
                "fleet_monitor_abstentions",
                "Instances without enough data for a verdict in the latest cycle"
            )
            .expect("Failed to register abstentions"),

            metric_fetches: register_int_counter!(
                "fleet_monitor_metric_fetches_total",
                "Calls made to the metric source"
            )
            .expect("Failed to register metric_fetches"),

            instance_failures: register_int_counter!(
                "fleet_monitor_instance_failures_total",
                "Per-instance failures (load, fetch, persist or terminate)"
            )
            .expect("Failed to register instance_failures"),

            terminations_submitted: register_int_counter!(
                "fleet_monitor_terminations_submitted_total",
                "Instances submitted for termination"
            )
            .expect("Failed to register terminations_submitted"),
        }
    }
}

/// Fleet metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct FleetMetrics {
    _private: (),
}

impl Default for FleetMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(FleetMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &FleetMetricsInner {
        GLOBAL_METRICS.get_or_init(FleetMetricsInner::new)
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn inc_cycles_completed(&self) {
        self.inner().cycles_completed.inc();
    }

    pub fn inc_cycles_failed(&self) {
        self.inner().cycles_failed.inc();
    }

    /// Record the verdict counts of the latest cycle
    pub fn set_cycle_totals(&self, selected: usize, reclaim: usize, abstained: usize) {
        let inner = self.inner();
        inner.instances_selected.set(selected as i64);
        inner.reclaim_candidates.set(reclaim as i64);
        inner.abstentions.set(abstained as i64);
    }

    pub fn inc_metric_fetches(&self) {
        self.inner().metric_fetches.inc();
    }

    pub fn inc_instance_failures(&self) {
        self.inner().instance_failures.inc();
    }

    pub fn add_terminations_submitted(&self, count: usize) {
        self.inner().terminations_submitted.inc_by(count as u64);
    }
}

/// Structured logger for monitor events
///
/// Every event carries the region so logs from several monitors can be told apart.
#[derive(Clone)]
pub struct StructuredLogger {
    region: String,
}

impl StructuredLogger {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }

    pub fn log_decision(&self, cycle: u64, decision: &Decision) {
        info!(
            event = "decision_made",
            region = %self.region,
            cycle,
            instance_id = %decision.id,
            mean_utilization = decision.mean_value,
            samples = decision.samples,
            verdict = %decision.verdict,
            "Utilization verdict"
        );
    }

    /// Log a per-instance failure; the cycle carries on with the next instance
    pub fn log_instance_failure(
        &self,
        cycle: u64,
        instance_id: &str,
        operation: Operation,
        error: &FleetError,
    ) {
        warn!(
            event = "instance_failed",
            region = %self.region,
            cycle,
            instance_id = %instance_id,
            operation = %operation,
            error_kind = error.kind(),
            error = %error,
            "Skipping instance for this cycle"
        );
    }

    pub fn log_cycle_complete(
        &self,
        cycle: u64,
        selected: usize,
        retained: usize,
        reclaimed: usize,
        failures: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "cycle_completed",
            region = %self.region,
            cycle,
            selected,
            retained,
            reclaimed,
            failures,
            elapsed_ms,
            "Poll cycle complete"
        );
    }

    pub fn log_cycle_failure(&self, cycle: u64, error: &FleetError) {
        warn!(
            event = "cycle_failed",
            region = %self.region,
            cycle,
            error_kind = error.kind(),
            error = %error,
            "Poll cycle failed, will retry next cycle"
        );
    }

    pub fn log_termination(&self, cycle: u64, instance_ids: &[String], verdict: Verdict) {
        warn!(
            event = "termination_submitted",
            region = %self.region,
            cycle,
            instances = ?instance_ids,
            verdict = %verdict,
            "Submitted instances for termination"
        );
    }

    pub fn log_startup(&self, version: &str, watch: bool) {
        info!(
            event = "monitor_started",
            region = %self.region,
            version = %version,
            watch,
            "Fleet monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str, cycles: u64) {
        info!(
            event = "monitor_shutdown",
            region = %self.region,
            reason = %reason,
            cycles,
            "Fleet monitor shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fleet_metrics_creation() {
        // Registration happens once per process; extra handles share it
        let metrics = FleetMetrics::new();
        let again = FleetMetrics::new();

        metrics.observe_cycle_latency(0.5);
        metrics.inc_cycles_completed();
        metrics.inc_cycles_failed();
        metrics.set_cycle_totals(5, 2, 1);
        again.inc_metric_fetches();
        again.inc_instance_failures();
        again.add_terminations_submitted(2);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("us-west-1");
        assert_eq!(logger.region, "us-west-1");
    }
}
