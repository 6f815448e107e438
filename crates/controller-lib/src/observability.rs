//! Observability for the controller
//!
//! Prometheus metrics registered once in a process-global registry, with
//! a cheap cloneable handle, plus structured tracing events for the
//! decisions operators care about.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, HistogramVec, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::info;

use crate::models::{PlacementDecision, ScoreSnapshot};

/// Cycle latency buckets in seconds; cycles include store round trips and
/// a full forecast batch.
const CYCLE_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

static GLOBAL_METRICS: OnceLock<ControllerMetricsInner> = OnceLock::new();

struct ControllerMetricsInner {
    cycles_total: IntCounterVec,
    cycle_latency_seconds: HistogramVec,
    units_skipped_total: IntCounterVec,
    forecasts_generated_total: IntCounter,
    forecast_fallbacks_total: IntCounter,
    recommendations_accepted_total: IntCounter,
    recommendations_suppressed_total: IntCounter,
    placements_total: IntCounter,
    store_errors_total: IntCounterVec,
    scheduling_score: GaugeVec,
}

impl ControllerMetricsInner {
    fn new() -> Self {
        Self {
            cycles_total: register_int_counter_vec!(
                "workload_controller_cycles_total",
                "Completed poll cycles per loop",
                &["loop"]
            )
            .expect("Failed to register cycles_total"),

            cycle_latency_seconds: register_histogram_vec!(
                "workload_controller_cycle_latency_seconds",
                "Wall time of one poll cycle per loop",
                &["loop"],
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            units_skipped_total: register_int_counter_vec!(
                "workload_controller_units_skipped_total",
                "Entities excluded from a cycle, by reason",
                &["reason"]
            )
            .expect("Failed to register units_skipped_total"),

            forecasts_generated_total: register_int_counter!(
                "workload_controller_forecasts_generated_total",
                "Series forecasts produced"
            )
            .expect("Failed to register forecasts_generated_total"),

            forecast_fallbacks_total: register_int_counter!(
                "workload_controller_forecast_fallbacks_total",
                "Forecasts that degraded to the historical-mean fallback"
            )
            .expect("Failed to register forecast_fallbacks_total"),

            recommendations_accepted_total: register_int_counter!(
                "workload_controller_recommendations_accepted_total",
                "Recommendations written to the store"
            )
            .expect("Failed to register recommendations_accepted_total"),

            recommendations_suppressed_total: register_int_counter!(
                "workload_controller_recommendations_suppressed_total",
                "Recommendations suppressed by the hysteresis rule"
            )
            .expect("Failed to register recommendations_suppressed_total"),

            placements_total: register_int_counter!(
                "workload_controller_placements_total",
                "Pod placement decisions committed"
            )
            .expect("Failed to register placements_total"),

            store_errors_total: register_int_counter_vec!(
                "workload_controller_store_errors_total",
                "Failed store calls, by operation",
                &["op"]
            )
            .expect("Failed to register store_errors_total"),

            scheduling_score: register_gauge_vec!(
                "workload_controller_scheduling_score",
                "Aggregate variance score of the latest scheduling decision",
                &["metric", "stage"]
            )
            .expect("Failed to register scheduling_score"),
        }
    }
}

/// Lightweight handle to the global metrics instance.
#[derive(Clone)]
pub struct ControllerMetrics {
    _private: (),
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ControllerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn cycle_timer(&self, loop_name: &str) -> prometheus::HistogramTimer {
        self.cycle_histogram(loop_name).start_timer()
    }

    fn cycle_histogram(&self, loop_name: &str) -> Histogram {
        self.inner()
            .cycle_latency_seconds
            .with_label_values(&[loop_name])
    }

    pub fn inc_cycle(&self, loop_name: &str) {
        self.inner().cycles_total.with_label_values(&[loop_name]).inc();
    }

    pub fn inc_skipped(&self, reason: &str) {
        self.inner()
            .units_skipped_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_forecasts(&self, count: u64) {
        self.inner().forecasts_generated_total.inc_by(count);
    }

    pub fn inc_forecast_fallbacks(&self, count: u64) {
        self.inner().forecast_fallbacks_total.inc_by(count);
    }

    pub fn inc_recommendation_accepted(&self) {
        self.inner().recommendations_accepted_total.inc();
    }

    pub fn inc_recommendation_suppressed(&self) {
        self.inner().recommendations_suppressed_total.inc();
    }

    pub fn inc_placements(&self, count: u64) {
        self.inner().placements_total.inc_by(count);
    }

    pub fn inc_store_error(&self, op: &str) {
        self.inner().store_errors_total.with_label_values(&[op]).inc();
    }

    pub fn set_scheduling_scores(&self, scores: &ScoreSnapshot) {
        for (metric, value) in &scores.before {
            self.inner()
                .scheduling_score
                .with_label_values(&[metric.as_str(), "before"])
                .set(*value);
        }
        for (metric, value) in &scores.after {
            self.inner()
                .scheduling_score
                .with_label_values(&[metric.as_str(), "after"])
                .set(*value);
        }
    }
}

/// Structured event logging around cycles and decisions.
#[derive(Clone)]
pub struct CycleLogger;

impl CycleLogger {
    pub fn log_startup(version: &str, backend: &str) {
        info!(
            event = "controller_started",
            version = %version,
            store_backend = %backend,
            "Workload controller started"
        );
    }

    pub fn log_shutdown(reason: &str) {
        info!(
            event = "controller_shutdown",
            reason = %reason,
            "Workload controller shutting down"
        );
    }

    pub fn log_cycle(loop_name: &str, processed: usize, skipped: usize, failed: usize) {
        info!(
            event = "cycle_complete",
            poll_loop = %loop_name,
            processed,
            skipped,
            failed,
            "Poll cycle complete"
        );
    }

    pub fn log_placements(decisions: &[PlacementDecision], scores: &ScoreSnapshot) {
        for decision in decisions {
            info!(
                event = "placement_decided",
                pod = %decision.pod,
                node = %decision.node,
                "Pod placement decided"
            );
        }
        info!(
            event = "scheduling_scored",
            before = scores.total_before(),
            after = scores.total_after(),
            "Scheduling variance score"
        );
    }
}
