//! Resource recommendation
//!
//! Converts observed and forecast series into per-container requests and
//! limits, combines the initial-stage sizing with steady state, and
//! decides whether a freshly computed recommendation differs enough from
//! the previously applied one to be worth writing.

pub mod init_stage;
pub mod quantity;

pub use init_stage::{InitStage, InitStageDetector, MIN_SAMPLE_SIZE};

use tracing::debug;

use crate::error::EngineError;
use crate::models::{MetricKind, ResourceSpec, SeriesGroup};

/// Tuning knobs for the recommendation engine.
#[derive(Debug, Clone)]
pub struct RecommendConfig {
    /// Headroom multiplier applied to observed (init-stage) series.
    pub tolerance_observed: f64,
    /// Headroom multiplier applied to forecast series.
    pub tolerance_forecast: f64,
    /// Hysteresis threshold: a recommendation whose requests and limits
    /// all move less than this relative to the new value is suppressed.
    pub gamma: f64,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            tolerance_observed: 1.2,
            tolerance_forecast: 1.2,
            gamma: 0.1,
        }
    }
}

/// Derives requests/limits per container and applies the hysteresis rule.
#[derive(Debug, Clone)]
pub struct RecommendationEngine {
    config: RecommendConfig,
    detector: InitStageDetector,
}

impl RecommendationEngine {
    pub fn new(config: RecommendConfig) -> Self {
        Self {
            config,
            detector: InitStageDetector::default(),
        }
    }

    /// The per-metric sizing rule.
    ///
    /// cpu: requests from the mean, limits from the max. memory: both
    /// from the max, since reclaiming memory is not graceful.
    pub fn requests_limits(
        metric: MetricKind,
        data_mean: f64,
        data_max: f64,
        tolerance: f64,
    ) -> (f64, f64) {
        match metric {
            MetricKind::Cpu => (data_mean * tolerance, data_max * tolerance),
            MetricKind::Memory => (data_max * tolerance, data_max * tolerance),
        }
    }

    /// Size the initial stage of one container from its init-window
    /// observed series.
    pub fn init_stage_spec(&self, observed: &SeriesGroup) -> Result<ResourceSpec, EngineError> {
        let mut spec = ResourceSpec::new(0);
        for (metric, series) in observed {
            let values: Vec<f64> = series.values().copied().collect();
            let stage = self.detector.detect(&values)?;
            let (requests, limits) = Self::requests_limits(
                *metric,
                stage.mean,
                stage.max,
                self.config.tolerance_observed,
            );
            spec.set(*metric, requests, limits);
        }
        Ok(spec)
    }

    /// Size steady state from a container's forecast series. The spec is
    /// stamped with the earliest bucket across the forecast metrics.
    pub fn steady_spec(&self, predicted: &SeriesGroup) -> ResourceSpec {
        let time = predicted
            .values()
            .filter_map(|series| series.keys().next().copied())
            .min()
            .unwrap_or(0);

        let mut spec = ResourceSpec::new(time);
        for (metric, series) in predicted {
            let values: Vec<f64> = series.values().copied().collect();
            let data_mean = values.iter().sum::<f64>() / values.len().max(1) as f64;
            let data_max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let (requests, limits) = Self::requests_limits(
                *metric,
                data_mean,
                data_max,
                self.config.tolerance_forecast,
            );
            spec.set(*metric, requests, limits);
        }
        spec
    }

    /// Combine a steady-state spec with the container's initial-stage
    /// spec by taking the element-wise maximum.
    pub fn combine(mut steady: ResourceSpec, init: Option<&ResourceSpec>) -> ResourceSpec {
        if let Some(init) = init {
            for (metric, value) in &init.requests {
                let entry = steady.requests.entry(*metric).or_insert(0.0);
                *entry = entry.max(*value);
            }
            for (metric, value) in &init.limits {
                let entry = steady.limits.entry(*metric).or_insert(0.0);
                *entry = entry.max(*value);
            }
        }
        steady
    }

    /// Hysteresis rule: a new recommendation replaces the previous one
    /// unless, for every metric, both requests and limits moved less than
    /// gamma relative to the new value. Without a previous recommendation
    /// the new one is always accepted.
    pub fn should_replace(&self, new: &ResourceSpec, previous: Option<&ResourceSpec>) -> bool {
        let Some(previous) = previous else {
            return true;
        };

        for (metric, new_requests) in &new.requests {
            let (Some(prev_requests), Some(prev_limits)) =
                (previous.requests.get(metric), previous.limits.get(metric))
            else {
                return true;
            };
            let new_limits = new.limits.get(metric).copied().unwrap_or(0.0);

            if relative_difference(*new_requests, *prev_requests) >= self.config.gamma {
                return true;
            }
            if relative_difference(new_limits, *prev_limits) >= self.config.gamma {
                return true;
            }
        }

        debug!("recommendation suppressed: requests/limits within gamma of applied values");
        false
    }
}

/// `|new - prev| / new`, treating a zero new value as an infinite move
/// unless the previous value is also zero.
fn relative_difference(new: f64, prev: f64) -> f64 {
    if new == 0.0 {
        if prev == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        (new - prev).abs() / new
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlignedSeries;

    fn engine() -> RecommendationEngine {
        RecommendationEngine::new(RecommendConfig::default())
    }

    fn cpu_group(points: &[(i64, f64)]) -> SeriesGroup {
        let mut group = SeriesGroup::new();
        group.insert(MetricKind::Cpu, points.iter().copied().collect::<AlignedSeries>());
        group
    }

    #[test]
    fn test_cpu_rule_uses_mean_and_max() {
        let spec = engine().steady_spec(&cpu_group(&[(0, 0.2), (1, 0.4), (2, 0.6)]));
        assert!((spec.requests[&MetricKind::Cpu] - 0.48).abs() < 1e-12);
        assert!((spec.limits[&MetricKind::Cpu] - 0.72).abs() < 1e-12);
        assert_eq!(spec.time, 0);
    }

    #[test]
    fn test_memory_rule_uses_max_for_both() {
        let mut group = SeriesGroup::new();
        group.insert(
            MetricKind::Memory,
            AlignedSeries::from([(5, 100.0), (6, 300.0), (7, 200.0)]),
        );
        let spec = engine().steady_spec(&group);
        assert!((spec.requests[&MetricKind::Memory] - 360.0).abs() < 1e-9);
        assert!((spec.limits[&MetricKind::Memory] - 360.0).abs() < 1e-9);
        assert_eq!(spec.time, 5);
    }

    #[test]
    fn test_init_stage_spec_sizes_from_detector() {
        let group = cpu_group(&[
            (0, 0.24),
            (1, 0.38),
            (2, 0.51),
            (3, 0.38),
            (4, 0.31),
            (5, 0.30),
            (6, 0.32),
            (7, 0.24),
            (8, 0.37),
            (9, 0.29),
        ]);
        let spec = engine().init_stage_spec(&group).unwrap();
        assert!((spec.requests[&MetricKind::Cpu] - 0.335 * 1.2).abs() < 1e-9);
        assert!((spec.limits[&MetricKind::Cpu] - 0.51 * 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_init_stage_spec_propagates_short_series() {
        let group = cpu_group(&[(0, 0.1), (1, 0.2)]);
        assert!(matches!(
            engine().init_stage_spec(&group),
            Err(EngineError::InsufficientSamples { .. })
        ));
    }

    #[test]
    fn test_combine_takes_elementwise_max() {
        let mut steady = ResourceSpec::new(10);
        steady.set(MetricKind::Cpu, 0.4, 0.8);
        let mut init = ResourceSpec::new(0);
        init.set(MetricKind::Cpu, 0.6, 0.7);
        init.set(MetricKind::Memory, 100.0, 100.0);

        let combined = RecommendationEngine::combine(steady, Some(&init));
        assert_eq!(combined.requests[&MetricKind::Cpu], 0.6);
        assert_eq!(combined.limits[&MetricKind::Cpu], 0.8);
        assert_eq!(combined.requests[&MetricKind::Memory], 100.0);
        assert_eq!(combined.time, 10);
    }

    #[test]
    fn test_hysteresis_accepts_without_previous() {
        let mut new = ResourceSpec::new(0);
        new.set(MetricKind::Cpu, 0.5, 1.0);
        assert!(engine().should_replace(&new, None));
    }

    #[test]
    fn test_hysteresis_suppresses_small_moves() {
        let mut new = ResourceSpec::new(0);
        new.set(MetricKind::Cpu, 1.0, 2.0);
        new.set(MetricKind::Memory, 100.0, 100.0);
        let mut prev = ResourceSpec::new(0);
        prev.set(MetricKind::Cpu, 0.95, 1.95);
        prev.set(MetricKind::Memory, 101.0, 99.0);

        assert!(!engine().should_replace(&new, Some(&prev)));
    }

    #[test]
    fn test_hysteresis_accepts_when_any_metric_moves() {
        let mut new = ResourceSpec::new(0);
        new.set(MetricKind::Cpu, 1.0, 2.0);
        new.set(MetricKind::Memory, 100.0, 100.0);
        let mut prev = ResourceSpec::new(0);
        prev.set(MetricKind::Cpu, 0.99, 2.0);
        // Memory limits moved by 50% of the new value.
        prev.set(MetricKind::Memory, 100.0, 150.0);

        assert!(engine().should_replace(&new, Some(&prev)));
    }

    #[test]
    fn test_hysteresis_accepts_metric_missing_from_previous() {
        let mut new = ResourceSpec::new(0);
        new.set(MetricKind::Cpu, 1.0, 2.0);
        new.set(MetricKind::Memory, 100.0, 100.0);
        let mut prev = ResourceSpec::new(0);
        prev.set(MetricKind::Cpu, 1.0, 2.0);

        assert!(engine().should_replace(&new, Some(&prev)));
    }

    #[test]
    fn test_relative_difference_zero_handling() {
        assert_eq!(relative_difference(0.0, 0.0), 0.0);
        assert_eq!(relative_difference(0.0, 1.0), f64::INFINITY);
        assert!((relative_difference(2.0, 1.0) - 0.5).abs() < 1e-12);
    }
}
