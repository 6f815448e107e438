//! Stable policy: minimize cross-node workload variance
//!
//! The score of a node workload map is, per metric, the population
//! variance of node values at each common bucket, averaged over time and
//! weighted by the configured metric weighting. Lower means the cluster
//! is flatter.

use std::collections::{BTreeMap, BTreeSet};

use super::PlacementPolicy;
use crate::models::{MetricKind, WorkloadMatrix};

#[derive(Debug, Clone)]
pub struct StablePolicy {
    weighting: BTreeMap<MetricKind, f64>,
}

impl StablePolicy {
    pub fn new(weighting: BTreeMap<MetricKind, f64>) -> Self {
        Self { weighting }
    }

    /// All metrics weighted equally.
    pub fn uniform() -> Self {
        Self {
            weighting: BTreeMap::new(),
        }
    }

    fn weight(&self, metric: MetricKind) -> f64 {
        self.weighting.get(&metric).copied().unwrap_or(1.0)
    }
}

impl PlacementPolicy for StablePolicy {
    fn name(&self) -> &'static str {
        "stable"
    }

    fn score_by_metric(&self, nodes: &WorkloadMatrix) -> BTreeMap<MetricKind, f64> {
        let mut scores = BTreeMap::new();
        for metric in metrics_of(nodes) {
            let columns = metric_columns(nodes, metric);
            let mean_variance = if columns.is_empty() {
                0.0
            } else {
                columns.iter().map(|values| variance(values)).sum::<f64>()
                    / columns.len() as f64
            };
            scores.insert(metric, self.weight(metric) * mean_variance);
        }
        scores
    }
}

/// Union of metrics present on any node.
pub(super) fn metrics_of(nodes: &WorkloadMatrix) -> BTreeSet<MetricKind> {
    nodes
        .values()
        .flat_map(|group| group.keys().copied())
        .collect()
}

/// Per-bucket columns of node values for one metric, restricted to
/// buckets every carrying node shares.
pub(super) fn metric_columns(nodes: &WorkloadMatrix, metric: MetricKind) -> Vec<Vec<f64>> {
    let series: Vec<_> = nodes
        .values()
        .filter_map(|group| group.get(&metric))
        .collect();
    if series.is_empty() {
        return Vec::new();
    }

    let mut common: BTreeSet<i64> = series[0].keys().copied().collect();
    for s in series.iter().skip(1) {
        let keys: BTreeSet<i64> = s.keys().copied().collect();
        common = common.intersection(&keys).copied().collect();
    }

    common
        .into_iter()
        .map(|bucket| series.iter().map(|s| s[&bucket]).collect())
        .collect()
}

/// Population variance.
fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlignedSeries, SeriesGroup};

    fn matrix(entries: &[(&str, &[(i64, f64)])]) -> WorkloadMatrix {
        entries
            .iter()
            .map(|(name, points)| {
                let mut group = SeriesGroup::new();
                group.insert(MetricKind::Cpu, points.iter().copied().collect::<AlignedSeries>());
                (name.to_string(), group)
            })
            .collect()
    }

    #[test]
    fn test_flat_cluster_scores_zero() {
        let nodes = matrix(&[("a", &[(0, 2.0), (1, 2.0)]), ("b", &[(0, 2.0), (1, 2.0)])]);
        let score = StablePolicy::uniform().score(&nodes);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_variance_averaged_over_time() {
        // Bucket 0: values (0, 4) -> variance 4. Bucket 1: (2, 2) -> 0.
        let nodes = matrix(&[("a", &[(0, 0.0), (1, 2.0)]), ("b", &[(0, 4.0), (1, 2.0)])]);
        let score = StablePolicy::uniform().score(&nodes);
        assert!((score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighting_scales_metric_score() {
        let nodes = matrix(&[("a", &[(0, 0.0)]), ("b", &[(0, 4.0)])]);
        let weighted = StablePolicy::new(BTreeMap::from([(MetricKind::Cpu, 0.5)]));
        assert!((weighted.score(&nodes) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_score_restricted_to_common_buckets() {
        let nodes = matrix(&[("a", &[(0, 0.0), (1, 9.0)]), ("b", &[(0, 4.0)])]);
        // Only bucket 0 is shared; bucket 1 must not contribute.
        let score = StablePolicy::uniform().score(&nodes);
        assert!((score - 4.0).abs() < 1e-12);
    }
}
