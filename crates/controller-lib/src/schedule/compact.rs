//! Compact policy: bin-packing placement
//!
//! The mirror image of the stable policy: instead of flattening the
//! cluster it concentrates load, preferring nodes that are already busy
//! so the tail of the fleet drains and can be scaled down. The score is
//! the negated time-averaged sum of squared node workloads; piling onto a
//! hot node lowers it.

use std::collections::BTreeMap;

use super::stable::{metric_columns, metrics_of};
use super::PlacementPolicy;
use crate::models::{MetricKind, WorkloadMatrix};

#[derive(Debug, Clone)]
pub struct CompactPolicy {
    weighting: BTreeMap<MetricKind, f64>,
}

impl CompactPolicy {
    pub fn new(weighting: BTreeMap<MetricKind, f64>) -> Self {
        Self { weighting }
    }

    pub fn uniform() -> Self {
        Self {
            weighting: BTreeMap::new(),
        }
    }

    fn weight(&self, metric: MetricKind) -> f64 {
        self.weighting.get(&metric).copied().unwrap_or(1.0)
    }
}

impl PlacementPolicy for CompactPolicy {
    fn name(&self) -> &'static str {
        "compact"
    }

    fn score_by_metric(&self, nodes: &WorkloadMatrix) -> BTreeMap<MetricKind, f64> {
        let mut scores = BTreeMap::new();
        for metric in metrics_of(nodes) {
            let columns = metric_columns(nodes, metric);
            let concentration = if columns.is_empty() {
                0.0
            } else {
                columns
                    .iter()
                    .map(|values| values.iter().map(|v| v * v).sum::<f64>())
                    .sum::<f64>()
                    / columns.len() as f64
            };
            scores.insert(metric, -self.weight(metric) * concentration);
        }
        scores
    }
}
