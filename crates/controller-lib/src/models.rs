//! Core data model shared by the prediction and decision components
//!
//! Everything downstream of the store speaks in aligned, time-bucketed
//! series: a bucket index is an epoch timestamp divided by the configured
//! granularity, and all metrics of one entity cover the same bucket set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Canonical metric dimensions the controller sizes and schedules on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Memory,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(MetricKind::Cpu),
            "memory" => Ok(MetricKind::Memory),
            other => Err(EngineError::UnknownMetricType(other.to_string())),
        }
    }
}

/// One raw sample as it arrives from the metric store, already converted
/// to epoch seconds and a numeric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub time: i64,
    pub value: f64,
}

/// Time-bucket index -> value, for one (entity, metric) pair.
pub type AlignedSeries = BTreeMap<i64, f64>;

/// Metric -> aligned series, for one entity. All series in a group share
/// an identical, non-empty bucket set.
pub type SeriesGroup = BTreeMap<MetricKind, AlignedSeries>;

/// Entity name -> series group. Entities whose metrics had no common
/// buckets are absent, never present-but-empty.
pub type WorkloadMatrix = BTreeMap<String, SeriesGroup>;

/// Recommended requests/limits per metric for one container, tagged with
/// the bucket timestamp the recommendation applies from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub time: i64,
    pub requests: BTreeMap<MetricKind, f64>,
    pub limits: BTreeMap<MetricKind, f64>,
}

impl ResourceSpec {
    pub fn new(time: i64) -> Self {
        Self {
            time,
            requests: BTreeMap::new(),
            limits: BTreeMap::new(),
        }
    }

    /// Insert a requests/limits pair for one metric.
    pub fn set(&mut self, metric: MetricKind, requests: f64, limits: f64) {
        self.requests.insert(metric, requests);
        self.limits.insert(metric, limits);
    }
}

/// Identity of a pod as the cluster knows it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PodId {
    pub namespace: String,
    pub uid: String,
    pub name: String,
}

impl fmt::Display for PodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Container entry of a pod spec; requests/limits are the raw quantity
/// strings as applied on the cluster (for example "150m", "128Mi").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

/// A pod the controller should predict and recommend for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSpec {
    pub id: PodId,
    /// Node the pod currently runs on.
    pub node_name: String,
    /// Pod start time in epoch seconds; anchors the init-stage window.
    pub start_time: i64,
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

/// Predicted workload of one pod entering the scheduling search.
#[derive(Debug, Clone)]
pub struct PodWorkload {
    pub id: PodId,
    pub current_node: String,
    pub series: SeriesGroup,
}

/// Where one pod should run next cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementDecision {
    pub pod: PodId,
    pub node: String,
    pub time: i64,
}

/// Per-metric aggregate variance score before and after a scheduling
/// decision. Observability only; correctness never depends on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub before: BTreeMap<MetricKind, f64>,
    pub after: BTreeMap<MetricKind, f64>,
}

impl ScoreSnapshot {
    pub fn total_before(&self) -> f64 {
        self.before.values().sum()
    }

    pub fn total_after(&self) -> f64 {
        self.after.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kind_round_trip() {
        assert_eq!("cpu".parse::<MetricKind>().unwrap(), MetricKind::Cpu);
        assert_eq!("memory".parse::<MetricKind>().unwrap(), MetricKind::Memory);
        assert_eq!(MetricKind::Cpu.to_string(), "cpu");
    }

    #[test]
    fn test_metric_kind_unknown() {
        let err = "disk".parse::<MetricKind>().unwrap_err();
        assert!(matches!(err, EngineError::UnknownMetricType(ref s) if s == "disk"));
    }

    #[test]
    fn test_resource_spec_set() {
        let mut spec = ResourceSpec::new(0);
        spec.set(MetricKind::Cpu, 0.48, 0.72);
        assert_eq!(spec.requests[&MetricKind::Cpu], 0.48);
        assert_eq!(spec.limits[&MetricKind::Cpu], 0.72);
    }

    #[test]
    fn test_score_snapshot_totals() {
        let mut snapshot = ScoreSnapshot::default();
        snapshot.before.insert(MetricKind::Cpu, 1.5);
        snapshot.before.insert(MetricKind::Memory, 0.5);
        snapshot.after.insert(MetricKind::Cpu, 1.0);
        assert_eq!(snapshot.total_before(), 2.0);
        assert_eq!(snapshot.total_after(), 1.0);
    }
}
