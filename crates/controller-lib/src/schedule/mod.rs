//! Stable placement scheduling
//!
//! Assigns a batch of pods to nodes so the chosen placement policy's
//! aggregate score is minimized. The core loop is shared across policies:
//! subtract each pod from its current node, greedily place pods one at a
//! time, and repeat the greedy pass over randomized visiting orders,
//! keeping the best final score. Hypothetical placements are built on
//! copies; the caller's workload matrix is never mutated.

pub mod compact;
pub mod stable;

pub use compact::CompactPolicy;
pub use stable::StablePolicy;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::error::EngineError;
use crate::models::{
    MetricKind, PlacementDecision, PodWorkload, ScoreSnapshot, SeriesGroup, WorkloadMatrix,
};
use std::collections::BTreeMap;

/// A placement policy scores a hypothetical node workload map; lower is
/// better. The greedy loop breaks score ties by node name, so policies
/// only rank.
pub trait PlacementPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Aggregate score per metric for the given node workloads.
    fn score_by_metric(&self, nodes: &WorkloadMatrix) -> BTreeMap<MetricKind, f64>;

    /// Total score; the quantity the search minimizes.
    fn score(&self, nodes: &WorkloadMatrix) -> f64 {
        self.score_by_metric(nodes).values().sum()
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Number of randomized pod visiting orders to try.
    pub search_orders: usize,
    /// Fixed seed for the order shuffles; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            search_orders: 50,
            seed: None,
        }
    }
}

/// Result of scheduling one batch.
#[derive(Debug, Clone)]
pub struct Placement {
    pub decisions: Vec<PlacementDecision>,
    /// Node workloads with every placed pod's series committed.
    pub node_workloads: WorkloadMatrix,
    pub scores: ScoreSnapshot,
}

/// Greedy, search-based pod scheduler parameterized by a placement
/// policy.
pub struct Scheduler {
    policy: Box<dyn PlacementPolicy>,
    config: ScheduleConfig,
}

impl Scheduler {
    pub fn new(policy: Box<dyn PlacementPolicy>, config: ScheduleConfig) -> Self {
        Self { policy, config }
    }

    /// Place `pods` onto the nodes of `nodes`, given each node's
    /// predicted workload.
    pub fn schedule(
        &self,
        pods: &[PodWorkload],
        nodes: &WorkloadMatrix,
        decision_time: i64,
    ) -> Result<Placement, EngineError> {
        if pods.is_empty() {
            return Err(EngineError::EmptyBatch("no pod predictions"));
        }
        if nodes.is_empty() {
            return Err(EngineError::EmptyBatch("no node predictions"));
        }

        let before = self.policy.score_by_metric(nodes);
        let vacated = vacate(pods, nodes);

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let base_order: Vec<usize> = (0..pods.len()).collect();

        let mut best: Option<(Vec<String>, WorkloadMatrix, f64)> = None;
        for trial in 0..self.config.search_orders.max(1) {
            let order = if trial == 0 {
                base_order.clone()
            } else {
                let mut shuffled = base_order.clone();
                shuffled.shuffle(&mut rng);
                shuffled
            };
            let candidate = self.place_in_order(&order, pods, &vacated);
            if best.as_ref().map_or(true, |(_, _, score)| candidate.2 < *score) {
                best = Some(candidate);
            }
        }

        let (assignments, node_workloads, score) = best.expect("at least one trial ran");
        debug!(
            policy = self.policy.name(),
            pods = pods.len(),
            score,
            "placement search finished"
        );

        let after = self.policy.score_by_metric(&node_workloads);
        let decisions = pods
            .iter()
            .zip(assignments)
            .map(|(pod, node)| PlacementDecision {
                pod: pod.id.clone(),
                node,
                time: decision_time,
            })
            .collect();

        Ok(Placement {
            decisions,
            node_workloads,
            scores: ScoreSnapshot { before, after },
        })
    }

    /// One greedy pass: visit pods in `order`, commit each to the node
    /// minimizing the score given all placements committed so far.
    fn place_in_order(
        &self,
        order: &[usize],
        pods: &[PodWorkload],
        vacated: &WorkloadMatrix,
    ) -> (Vec<String>, WorkloadMatrix, f64) {
        let mut workloads = vacated.clone();
        let mut assignments = vec![String::new(); pods.len()];

        for &pod_index in order {
            let pod = &pods[pod_index];
            let mut chosen: Option<(String, WorkloadMatrix, f64)> = None;
            // BTreeMap iteration is ordered by node name; the strict
            // comparison keeps the first (smallest-named) node on a tie.
            for node_name in workloads.keys().cloned().collect::<Vec<_>>() {
                let candidate = add_pod(&workloads, &node_name, &pod.series);
                let score = self.policy.score(&candidate);
                if chosen.as_ref().map_or(true, |(_, _, s)| score < *s) {
                    chosen = Some((node_name, candidate, score));
                }
            }
            let (node_name, committed, _) = chosen.expect("node set checked non-empty");
            workloads = committed;
            assignments[pod_index] = node_name;
        }

        let final_score = self.policy.score(&workloads);
        (assignments, workloads, final_score)
    }
}

/// Subtract every pod's predicted workload from its current node,
/// producing the baseline the greedy pass places onto. Pods whose current
/// node is not part of the node map are placed without a subtraction.
fn vacate(pods: &[PodWorkload], nodes: &WorkloadMatrix) -> WorkloadMatrix {
    let mut out = nodes.clone();
    for pod in pods {
        match out.get_mut(&pod.current_node) {
            Some(group) => subtract_group(group, &pod.series),
            None => {
                debug!(
                    pod = %pod.id,
                    node = %pod.current_node,
                    "current node absent from prediction; skipping vacate subtraction"
                );
            }
        }
    }
    out
}

/// New matrix with `pod` added onto `node`; buckets the node does not
/// carry are ignored, keeping node series aligned.
fn add_pod(nodes: &WorkloadMatrix, node: &str, pod: &SeriesGroup) -> WorkloadMatrix {
    let mut out = nodes.clone();
    if let Some(group) = out.get_mut(node) {
        for (metric, series) in group.iter_mut() {
            if let Some(pod_series) = pod.get(metric) {
                for (bucket, value) in series.iter_mut() {
                    if let Some(add) = pod_series.get(bucket) {
                        *value += add;
                    }
                }
            }
        }
    }
    out
}

fn subtract_group(group: &mut SeriesGroup, pod: &SeriesGroup) {
    for (metric, series) in group.iter_mut() {
        if let Some(pod_series) = pod.get(metric) {
            for (bucket, value) in series.iter_mut() {
                if let Some(sub) = pod_series.get(bucket) {
                    *value -= sub;
                }
            }
        }
    }
}
