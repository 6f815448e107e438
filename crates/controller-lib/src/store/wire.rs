//! Wire payloads and codecs
//!
//! The store speaks in nested entity payloads whose samples carry
//! ISO-8601 UTC timestamps and decimal-string values. Conversion to and
//! from the internal bucketed model happens here, per entity: one
//! malformed entity is skipped with a log line and never aborts a batch.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::align::EntitySamples;
use crate::error::EngineError;
use crate::models::{
    ContainerSpec, MetricKind, PodId, PodSpec, RawSample, ResourceSpec, ScoreSnapshot,
    WorkloadMatrix,
};

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parse an ISO-8601 UTC string into epoch seconds.
pub fn iso_to_epoch(value: &str) -> Result<i64, EngineError> {
    NaiveDateTime::parse_from_str(value, TIME_FORMAT)
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|err| EngineError::Malformed(format!("bad timestamp {value:?}: {err}")))
}

/// Format epoch seconds as an ISO-8601 UTC string.
pub fn epoch_to_iso(epoch: i64) -> String {
    DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string())
}

/// Response/request status; code 0 is success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            code: 0,
            message: String::new(),
        }
    }
}

/// One sample on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointPayload {
    pub time: String,
    pub num_value: String,
}

/// Sample array for one metric of one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPayload {
    pub metric_type: String,
    #[serde(default)]
    pub data: Vec<PointPayload>,
}

/// One entity (container or node) with its per-metric samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityPayload {
    pub name: String,
    #[serde(default)]
    pub metrics: Vec<MetricPayload>,
    /// Set on node predictions that reflect a committed placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_scheduled: Option<bool>,
}

/// Pod entry of a pod-list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodPayload {
    pub namespace: String,
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

/// Node entry of a node-list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePayload {
    pub name: String,
}

/// Recommendation state of one container, as stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerRecommendationPayload {
    pub name: String,
    #[serde(default)]
    pub requests: Vec<MetricPayload>,
    #[serde(default)]
    pub limits: Vec<MetricPayload>,
    #[serde(default)]
    pub initial_requests: Vec<MetricPayload>,
    #[serde(default)]
    pub initial_limits: Vec<MetricPayload>,
}

/// Recommendation record for one pod.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodRecommendationPayload {
    pub namespace: String,
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub target_nodes: Vec<String>,
    #[serde(default)]
    pub containers: Vec<ContainerRecommendationPayload>,
}

/// Score snapshot record of one scheduling decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorePayload {
    pub metric_type: String,
    pub before: String,
    pub after: String,
    pub time: String,
}

/// Query arguments; which fields matter depends on the query kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

impl QueryArgs {
    pub fn for_pod(pod: &PodId, time_range: TimeRange) -> Self {
        Self {
            namespace: Some(pod.namespace.clone()),
            pod_name: Some(pod.name.clone()),
            time_range: Some(time_range),
            ..Self::default()
        }
    }

    pub fn for_nodes(node_names: Vec<String>, time_range: TimeRange) -> Self {
        Self {
            node_names,
            time_range: Some(time_range),
            ..Self::default()
        }
    }
}

/// Closed time range with a step, all as the store expects them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_time: String,
    pub end_time: String,
    pub step: String,
}

impl TimeRange {
    /// Build a range from one anchor and a duration. The missing end is
    /// derived from the anchor; passing neither anchor is a caller bug
    /// surfaced as an error.
    pub fn bounded(
        start: Option<i64>,
        end: Option<i64>,
        duration_sec: i64,
        step_sec: i64,
    ) -> Result<Self, EngineError> {
        let (start, end) = match (start, end) {
            (Some(s), Some(e)) => (s, e),
            (Some(s), None) => (s, s + duration_sec),
            (None, Some(e)) => (e - duration_sec, e),
            (None, None) => {
                return Err(EngineError::Malformed(
                    "time range needs a start or an end".to_string(),
                ))
            }
        };
        Ok(Self {
            start_time: epoch_to_iso(start),
            end_time: epoch_to_iso(end),
            step: format!("{step_sec}s"),
        })
    }
}

/// Every query answer; sections irrelevant to the query kind stay empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub entities: Vec<EntityPayload>,
    #[serde(default)]
    pub pods: Vec<PodPayload>,
    #[serde(default)]
    pub nodes: Vec<NodePayload>,
    #[serde(default)]
    pub recommendations: Vec<PodRecommendationPayload>,
}

/// Reference to the pod a container-level write belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

/// Every write body; sections irrelevant to the write kind stay empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WritePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<PodRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<EntityPayload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<PodRecommendationPayload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scores: Vec<ScorePayload>,
}

/// Resolve a raw metric name through the configured mapping, falling back
/// to the canonical names.
pub fn resolve_metric(
    raw: &str,
    metric_types: &HashMap<String, MetricKind>,
) -> Result<MetricKind, EngineError> {
    if let Some(kind) = metric_types.get(raw) {
        return Ok(*kind);
    }
    MetricKind::from_str(raw)
}

/// Decode entity payloads into raw sample batches. A malformed entity is
/// logged and dropped; the rest of the batch survives.
pub fn decode_entities(
    entities: &[EntityPayload],
    metric_types: &HashMap<String, MetricKind>,
) -> Vec<EntitySamples> {
    let mut out = Vec::with_capacity(entities.len());
    for entity in entities {
        match decode_entity(entity, metric_types) {
            Ok(samples) => out.push(samples),
            Err(err) => {
                warn!(entity = %entity.name, error = %err, "entity payload skipped");
            }
        }
    }
    out
}

fn decode_entity(
    entity: &EntityPayload,
    metric_types: &HashMap<String, MetricKind>,
) -> Result<EntitySamples, EngineError> {
    let mut metrics = Vec::with_capacity(entity.metrics.len());
    for metric in &entity.metrics {
        let kind = resolve_metric(&metric.metric_type, metric_types)?;
        let mut samples = Vec::with_capacity(metric.data.len());
        for point in &metric.data {
            samples.push(decode_point(point)?);
        }
        metrics.push((kind, samples));
    }
    Ok(EntitySamples {
        name: entity.name.clone(),
        metrics,
    })
}

fn decode_point(point: &PointPayload) -> Result<RawSample, EngineError> {
    let time = iso_to_epoch(&point.time)?;
    let value = point
        .num_value
        .parse::<f64>()
        .map_err(|err| EngineError::Malformed(format!("bad value {:?}: {err}", point.num_value)))?;
    Ok(RawSample { time, value })
}

/// Decode pod-list payloads into pod specs.
pub fn decode_pods(pods: &[PodPayload]) -> Vec<PodSpec> {
    let mut out = Vec::with_capacity(pods.len());
    for pod in pods {
        let start_time = match iso_to_epoch(&pod.start_time) {
            Ok(t) => t,
            Err(err) => {
                warn!(pod = %pod.name, error = %err, "pod entry skipped");
                continue;
            }
        };
        out.push(PodSpec {
            id: PodId {
                namespace: pod.namespace.clone(),
                uid: pod.uid.clone(),
                name: pod.name.clone(),
            },
            node_name: pod.node_name.clone(),
            start_time,
            containers: pod.containers.clone(),
        });
    }
    out
}

/// Encode a workload matrix (observed or predicted) into entity payloads.
pub fn encode_matrix(
    matrix: &WorkloadMatrix,
    granularity_sec: i64,
    is_scheduled: Option<bool>,
) -> Vec<EntityPayload> {
    matrix
        .iter()
        .map(|(name, group)| EntityPayload {
            name: name.clone(),
            metrics: group
                .iter()
                .map(|(metric, series)| MetricPayload {
                    metric_type: metric.to_string(),
                    data: series
                        .iter()
                        .map(|(bucket, value)| PointPayload {
                            time: epoch_to_iso(bucket * granularity_sec),
                            num_value: value.to_string(),
                        })
                        .collect(),
                })
                .collect(),
            is_scheduled,
        })
        .collect()
}

/// Encode one resource spec side (requests or limits) as metric payloads.
fn encode_spec_side(
    side: &std::collections::BTreeMap<MetricKind, f64>,
    time: i64,
    granularity_sec: i64,
) -> Vec<MetricPayload> {
    side.iter()
        .map(|(metric, value)| MetricPayload {
            metric_type: metric.to_string(),
            data: vec![PointPayload {
                time: epoch_to_iso(time * granularity_sec),
                num_value: value.to_string(),
            }],
        })
        .collect()
}

/// Encode a container's recommendation, with its initial-stage spec when
/// one exists.
pub fn encode_recommendation(
    container: &str,
    spec: &ResourceSpec,
    init: Option<&ResourceSpec>,
    granularity_sec: i64,
) -> ContainerRecommendationPayload {
    ContainerRecommendationPayload {
        name: container.to_string(),
        requests: encode_spec_side(&spec.requests, spec.time, granularity_sec),
        limits: encode_spec_side(&spec.limits, spec.time, granularity_sec),
        initial_requests: init
            .map(|i| encode_spec_side(&i.requests, i.time, granularity_sec))
            .unwrap_or_default(),
        initial_limits: init
            .map(|i| encode_spec_side(&i.limits, i.time, granularity_sec))
            .unwrap_or_default(),
    }
}

/// Decode one side of a stored recommendation; the latest point of each
/// metric wins.
pub fn decode_spec_side(
    payloads: &[MetricPayload],
) -> Result<std::collections::BTreeMap<MetricKind, f64>, EngineError> {
    let mut out = std::collections::BTreeMap::new();
    for metric in payloads {
        let kind = MetricKind::from_str(&metric.metric_type)?;
        let Some(point) = metric.data.last() else {
            continue;
        };
        let value = point.num_value.parse::<f64>().map_err(|err| {
            EngineError::Malformed(format!("bad value {:?}: {err}", point.num_value))
        })?;
        out.insert(kind, value);
    }
    Ok(out)
}

/// Extract the stored initial-stage specs of a pod's containers.
pub fn decode_initial_specs(
    recommendation: &PodRecommendationPayload,
) -> std::collections::BTreeMap<String, ResourceSpec> {
    let mut out = std::collections::BTreeMap::new();
    for container in &recommendation.containers {
        let requests = decode_spec_side(&container.initial_requests);
        let limits = decode_spec_side(&container.initial_limits);
        match (requests, limits) {
            (Ok(requests), Ok(limits)) if !requests.is_empty() => {
                out.insert(
                    container.name.clone(),
                    ResourceSpec {
                        time: 0,
                        requests,
                        limits,
                    },
                );
            }
            (Err(err), _) | (_, Err(err)) => {
                warn!(container = %container.name, error = %err, "stored initial spec skipped");
            }
            _ => {}
        }
    }
    out
}

/// Encode a scheduling score snapshot.
pub fn encode_scores(scores: &ScoreSnapshot, time: i64) -> Vec<ScorePayload> {
    scores
        .before
        .iter()
        .map(|(metric, before)| ScorePayload {
            metric_type: metric.to_string(),
            before: before.to_string(),
            after: scores
                .after
                .get(metric)
                .copied()
                .unwrap_or_default()
                .to_string(),
            time: epoch_to_iso(time),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlignedSeries;

    #[test]
    fn test_time_round_trip() {
        let iso = "2024-03-01T12:30:00Z";
        let epoch = iso_to_epoch(iso).unwrap();
        assert_eq!(epoch_to_iso(epoch), iso);
    }

    #[test]
    fn test_iso_to_epoch_rejects_garbage() {
        assert!(iso_to_epoch("yesterday").is_err());
        assert!(iso_to_epoch("2024-03-01 12:30:00").is_err());
    }

    #[test]
    fn test_time_range_from_end_anchor() {
        let range = TimeRange::bounded(None, Some(7200), 7200, 30).unwrap();
        assert_eq!(range.start_time, "1970-01-01T00:00:00Z");
        assert_eq!(range.end_time, "1970-01-01T02:00:00Z");
        assert_eq!(range.step, "30s");
    }

    #[test]
    fn test_time_range_requires_an_anchor() {
        assert!(TimeRange::bounded(None, None, 7200, 30).is_err());
    }

    #[test]
    fn test_decode_entities_skips_malformed_entity() {
        let entities = vec![
            EntityPayload {
                name: "bad".to_string(),
                metrics: vec![MetricPayload {
                    metric_type: "cpu".to_string(),
                    data: vec![PointPayload {
                        time: "not-a-time".to_string(),
                        num_value: "1".to_string(),
                    }],
                }],
                is_scheduled: None,
            },
            EntityPayload {
                name: "good".to_string(),
                metrics: vec![MetricPayload {
                    metric_type: "cpu".to_string(),
                    data: vec![PointPayload {
                        time: "1970-01-01T00:00:30Z".to_string(),
                        num_value: "0.25".to_string(),
                    }],
                }],
                is_scheduled: None,
            },
        ];
        let decoded = decode_entities(&entities, &HashMap::new());
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].name, "good");
        assert_eq!(decoded[0].metrics[0].1[0], RawSample { time: 30, value: 0.25 });
    }

    #[test]
    fn test_decode_entities_applies_metric_mapping() {
        let mapping = HashMap::from([("cpu_usage_total".to_string(), MetricKind::Cpu)]);
        let entities = vec![EntityPayload {
            name: "web".to_string(),
            metrics: vec![MetricPayload {
                metric_type: "cpu_usage_total".to_string(),
                data: vec![],
            }],
            is_scheduled: None,
        }];
        let decoded = decode_entities(&entities, &mapping);
        assert_eq!(decoded[0].metrics[0].0, MetricKind::Cpu);
    }

    #[test]
    fn test_encode_matrix_round_trips_through_decode() {
        let mut matrix = WorkloadMatrix::new();
        let mut group = crate::models::SeriesGroup::new();
        group.insert(MetricKind::Cpu, AlignedSeries::from([(1, 0.5), (2, 0.75)]));
        matrix.insert("web".to_string(), group);

        let encoded = encode_matrix(&matrix, 30, None);
        let decoded = decode_entities(&encoded, &HashMap::new());
        assert_eq!(decoded[0].metrics[0].1[0], RawSample { time: 30, value: 0.5 });
        assert_eq!(decoded[0].metrics[0].1[1], RawSample { time: 60, value: 0.75 });
    }

    #[test]
    fn test_recommendation_round_trip() {
        let mut spec = ResourceSpec::new(10);
        spec.set(MetricKind::Cpu, 0.48, 0.72);
        let mut init = ResourceSpec::new(0);
        init.set(MetricKind::Cpu, 0.6, 0.9);

        let payload = encode_recommendation("app", &spec, Some(&init), 30);
        assert_eq!(payload.name, "app");

        let requests = decode_spec_side(&payload.requests).unwrap();
        assert!((requests[&MetricKind::Cpu] - 0.48).abs() < 1e-12);

        let rec = PodRecommendationPayload {
            namespace: "default".to_string(),
            uid: "u".to_string(),
            name: "p".to_string(),
            target_nodes: vec![],
            containers: vec![payload],
        };
        let initial = decode_initial_specs(&rec);
        assert!((initial["app"].requests[&MetricKind::Cpu] - 0.6).abs() < 1e-12);
        assert!((initial["app"].limits[&MetricKind::Cpu] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_decode_pods_skips_bad_start_time() {
        let pods = vec![
            PodPayload {
                namespace: "default".to_string(),
                uid: "u1".to_string(),
                name: "ok".to_string(),
                node_name: "node-a".to_string(),
                start_time: "1970-01-01T00:05:00Z".to_string(),
                containers: vec![],
            },
            PodPayload {
                namespace: "default".to_string(),
                uid: "u2".to_string(),
                name: "broken".to_string(),
                node_name: "node-a".to_string(),
                start_time: "soon".to_string(),
                containers: vec![],
            },
        ];
        let decoded = decode_pods(&pods);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id.name, "ok");
        assert_eq!(decoded[0].start_time, 300);
    }
}
