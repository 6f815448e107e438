//! Series alignment
//!
//! Turns heterogeneous per-metric sample lists into comparable aligned
//! series: timestamps are quantized into buckets of the configured
//! granularity, then every metric of an entity is restricted to the
//! intersection of bucket sets, so all metrics cover the same time domain.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::EngineError;
use crate::models::{AlignedSeries, MetricKind, RawSample, SeriesGroup, WorkloadMatrix};

/// Raw, unaligned samples for one entity.
#[derive(Debug, Clone)]
pub struct EntitySamples {
    pub name: String,
    pub metrics: Vec<(MetricKind, Vec<RawSample>)>,
}

/// Aligns raw per-metric samples into a [`WorkloadMatrix`].
#[derive(Debug, Clone)]
pub struct SeriesAligner {
    granularity_sec: i64,
}

impl SeriesAligner {
    pub fn new(granularity_sec: i64) -> Self {
        Self {
            granularity_sec: granularity_sec.max(1),
        }
    }

    /// Quantize an epoch timestamp into a bucket index.
    pub fn bucket(&self, time: i64) -> i64 {
        time.div_euclid(self.granularity_sec)
    }

    /// Align a batch of entities. An entity whose metrics share no common
    /// bucket is dropped from the result; callers treat a missing entity
    /// as "not predictable this cycle", not as an error.
    pub fn align(&self, entities: Vec<EntitySamples>) -> WorkloadMatrix {
        let mut matrix = WorkloadMatrix::new();
        for entity in entities {
            match self.align_entity(&entity) {
                Ok(group) => {
                    matrix.insert(entity.name, group);
                }
                Err(err) => {
                    debug!(entity = %entity.name, error = %err, "entity skipped during alignment");
                }
            }
        }
        matrix
    }

    fn align_entity(&self, entity: &EntitySamples) -> Result<SeriesGroup, EngineError> {
        if entity.metrics.is_empty() {
            return Err(EngineError::AlignmentGap {
                entity: entity.name.clone(),
            });
        }

        let mut quantized: Vec<(MetricKind, AlignedSeries)> = Vec::with_capacity(entity.metrics.len());
        for (metric, samples) in &entity.metrics {
            let mut series = AlignedSeries::new();
            for sample in samples {
                // A later sample landing in the same bucket overwrites the
                // earlier one.
                series.insert(self.bucket(sample.time), sample.value);
            }
            quantized.push((*metric, series));
        }

        // Intersect bucket sets across all metrics of the entity.
        let mut common: BTreeSet<i64> = quantized[0].1.keys().copied().collect();
        for (_, series) in quantized.iter().skip(1) {
            let keys: BTreeSet<i64> = series.keys().copied().collect();
            common = common.intersection(&keys).copied().collect();
        }
        if common.is_empty() {
            return Err(EngineError::AlignmentGap {
                entity: entity.name.clone(),
            });
        }

        let mut group = SeriesGroup::new();
        for (metric, series) in quantized {
            let restricted: AlignedSeries = series
                .into_iter()
                .filter(|(bucket, _)| common.contains(bucket))
                .collect();
            group.insert(metric, restricted);
        }
        Ok(group)
    }
}

/// Element-wise sum of several series groups over the union of metrics
/// and buckets, absent values reading as zero. A pod's workload is the
/// sum of its containers' workloads.
pub fn sum_groups<'a, I>(groups: I) -> SeriesGroup
where
    I: IntoIterator<Item = &'a SeriesGroup>,
{
    let mut total = SeriesGroup::new();
    for group in groups {
        for (metric, series) in group {
            let entry = total.entry(*metric).or_default();
            for (bucket, value) in series {
                *entry.entry(*bucket).or_insert(0.0) += value;
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(points: &[(i64, f64)]) -> Vec<RawSample> {
        points
            .iter()
            .map(|&(time, value)| RawSample { time, value })
            .collect()
    }

    fn entity(name: &str, metrics: Vec<(MetricKind, Vec<RawSample>)>) -> EntitySamples {
        EntitySamples {
            name: name.to_string(),
            metrics,
        }
    }

    #[test]
    fn test_align_intersects_buckets() {
        let aligner = SeriesAligner::new(30);
        let matrix = aligner.align(vec![entity(
            "web",
            vec![
                (MetricKind::Cpu, samples(&[(0, 0.1), (30, 0.2), (60, 0.3)])),
                (MetricKind::Memory, samples(&[(30, 10.0), (60, 11.0), (90, 12.0)])),
            ],
        )]);

        let group = &matrix["web"];
        let cpu_buckets: Vec<i64> = group[&MetricKind::Cpu].keys().copied().collect();
        let mem_buckets: Vec<i64> = group[&MetricKind::Memory].keys().copied().collect();
        assert_eq!(cpu_buckets, vec![1, 2]);
        assert_eq!(mem_buckets, vec![1, 2]);
        assert_eq!(group[&MetricKind::Cpu][&1], 0.2);
        assert_eq!(group[&MetricKind::Memory][&2], 11.0);
    }

    #[test]
    fn test_align_is_idempotent() {
        let aligner = SeriesAligner::new(30);
        let input = || {
            vec![entity(
                "api",
                vec![
                    (MetricKind::Cpu, samples(&[(0, 0.5), (30, 0.6), (90, 0.7)])),
                    (MetricKind::Memory, samples(&[(0, 1.0), (30, 2.0), (90, 3.0)])),
                ],
            )]
        };
        let first = aligner.align(input());
        let second = aligner.align(input());
        assert_eq!(first, second);
    }

    #[test]
    fn test_align_empty_intersection_drops_entity() {
        let aligner = SeriesAligner::new(1);
        let matrix = aligner.align(vec![entity(
            "batch",
            vec![
                (MetricKind::Cpu, samples(&[(0, 0.1), (1, 0.2), (2, 0.3)])),
                (MetricKind::Memory, samples(&[(3, 1.0), (4, 2.0), (5, 3.0)])),
            ],
        )]);
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_align_one_bad_entity_does_not_abort_batch() {
        let aligner = SeriesAligner::new(1);
        let matrix = aligner.align(vec![
            entity("bad", vec![]),
            entity("good", vec![(MetricKind::Cpu, samples(&[(0, 0.4), (1, 0.5)]))]),
        ]);
        assert!(matrix.contains_key("good"));
        assert!(!matrix.contains_key("bad"));
    }

    #[test]
    fn test_align_same_bucket_keeps_last_sample() {
        let aligner = SeriesAligner::new(30);
        let matrix = aligner.align(vec![entity(
            "web",
            vec![(MetricKind::Cpu, samples(&[(30, 0.1), (45, 0.9)]))],
        )]);
        assert_eq!(matrix["web"][&MetricKind::Cpu][&1], 0.9);
    }

    #[test]
    fn test_sum_groups_unions_buckets_and_metrics() {
        let mut first = SeriesGroup::new();
        first.insert(MetricKind::Cpu, AlignedSeries::from([(0, 0.1), (1, 0.2)]));
        let mut second = SeriesGroup::new();
        second.insert(MetricKind::Cpu, AlignedSeries::from([(1, 0.3), (2, 0.4)]));
        second.insert(MetricKind::Memory, AlignedSeries::from([(0, 5.0)]));

        let total = sum_groups([&first, &second]);
        assert_eq!(total[&MetricKind::Cpu][&0], 0.1);
        assert!((total[&MetricKind::Cpu][&1] - 0.5).abs() < 1e-12);
        assert_eq!(total[&MetricKind::Cpu][&2], 0.4);
        assert_eq!(total[&MetricKind::Memory][&0], 5.0);
    }
}
