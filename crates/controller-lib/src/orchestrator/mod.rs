//! Cycle orchestration
//!
//! Drives the three poll loops: container-level prediction, node-level
//! prediction, and the combined recommend+schedule cycle. Every per-pod
//! and per-node operation is wrapped so a single unit's failure is logged
//! and excluded from the cycle; the loops run indefinitely regardless of
//! per-cycle errors.

pub mod pool;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::align::{sum_groups, SeriesAligner};
use crate::error::EngineError;
use crate::forecast::Forecaster;
use crate::health::{components, HealthRegistry};
use crate::models::{MetricKind, PodSpec, PodWorkload, ResourceSpec, WorkloadMatrix};
use crate::observability::{ControllerMetrics, CycleLogger};
use crate::recommend::{quantity, RecommendationEngine};
use crate::schedule::{Placement, Scheduler};
use crate::store::wire::{
    self, PodRecommendationPayload, PodRef, QueryArgs, QueryResponse, TimeRange, WritePayload,
};
use crate::store::{QueryKind, Store, WriteKind};
use pool::{ForecastJob, ForecastPool};

/// Orchestrator-level settings; component tuning lives with the
/// components themselves.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Observed-window length for steady-state data.
    pub data_amount_sec: i64,
    /// Init-window length after pod start.
    pub data_amount_init_sec: i64,
    /// Time-bucket size.
    pub data_granularity_sec: i64,
    /// Future buckets to forecast.
    pub predict_steps: usize,
    /// Concurrent forecast jobs per batch.
    pub max_concurrency: usize,
    /// Sleep between cycles of each loop.
    pub poll_interval: Duration,
    /// Raw metric name -> canonical metric mapping.
    pub metric_types: HashMap<String, MetricKind>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            data_amount_sec: 7200,
            data_amount_init_sec: 300,
            data_granularity_sec: 30,
            predict_steps: 240,
            max_concurrency: 4,
            poll_interval: Duration::from_secs(60),
            metric_types: HashMap::from([
                ("cpu_usage".to_string(), MetricKind::Cpu),
                ("memory_usage".to_string(), MetricKind::Memory),
            ]),
        }
    }
}

/// Outcome counts of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// An accepted per-pod recommendation waiting for the scheduling pass.
struct PodRecommendation {
    pod: PodSpec,
    /// Container-level predicted workload, reused to build the pod-level
    /// series for scheduling.
    predicted: WorkloadMatrix,
    specs: BTreeMap<String, ResourceSpec>,
    init_specs: BTreeMap<String, ResourceSpec>,
}

pub struct PredictionOrchestrator {
    store: Arc<dyn Store>,
    config: OrchestratorConfig,
    aligner: SeriesAligner,
    pool: ForecastPool,
    engine: RecommendationEngine,
    scheduler: Scheduler,
    metrics: ControllerMetrics,
    health: HealthRegistry,
}

impl PredictionOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        config: OrchestratorConfig,
        forecaster: Forecaster,
        engine: RecommendationEngine,
        scheduler: Scheduler,
        health: HealthRegistry,
    ) -> Self {
        let aligner = SeriesAligner::new(config.data_granularity_sec);
        let pool = ForecastPool::new(Arc::new(forecaster), config.max_concurrency);
        Self {
            store,
            config,
            aligner,
            pool,
            engine,
            scheduler,
            metrics: ControllerMetrics::new(),
            health,
        }
    }

    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn horizon_sec(&self) -> i64 {
        self.config.predict_steps as i64 * self.config.data_granularity_sec
    }

    /// Store query with status check, health reporting, and error
    /// accounting in one place.
    async fn query(&self, kind: QueryKind, args: QueryArgs) -> Result<QueryResponse, EngineError> {
        let result = self.store.get(kind, args).await.and_then(|response| {
            if response.status.code != 0 {
                Err(EngineError::QueryFailure {
                    kind: kind.as_str(),
                    code: response.status.code,
                    message: response.status.message.clone(),
                })
            } else {
                Ok(response)
            }
        });
        match &result {
            Ok(_) => self.health.set_healthy(components::STORE).await,
            Err(err) => {
                self.metrics.inc_store_error("query");
                self.health.set_degraded(components::STORE, err.to_string()).await;
            }
        }
        result
    }

    async fn push(&self, kind: WriteKind, payload: WritePayload) -> Result<(), EngineError> {
        let result = self.store.write(kind, payload).await;
        if let Err(err) = &result {
            self.metrics.inc_store_error("write");
            self.health.set_degraded(components::STORE, err.to_string()).await;
        }
        result
    }

    async fn fetch_pods(&self) -> Result<Vec<PodSpec>, EngineError> {
        let response = self.query(QueryKind::PodList, QueryArgs::default()).await?;
        Ok(wire::decode_pods(&response.pods))
    }

    async fn fetch_node_names(&self) -> Result<Vec<String>, EngineError> {
        let response = self.query(QueryKind::NodeList, QueryArgs::default()).await?;
        Ok(response.nodes.into_iter().map(|n| n.name).collect())
    }

    /// Fan the matrix out over the forecast pool; entities whose series
    /// cannot be forecast simply drop out of the result.
    async fn forecast_matrix(&self, observed: &WorkloadMatrix) -> WorkloadMatrix {
        let jobs: Vec<ForecastJob> = observed
            .iter()
            .flat_map(|(entity, group)| {
                group.iter().map(|(metric, series)| ForecastJob {
                    entity: entity.clone(),
                    metric: *metric,
                    series: series.clone(),
                    steps: self.config.predict_steps,
                })
            })
            .collect();

        let outcomes = self.pool.run(jobs).await;

        let mut predicted = WorkloadMatrix::new();
        let mut generated = 0u64;
        let mut fallbacks = 0u64;
        for outcome in outcomes {
            match outcome.result {
                Ok(forecast) => {
                    generated += 1;
                    if forecast.mean_fallback {
                        fallbacks += 1;
                    }
                    predicted
                        .entry(outcome.entity)
                        .or_default()
                        .insert(outcome.metric, forecast.series);
                }
                Err(EngineError::InsufficientSamples { needed, got }) => {
                    debug!(
                        entity = %outcome.entity,
                        metric = %outcome.metric,
                        needed,
                        got,
                        "series below minimum sample count; not forecast"
                    );
                    self.metrics.inc_skipped("insufficient_samples");
                }
                Err(err) => {
                    warn!(
                        entity = %outcome.entity,
                        metric = %outcome.metric,
                        error = %err,
                        "series not forecastable this cycle"
                    );
                    self.metrics.inc_skipped("forecast_error");
                }
            }
        }
        self.metrics.inc_forecasts(generated);
        self.metrics.inc_forecast_fallbacks(fallbacks);
        predicted
    }

    /// One container-level prediction cycle over the pod list.
    pub async fn run_pod_prediction_cycle(&self) -> CycleStats {
        let _timer = self.metrics.cycle_timer("pod_prediction");
        let mut stats = CycleStats::default();

        let pods = match self.fetch_pods().await {
            Ok(pods) => pods,
            Err(err) => {
                warn!(error = %err, "pod list unavailable; skipping cycle");
                return stats;
            }
        };

        for pod in &pods {
            match self.predict_pod(pod).await {
                Ok(true) => stats.processed += 1,
                Ok(false) => {
                    stats.skipped += 1;
                    self.metrics.inc_skipped("not_predictable");
                }
                Err(err) => {
                    stats.failed += 1;
                    warn!(pod = %pod.id, error = %err, "pod prediction failed");
                }
            }
        }

        self.metrics.inc_cycle("pod_prediction");
        CycleLogger::log_cycle("pod_prediction", stats.processed, stats.skipped, stats.failed);
        stats
    }

    async fn predict_pod(&self, pod: &PodSpec) -> Result<bool, EngineError> {
        let range = TimeRange::bounded(
            None,
            Some(self.now()),
            self.config.data_amount_sec,
            self.config.data_granularity_sec,
        )?;
        let response = self
            .query(QueryKind::ContainerObserved, QueryArgs::for_pod(&pod.id, range))
            .await?;

        let entities = wire::decode_entities(&response.entities, &self.config.metric_types);
        let observed = self.aligner.align(entities);
        if observed.is_empty() {
            debug!(pod = %pod.id, "no aligned observed data; not predicted this cycle");
            return Ok(false);
        }

        let predicted = self.forecast_matrix(&observed).await;
        if predicted.is_empty() {
            return Ok(false);
        }

        let payload = WritePayload {
            pod: Some(PodRef {
                namespace: pod.id.namespace.clone(),
                name: pod.id.name.clone(),
            }),
            entities: wire::encode_matrix(&predicted, self.config.data_granularity_sec, None),
            ..WritePayload::default()
        };
        self.push(WriteKind::ContainerPrediction, payload).await?;
        Ok(true)
    }

    /// One node-level prediction cycle over the node list.
    pub async fn run_node_prediction_cycle(&self) -> CycleStats {
        let _timer = self.metrics.cycle_timer("node_prediction");
        let mut stats = CycleStats::default();

        let result: Result<(), EngineError> = async {
            let node_names = self.fetch_node_names().await?;
            if node_names.is_empty() {
                return Ok(());
            }
            let range = TimeRange::bounded(
                None,
                Some(self.now()),
                self.config.data_amount_sec,
                self.config.data_granularity_sec,
            )?;
            let response = self
                .query(QueryKind::NodeObserved, QueryArgs::for_nodes(node_names.clone(), range))
                .await?;

            let observed = self
                .aligner
                .align(wire::decode_entities(&response.entities, &self.config.metric_types));
            let predicted = self.forecast_matrix(&observed).await;
            stats.processed = predicted.len();
            stats.skipped = node_names.len().saturating_sub(predicted.len());
            if predicted.is_empty() {
                return Ok(());
            }

            let payload = WritePayload {
                entities: wire::encode_matrix(&predicted, self.config.data_granularity_sec, None),
                ..WritePayload::default()
            };
            self.push(WriteKind::NodePrediction, payload).await
        }
        .await;

        if let Err(err) = result {
            stats.failed += 1;
            warn!(error = %err, "node prediction cycle failed");
        }

        self.metrics.inc_cycle("node_prediction");
        CycleLogger::log_cycle("node_prediction", stats.processed, stats.skipped, stats.failed);
        stats
    }

    /// One combined recommend+schedule cycle.
    pub async fn run_recommendation_cycle(&self) -> CycleStats {
        let _timer = self.metrics.cycle_timer("recommendation");
        let mut stats = CycleStats::default();

        let pods = match self.fetch_pods().await {
            Ok(pods) => pods,
            Err(err) => {
                warn!(error = %err, "pod list unavailable; skipping cycle");
                return stats;
            }
        };

        let mut accepted = Vec::new();
        for pod in pods {
            match self.recommend_pod(&pod).await {
                Ok(Some(recommendation)) => {
                    stats.processed += 1;
                    self.metrics.inc_recommendation_accepted();
                    accepted.push(recommendation);
                }
                Ok(None) => stats.skipped += 1,
                Err(err) => {
                    stats.failed += 1;
                    warn!(pod = %pod.id, error = %err, "recommendation failed for pod");
                }
            }
        }

        if accepted.is_empty() {
            self.metrics.inc_cycle("recommendation");
            CycleLogger::log_cycle("recommendation", stats.processed, stats.skipped, stats.failed);
            return stats;
        }

        let placement = self.schedule_batch(&accepted).await;
        let decision_time = self.now();

        let recommendations: Vec<PodRecommendationPayload> = accepted
            .iter()
            .map(|rec| {
                let target_nodes = placement
                    .as_ref()
                    .and_then(|p| p.decisions.iter().find(|d| d.pod == rec.pod.id))
                    .map(|d| vec![d.node.clone()])
                    .unwrap_or_default();
                PodRecommendationPayload {
                    namespace: rec.pod.id.namespace.clone(),
                    uid: rec.pod.id.uid.clone(),
                    name: rec.pod.id.name.clone(),
                    target_nodes,
                    containers: rec
                        .specs
                        .iter()
                        .map(|(container, spec)| {
                            wire::encode_recommendation(
                                container,
                                spec,
                                rec.init_specs.get(container),
                                self.config.data_granularity_sec,
                            )
                        })
                        .collect(),
                }
            })
            .collect();

        if let Err(err) = self
            .push(
                WriteKind::ContainerRecommendation,
                WritePayload {
                    recommendations,
                    ..WritePayload::default()
                },
            )
            .await
        {
            warn!(error = %err, "recommendation write failed");
        }

        if let Some(placement) = placement {
            CycleLogger::log_placements(&placement.decisions, &placement.scores);
            self.metrics.inc_placements(placement.decisions.len() as u64);
            self.metrics.set_scheduling_scores(&placement.scores);

            let scheduled = WritePayload {
                entities: wire::encode_matrix(
                    &placement.node_workloads,
                    self.config.data_granularity_sec,
                    Some(true),
                ),
                ..WritePayload::default()
            };
            if let Err(err) = self.push(WriteKind::NodePrediction, scheduled).await {
                warn!(error = %err, "scheduled node workload write failed");
            }

            let scores = WritePayload {
                scores: wire::encode_scores(&placement.scores, decision_time),
                ..WritePayload::default()
            };
            if let Err(err) = self.push(WriteKind::SchedulingScore, scores).await {
                warn!(error = %err, "scheduling score write failed");
            }
        }

        self.metrics.inc_cycle("recommendation");
        CycleLogger::log_cycle("recommendation", stats.processed, stats.skipped, stats.failed);
        stats
    }

    async fn recommend_pod(
        &self,
        pod: &PodSpec,
    ) -> Result<Option<PodRecommendation>, EngineError> {
        let range = TimeRange::bounded(
            Some(self.now()),
            None,
            self.horizon_sec(),
            self.config.data_granularity_sec,
        )?;
        let response = self
            .query(QueryKind::ContainerPredicted, QueryArgs::for_pod(&pod.id, range))
            .await?;
        let predicted = self
            .aligner
            .align(wire::decode_entities(&response.entities, &self.config.metric_types));
        if predicted.is_empty() {
            debug!(pod = %pod.id, "no predicted data; not recommended this cycle");
            return Ok(None);
        }

        let init_specs = self.init_stage_specs(pod).await;

        let mut specs = BTreeMap::new();
        for (container, group) in &predicted {
            let steady = self.engine.steady_spec(group);
            specs.insert(
                container.clone(),
                RecommendationEngine::combine(steady, init_specs.get(container)),
            );
        }

        let applied = self.applied_specs(pod)?;
        let replace = specs
            .iter()
            .any(|(container, spec)| self.engine.should_replace(spec, applied.get(container)));
        if !replace {
            info!(pod = %pod.id, "recommendation suppressed; within gamma of applied resources");
            self.metrics.inc_recommendation_suppressed();
            return Ok(None);
        }

        Ok(Some(PodRecommendation {
            pod: pod.clone(),
            predicted,
            specs,
            init_specs,
        }))
    }

    /// Initial-stage specs: freshly detected over the init window, with
    /// previously stored initial specs filling containers the fresh pass
    /// missed. A stored initial spec survives until superseded.
    async fn init_stage_specs(&self, pod: &PodSpec) -> BTreeMap<String, ResourceSpec> {
        let mut specs = BTreeMap::new();

        let fresh: Result<(), EngineError> = async {
            let range = TimeRange::bounded(
                Some(pod.start_time),
                None,
                self.config.data_amount_init_sec,
                self.config.data_granularity_sec,
            )?;
            let response = self
                .query(QueryKind::ContainerInit, QueryArgs::for_pod(&pod.id, range))
                .await?;
            let observed = self
                .aligner
                .align(wire::decode_entities(&response.entities, &self.config.metric_types));
            for (container, group) in &observed {
                match self.engine.init_stage_spec(group) {
                    Ok(spec) => {
                        specs.insert(container.clone(), spec);
                    }
                    Err(err) => {
                        debug!(pod = %pod.id, container = %container, error = %err, "init-stage sizing skipped");
                    }
                }
            }
            Ok(())
        }
        .await;
        if let Err(err) = fresh {
            debug!(pod = %pod.id, error = %err, "init-window data unavailable");
        }

        let args = QueryArgs {
            namespace: Some(pod.id.namespace.clone()),
            pod_name: Some(pod.id.name.clone()),
            ..QueryArgs::default()
        };
        match self.query(QueryKind::ContainerRecommendation, args).await {
            Ok(response) => {
                for recommendation in &response.recommendations {
                    for (container, spec) in wire::decode_initial_specs(recommendation) {
                        specs.entry(container).or_insert(spec);
                    }
                }
            }
            Err(err) => {
                debug!(pod = %pod.id, error = %err, "stored initial specs unavailable");
            }
        }

        specs
    }

    /// Resource specs currently applied on the cluster, parsed from the
    /// pod's container quantity strings. An unparseable quantity excludes
    /// the whole pod from the cycle.
    fn applied_specs(&self, pod: &PodSpec) -> Result<BTreeMap<String, ResourceSpec>, EngineError> {
        let mut out = BTreeMap::new();
        for container in &pod.containers {
            let mut spec = ResourceSpec::new(0);
            let mut any = false;
            for (metric_name, raw) in &container.requests {
                let metric = wire::resolve_metric(metric_name, &self.config.metric_types)?;
                let requests = quantity::parse_quantity(metric, raw)?;
                let limits = container
                    .limits
                    .get(metric_name)
                    .map(|raw| quantity::parse_quantity(metric, raw))
                    .transpose()?
                    .unwrap_or(requests);
                spec.set(metric, requests, limits);
                any = true;
            }
            if any {
                out.insert(container.name.clone(), spec);
            }
        }
        Ok(out)
    }

    async fn schedule_batch(&self, accepted: &[PodRecommendation]) -> Option<Placement> {
        let node_names = match self.fetch_node_names().await {
            Ok(names) => names,
            Err(err) => {
                warn!(error = %err, "node list unavailable; scheduling skipped");
                return None;
            }
        };

        let range = TimeRange::bounded(
            Some(self.now()),
            None,
            self.horizon_sec(),
            self.config.data_granularity_sec,
        )
        .ok()?;
        let response = match self
            .query(QueryKind::NodePredicted, QueryArgs::for_nodes(node_names, range))
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "node predictions unavailable; scheduling skipped");
                return None;
            }
        };
        let node_matrix = self
            .aligner
            .align(wire::decode_entities(&response.entities, &self.config.metric_types));

        let pod_workloads: Vec<PodWorkload> = accepted
            .iter()
            .map(|rec| PodWorkload {
                id: rec.pod.id.clone(),
                current_node: rec.pod.node_name.clone(),
                series: sum_groups(rec.predicted.values()),
            })
            .collect();

        match self
            .scheduler
            .schedule(&pod_workloads, &node_matrix, self.now())
        {
            Ok(placement) => Some(placement),
            Err(EngineError::EmptyBatch(reason)) => {
                info!(reason, "scheduling skipped this cycle");
                None
            }
            Err(err) => {
                warn!(error = %err, "scheduling failed this cycle");
                None
            }
        }
    }

    /// Container-level prediction loop.
    pub async fn run_pod_prediction_loop(
        self: Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            "Starting pod prediction loop"
        );
        let mut ticker = interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_pod_prediction_cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down pod prediction loop");
                    break;
                }
            }
        }
    }

    /// Node-level prediction loop.
    pub async fn run_node_prediction_loop(
        self: Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            "Starting node prediction loop"
        );
        let mut ticker = interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_node_prediction_cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down node prediction loop");
                    break;
                }
            }
        }
    }

    /// Recommend+schedule loop.
    pub async fn run_recommendation_loop(
        self: Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            "Starting recommendation loop"
        );
        let mut ticker = interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_recommendation_cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down recommendation loop");
                    break;
                }
            }
        }
    }
}
