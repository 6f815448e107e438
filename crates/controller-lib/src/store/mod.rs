//! Abstract store interfaces
//!
//! The engine pulls observed/predicted samples and cluster state through
//! [`MetricQuery`] and pushes predictions and recommendations through
//! [`ResultWrite`]. Retry policy belongs to the backend, not here: a
//! failed call is this cycle's failure and the next cycle tries again.

pub mod file;
pub mod http;
pub mod wire;

use async_trait::async_trait;

use crate::error::EngineError;
use wire::{QueryArgs, QueryResponse, WritePayload};

/// What a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Init-window observed container samples.
    ContainerInit,
    ContainerObserved,
    ContainerPredicted,
    NodeObserved,
    NodePredicted,
    PodList,
    NodeList,
    ContainerRecommendation,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::ContainerInit => "container_init",
            QueryKind::ContainerObserved => "container_observed",
            QueryKind::ContainerPredicted => "container_predicted",
            QueryKind::NodeObserved => "node_observed",
            QueryKind::NodePredicted => "node_predicted",
            QueryKind::PodList => "pod_list",
            QueryKind::NodeList => "node_list",
            QueryKind::ContainerRecommendation => "container_recommendation",
        }
    }
}

/// What a write carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    ContainerPrediction,
    NodePrediction,
    ContainerRecommendation,
    /// Before/after variance score snapshot of a scheduling decision.
    SchedulingScore,
}

impl WriteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteKind::ContainerPrediction => "container_prediction",
            WriteKind::NodePrediction => "node_prediction",
            WriteKind::ContainerRecommendation => "container_recommendation",
            WriteKind::SchedulingScore => "scheduling_score",
        }
    }
}

/// Pull interface against the external metric store.
#[async_trait]
pub trait MetricQuery: Send + Sync {
    async fn get(&self, kind: QueryKind, args: QueryArgs) -> Result<QueryResponse, EngineError>;
}

/// Push interface against the external result store.
#[async_trait]
pub trait ResultWrite: Send + Sync {
    async fn write(&self, kind: WriteKind, payload: WritePayload) -> Result<(), EngineError>;
}

/// Convenience alias: a backend implements both directions.
pub trait Store: MetricQuery + ResultWrite {}

impl<T: MetricQuery + ResultWrite> Store for T {}
