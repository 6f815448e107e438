//! File-backed store
//!
//! A directory of JSON documents mirroring the wire shapes. Useful for
//! demos and as the test double behind the store traits. Time-range
//! filtering is the remote store's job; this backend returns whole
//! documents.
//!
//! Layout under the root directory:
//!
//! - `pod_list.json`, `node_list.json`: cluster state (seeded externally)
//! - `container_init/<ns>__<pod>.json`, `container_observed/...`,
//!   `container_predicted/...`: per-pod container samples
//! - `node_observed.json`, `node_predicted.json`: node samples
//! - `container_recommendation/<ns>__<pod>.json`: recommendation records
//! - `scheduling_score.json`: latest score snapshot

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{MetricQuery, QueryKind, ResultWrite, WriteKind};
use crate::error::EngineError;
use crate::store::wire::{QueryArgs, QueryResponse, WritePayload};

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the document a query resolves to.
    pub fn document_path(
        &self,
        kind: QueryKind,
        namespace: Option<&str>,
        pod_name: Option<&str>,
    ) -> PathBuf {
        match kind {
            QueryKind::PodList => self.root.join("pod_list.json"),
            QueryKind::NodeList => self.root.join("node_list.json"),
            QueryKind::NodeObserved => self.root.join("node_observed.json"),
            QueryKind::NodePredicted => self.root.join("node_predicted.json"),
            QueryKind::ContainerInit
            | QueryKind::ContainerObserved
            | QueryKind::ContainerPredicted
            | QueryKind::ContainerRecommendation => {
                let namespace = namespace.unwrap_or("default");
                let pod_name = pod_name.unwrap_or("unknown");
                self.root
                    .join(kind.as_str())
                    .join(format!("{namespace}__{pod_name}.json"))
            }
        }
    }

    async fn read_document(&self, path: &Path) -> Result<QueryResponse, EngineError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                EngineError::Malformed(format!("document {}: {err}", path.display()))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "document absent; returning empty response");
                Ok(QueryResponse::default())
            }
            Err(err) => Err(EngineError::Transport(format!(
                "read {}: {err}",
                path.display()
            ))),
        }
    }

    async fn write_document(
        &self,
        path: &Path,
        document: &QueryResponse,
    ) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| EngineError::Transport(format!("mkdir {}: {err}", parent.display())))?;
        }
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|err| EngineError::Malformed(format!("encode document: {err}")))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|err| EngineError::Transport(format!("write {}: {err}", path.display())))
    }
}

#[async_trait]
impl MetricQuery for FileStore {
    async fn get(&self, kind: QueryKind, args: QueryArgs) -> Result<QueryResponse, EngineError> {
        let path = self.document_path(kind, args.namespace.as_deref(), args.pod_name.as_deref());
        self.read_document(&path).await
    }
}

#[async_trait]
impl ResultWrite for FileStore {
    async fn write(&self, kind: WriteKind, payload: WritePayload) -> Result<(), EngineError> {
        match kind {
            WriteKind::ContainerPrediction => {
                let pod = payload.pod.as_ref().ok_or_else(|| {
                    EngineError::Malformed("container prediction write without pod".to_string())
                })?;
                let path = self.document_path(
                    QueryKind::ContainerPredicted,
                    Some(&pod.namespace),
                    Some(&pod.name),
                );
                let document = QueryResponse {
                    entities: payload.entities,
                    ..QueryResponse::default()
                };
                self.write_document(&path, &document).await
            }
            WriteKind::NodePrediction => {
                let path = self.document_path(QueryKind::NodePredicted, None, None);
                let document = QueryResponse {
                    entities: payload.entities,
                    ..QueryResponse::default()
                };
                self.write_document(&path, &document).await
            }
            WriteKind::ContainerRecommendation => {
                for recommendation in payload.recommendations {
                    let path = self.document_path(
                        QueryKind::ContainerRecommendation,
                        Some(&recommendation.namespace),
                        Some(&recommendation.name),
                    );
                    let document = QueryResponse {
                        recommendations: vec![recommendation],
                        ..QueryResponse::default()
                    };
                    self.write_document(&path, &document).await?;
                }
                Ok(())
            }
            WriteKind::SchedulingScore => {
                let path = self.root.join("scheduling_score.json");
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|err| {
                        EngineError::Transport(format!("mkdir {}: {err}", parent.display()))
                    })?;
                }
                let bytes = serde_json::to_vec_pretty(&payload.scores)
                    .map_err(|err| EngineError::Malformed(format!("encode scores: {err}")))?;
                tokio::fs::write(&path, bytes).await.map_err(|err| {
                    EngineError::Transport(format!("write {}: {err}", path.display()))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::wire::{
        EntityPayload, MetricPayload, PodRecommendationPayload, PodRef, PointPayload,
    };

    fn entity(name: &str) -> EntityPayload {
        EntityPayload {
            name: name.to_string(),
            metrics: vec![MetricPayload {
                metric_type: "cpu".to_string(),
                data: vec![PointPayload {
                    time: "1970-01-01T00:00:30Z".to_string(),
                    num_value: "0.5".to_string(),
                }],
            }],
            is_scheduled: None,
        }
    }

    #[tokio::test]
    async fn test_missing_document_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let response = store
            .get(QueryKind::PodList, QueryArgs::default())
            .await
            .unwrap();
        assert_eq!(response.status.code, 0);
        assert!(response.pods.is_empty());
    }

    #[tokio::test]
    async fn test_container_prediction_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let payload = WritePayload {
            pod: Some(PodRef {
                namespace: "default".to_string(),
                name: "web".to_string(),
            }),
            entities: vec![entity("app")],
            ..WritePayload::default()
        };
        store
            .write(WriteKind::ContainerPrediction, payload)
            .await
            .unwrap();

        let args = QueryArgs {
            namespace: Some("default".to_string()),
            pod_name: Some("web".to_string()),
            ..QueryArgs::default()
        };
        let response = store.get(QueryKind::ContainerPredicted, args).await.unwrap();
        assert_eq!(response.entities.len(), 1);
        assert_eq!(response.entities[0].name, "app");
    }

    #[tokio::test]
    async fn test_container_prediction_requires_pod_ref() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let result = store
            .write(WriteKind::ContainerPrediction, WritePayload::default())
            .await;
        assert!(matches!(result, Err(EngineError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_recommendation_written_per_pod() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let payload = WritePayload {
            recommendations: vec![PodRecommendationPayload {
                namespace: "default".to_string(),
                uid: "u1".to_string(),
                name: "web".to_string(),
                target_nodes: vec!["node-a".to_string()],
                containers: vec![],
            }],
            ..WritePayload::default()
        };
        store
            .write(WriteKind::ContainerRecommendation, payload)
            .await
            .unwrap();

        let args = QueryArgs {
            namespace: Some("default".to_string()),
            pod_name: Some("web".to_string()),
            ..QueryArgs::default()
        };
        let response = store
            .get(QueryKind::ContainerRecommendation, args)
            .await
            .unwrap();
        assert_eq!(response.recommendations.len(), 1);
        assert_eq!(response.recommendations[0].target_nodes, vec!["node-a"]);
    }
}
