//! HTTP JSON store backend
//!
//! Thin client for a remote metric/result store: queries POST their
//! arguments to `/query/{kind}`, writes POST their payload to
//! `/write/{kind}`. A non-zero status code in an otherwise successful
//! response is a query or write failure.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{MetricQuery, QueryKind, ResultWrite, WriteKind};
use crate::error::EngineError;
use crate::store::wire::{QueryArgs, QueryResponse, Status, WritePayload};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct WriteAck {
    #[serde(default)]
    status: Status,
}

impl HttpStore {
    pub fn new(base_url: &str) -> Result<Self, EngineError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| EngineError::Transport(format!("build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json(&self, path: &str, body: &impl serde::Serialize) -> Result<String, EngineError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| EngineError::Transport(format!("POST {url}: {err}")))?;

        let http_status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| EngineError::Transport(format!("read body of {url}: {err}")))?;
        if !http_status.is_success() {
            return Err(EngineError::Transport(format!(
                "POST {url}: http status {http_status}"
            )));
        }
        Ok(text)
    }
}

#[async_trait]
impl MetricQuery for HttpStore {
    async fn get(&self, kind: QueryKind, args: QueryArgs) -> Result<QueryResponse, EngineError> {
        let body = self
            .post_json(&format!("query/{}", kind.as_str()), &args)
            .await?;
        let response: QueryResponse = serde_json::from_str(&body)
            .map_err(|err| EngineError::Malformed(format!("query {} response: {err}", kind.as_str())))?;
        if response.status.code != 0 {
            return Err(EngineError::QueryFailure {
                kind: kind.as_str(),
                code: response.status.code,
                message: response.status.message.clone(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ResultWrite for HttpStore {
    async fn write(&self, kind: WriteKind, payload: WritePayload) -> Result<(), EngineError> {
        let body = self
            .post_json(&format!("write/{}", kind.as_str()), &payload)
            .await?;
        // An empty body counts as acknowledged; otherwise the status code
        // decides.
        let ack: WriteAck = if body.trim().is_empty() {
            WriteAck::default()
        } else {
            serde_json::from_str(&body).map_err(|err| {
                EngineError::Malformed(format!("write {} response: {err}", kind.as_str()))
            })?
        };
        if ack.status.code != 0 {
            return Err(EngineError::WriteFailure {
                kind: kind.as_str(),
                code: ack.status.code,
                message: ack.status.message,
            });
        }
        Ok(())
    }
}
