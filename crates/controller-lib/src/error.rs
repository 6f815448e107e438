//! Error taxonomy for the prediction and decision engine
//!
//! Per-unit failures (one entity, one container, one pod) are expected
//! operating conditions: the orchestrator logs them and drops the unit
//! from the cycle. Nothing here aborts a poll loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// An entity's metrics had no common time buckets; the entity is not
    /// predictable this cycle.
    #[error("no common time buckets across metrics for entity {entity:?}")]
    AlignmentGap { entity: String },

    /// A component received fewer samples than its minimum.
    #[error("insufficient samples: need at least {needed}, got {got}")]
    InsufficientSamples { needed: usize, got: usize },

    /// Numerical failure while fitting a forecast model. The forecaster
    /// catches this internally and degrades to the mean fallback.
    #[error("model fit failed: {0}")]
    ModelFit(String),

    /// A raw metric name with no canonical mapping.
    #[error("unknown metric type {0:?}")]
    UnknownMetricType(String),

    /// A resource quantity string that cannot be converted to a number.
    #[error("cannot parse {kind} quantity {value:?}")]
    UnparseableQuantity { kind: &'static str, value: String },

    /// The store answered a query with a non-zero status.
    #[error("query {kind} failed: code={code} message={message:?}")]
    QueryFailure {
        kind: &'static str,
        code: i32,
        message: String,
    },

    /// The store rejected a write with a non-zero status.
    #[error("write {kind} failed: code={code} message={message:?}")]
    WriteFailure {
        kind: &'static str,
        code: i32,
        message: String,
    },

    /// No pod or no node had a usable prediction; scheduling is skipped
    /// for the cycle.
    #[error("scheduling batch empty: {0}")]
    EmptyBatch(&'static str),

    /// A wire payload field that could not be decoded.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Transport-level failure talking to a store backend.
    #[error("store transport error: {0}")]
    Transport(String),
}
