//! Core library for the workload controller
//!
//! This crate provides the prediction-and-decision engine:
//! - Time-series alignment of raw metric samples
//! - Seasonal autoregressive workload forecasting
//! - Resource requests/limits recommendation with init-stage detection
//!   and hysteresis
//! - Variance-minimizing pod placement
//! - The poll-loop orchestration and store interfaces around them

pub mod align;
pub mod error;
pub mod forecast;
pub mod health;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod recommend;
pub mod schedule;
pub mod store;

pub use error::EngineError;
pub use forecast::{Forecast, ForecastConfig, Forecaster};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ControllerMetrics, CycleLogger};
