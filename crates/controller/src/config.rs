//! Controller configuration
//!
//! Loaded from the environment (prefix `CONTROLLER`) with defaults for
//! every knob, then handed to each component as a plain value object.

use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use controller_lib::forecast::ForecastConfig;
use controller_lib::models::MetricKind;
use controller_lib::orchestrator::OrchestratorConfig;
use controller_lib::recommend::RecommendConfig;
use controller_lib::schedule::{CompactPolicy, PlacementPolicy, ScheduleConfig, StablePolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerSettings {
    /// API server port for health/metrics.
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Base URL of the remote metric/result store.
    #[serde(default = "default_store_endpoint")]
    pub store_endpoint: String,

    /// Directory of the file store backend.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    /// Sleep between cycles of each poll loop, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Observed-window length in seconds.
    #[serde(default = "default_data_amount_sec")]
    pub data_amount_sec: i64,

    /// Init-window length in seconds.
    #[serde(default = "default_data_amount_init_sec")]
    pub data_amount_init_sec: i64,

    /// Time-bucket size in seconds.
    #[serde(default = "default_data_granularity_sec")]
    pub data_granularity_sec: i64,

    /// Future buckets to forecast per series.
    #[serde(default = "default_predict_steps")]
    pub predict_steps: usize,

    /// Concurrent forecast jobs per batch.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Headroom multiplier for init-stage (observed) sizing.
    #[serde(default = "default_tolerance")]
    pub tolerance_observed: f64,

    /// Headroom multiplier for forecast-based sizing.
    #[serde(default = "default_tolerance")]
    pub tolerance_forecast: f64,

    /// Hysteresis threshold for recommendation churn suppression.
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    /// Randomized visiting orders tried by the placement search.
    #[serde(default = "default_search_orders")]
    pub search_orders: usize,

    /// Fixed seed for the placement search; unset seeds from entropy.
    #[serde(default)]
    pub scheduler_seed: Option<u64>,

    /// Placement policy: "stable" or "compact".
    #[serde(default = "default_placement_policy")]
    pub placement_policy: String,

    /// Per-metric weights in the placement score.
    #[serde(default = "default_metric_weight")]
    pub scheduler_cpu_weight: f64,
    #[serde(default = "default_metric_weight")]
    pub scheduler_memory_weight: f64,
}

fn default_api_port() -> u16 {
    8080
}

fn default_store_endpoint() -> String {
    std::env::var("METRIC_STORE_ADDR").unwrap_or_else(|_| "http://metric-store:9090".to_string())
}

fn default_store_dir() -> String {
    "/var/lib/workload-controller".to_string()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_data_amount_sec() -> i64 {
    7200
}

fn default_data_amount_init_sec() -> i64 {
    300
}

fn default_data_granularity_sec() -> i64 {
    30
}

fn default_predict_steps() -> usize {
    240
}

fn default_max_concurrency() -> usize {
    4
}

fn default_tolerance() -> f64 {
    1.2
}

fn default_gamma() -> f64 {
    0.1
}

fn default_search_orders() -> usize {
    50
}

fn default_placement_policy() -> String {
    "stable".to_string()
}

fn default_metric_weight() -> f64 {
    0.5
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            store_endpoint: default_store_endpoint(),
            store_dir: default_store_dir(),
            poll_interval_secs: default_poll_interval(),
            data_amount_sec: default_data_amount_sec(),
            data_amount_init_sec: default_data_amount_init_sec(),
            data_granularity_sec: default_data_granularity_sec(),
            predict_steps: default_predict_steps(),
            max_concurrency: default_max_concurrency(),
            tolerance_observed: default_tolerance(),
            tolerance_forecast: default_tolerance(),
            gamma: default_gamma(),
            search_orders: default_search_orders(),
            scheduler_seed: None,
            placement_policy: default_placement_policy(),
            scheduler_cpu_weight: default_metric_weight(),
            scheduler_memory_weight: default_metric_weight(),
        }
    }
}

impl ControllerSettings {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CONTROLLER"))
            .build()?;
        Ok(config.try_deserialize().unwrap_or_default())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            data_amount_sec: self.data_amount_sec,
            data_amount_init_sec: self.data_amount_init_sec,
            data_granularity_sec: self.data_granularity_sec,
            predict_steps: self.predict_steps,
            max_concurrency: self.max_concurrency,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            ..OrchestratorConfig::default()
        }
    }

    pub fn forecast_config(&self) -> ForecastConfig {
        ForecastConfig::default()
    }

    pub fn recommend_config(&self) -> RecommendConfig {
        RecommendConfig {
            tolerance_observed: self.tolerance_observed,
            tolerance_forecast: self.tolerance_forecast,
            gamma: self.gamma,
        }
    }

    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            search_orders: self.search_orders,
            seed: self.scheduler_seed,
        }
    }

    pub fn weighting(&self) -> BTreeMap<MetricKind, f64> {
        BTreeMap::from([
            (MetricKind::Cpu, self.scheduler_cpu_weight),
            (MetricKind::Memory, self.scheduler_memory_weight),
        ])
    }

    pub fn build_policy(&self) -> Box<dyn PlacementPolicy> {
        match self.placement_policy.as_str() {
            "compact" => Box::new(CompactPolicy::new(self.weighting())),
            _ => Box::new(StablePolicy::new(self.weighting())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = ControllerSettings::default();
        assert_eq!(settings.data_amount_sec, 7200);
        assert_eq!(settings.data_amount_init_sec, 300);
        assert_eq!(settings.data_granularity_sec, 30);
        assert_eq!(settings.predict_steps, 240);
        assert_eq!(settings.search_orders, 50);
        assert!((settings.gamma - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_policy_selection() {
        let mut settings = ControllerSettings::default();
        assert_eq!(settings.build_policy().name(), "stable");
        settings.placement_policy = "compact".to_string();
        assert_eq!(settings.build_policy().name(), "compact");
    }
}
