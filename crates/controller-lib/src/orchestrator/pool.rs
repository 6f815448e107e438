//! Bounded forecast worker pool
//!
//! Forecasting many independent series is an embarrassingly parallel,
//! CPU-bound batch: each job is a pure function of its own series, so
//! jobs fan out over `spawn_blocking` with a semaphore bounding
//! concurrency. `run` joins the whole batch before returning, so one
//! cycle never overlaps the next.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::EngineError;
use crate::forecast::{Forecast, Forecaster};
use crate::models::{AlignedSeries, MetricKind};

/// One series to forecast.
#[derive(Debug)]
pub struct ForecastJob {
    pub entity: String,
    pub metric: MetricKind,
    pub series: AlignedSeries,
    pub steps: usize,
}

/// Result of one job, successful or not.
#[derive(Debug)]
pub struct ForecastOutcome {
    pub entity: String,
    pub metric: MetricKind,
    pub result: Result<Forecast, EngineError>,
}

pub struct ForecastPool {
    forecaster: Arc<Forecaster>,
    concurrency: usize,
}

impl ForecastPool {
    pub fn new(forecaster: Arc<Forecaster>, concurrency: usize) -> Self {
        Self {
            forecaster,
            concurrency: concurrency.max(1),
        }
    }

    /// Run every job and wait for the whole batch.
    pub async fn run(&self, jobs: Vec<ForecastJob>) -> Vec<ForecastOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();

        for job in jobs {
            let semaphore = semaphore.clone();
            let forecaster = self.forecaster.clone();
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("forecast semaphore closed");
                let ForecastJob {
                    entity,
                    metric,
                    series,
                    steps,
                } = job;
                let handle =
                    tokio::task::spawn_blocking(move || forecaster.forecast(&series, steps));
                let result = match handle.await {
                    Ok(result) => result,
                    Err(err) => Err(EngineError::ModelFit(format!("forecast task failed: {err}"))),
                };
                ForecastOutcome {
                    entity,
                    metric,
                    result,
                }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            if let Ok(outcome) = joined {
                outcomes.push(outcome);
            }
        }
        outcomes
    }
}
