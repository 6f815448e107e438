//! Workload forecasting
//!
//! Fits a seasonal autoregressive model per aligned series and produces
//! the requested number of future buckets. Seasonality and trend are
//! detected automatically; degenerate data falls back to repeating the
//! historical mean rather than failing the cycle.

pub mod model;
pub mod preprocess;
pub mod seasonal;

use tracing::debug;

use crate::error::EngineError;
use crate::models::AlignedSeries;
use model::ModelOrder;
use preprocess::MinMaxScaler;

/// Tuning knobs for the forecaster. The defaults mirror the behavior the
/// controller was calibrated with; only the grids usually need touching.
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    /// Minimum observations required to attempt a fit.
    pub min_observations: usize,
    /// Seasonality length clamp.
    pub min_seasonality: usize,
    pub max_seasonality: usize,
    /// The series must be at least this many seasons long; otherwise the
    /// detected length shrinks to `n / observation_multiple`.
    pub observation_multiple: usize,
    /// Neighbor window for the autocorrelation peak scan.
    pub acf_neighbor: usize,
    /// Correlation floor below which an autocorrelation peak is noise.
    pub min_peak_correlation: f64,
    /// Most recent samples considered for trend detection.
    pub trend_window: usize,
    /// |Pearson r| above which first-order differencing is enabled.
    pub trend_correlation: f64,
    /// Min-max scaling target range; strictly positive so an all-zero
    /// series cannot destabilize the fit.
    pub scale_range: (f64, f64),
    pub normalize: bool,
    /// Clamp negative predictions to zero (utilization and bytes cannot
    /// go below it).
    pub non_negative: bool,
    /// Candidate non-seasonal AR and MA orders.
    pub ar_grid: Vec<usize>,
    pub ma_grid: Vec<usize>,
    /// Candidate seasonal AR and MA orders.
    pub seasonal_ar_grid: Vec<usize>,
    pub seasonal_ma_grid: Vec<usize>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_observations: 12,
            min_seasonality: 4,
            max_seasonality: 32,
            observation_multiple: 6,
            acf_neighbor: 4,
            min_peak_correlation: 0.1,
            trend_window: 100,
            trend_correlation: 0.4,
            scale_range: (1.0, 10.0),
            normalize: true,
            non_negative: true,
            ar_grid: vec![0, 1, 2],
            ma_grid: vec![0, 1],
            seasonal_ar_grid: vec![0, 1],
            seasonal_ma_grid: vec![0, 1],
        }
    }
}

/// A produced forecast, flagged when the mean fallback was used instead
/// of a fitted model.
#[derive(Debug, Clone)]
pub struct Forecast {
    pub series: AlignedSeries,
    pub mean_fallback: bool,
}

/// Fits one model per series; stateless between calls, so a single
/// instance can be shared across a worker pool.
#[derive(Debug, Clone, Default)]
pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    /// Forecast `steps` future buckets of `series`.
    ///
    /// Returns [`EngineError::InsufficientSamples`] below the minimum
    /// observation count; numerical fit failures degrade to the mean
    /// fallback instead of erroring.
    pub fn forecast(&self, series: &AlignedSeries, steps: usize) -> Result<Forecast, EngineError> {
        let cfg = &self.config;
        let n = series.len();
        if n < cfg.min_observations {
            return Err(EngineError::InsufficientSamples {
                needed: cfg.min_observations,
                got: n,
            });
        }

        let last_bucket = *series.keys().next_back().expect("series checked non-empty");
        let mut values: Vec<f64> = series.values().copied().collect();
        preprocess::impute_mean(&mut values);

        let scaler = cfg
            .normalize
            .then(|| MinMaxScaler::fit(&values, cfg.scale_range));
        let fitted_values = match &scaler {
            Some(scaler) => scaler.transform_all(&values),
            None => values.clone(),
        };

        // Seasonality, shrunk when the series does not cover enough
        // seasons for the seasonal lags to be estimable.
        let (mut season, season_found) = seasonal::detect_seasonality(
            &fitted_values,
            cfg.acf_neighbor,
            cfg.min_peak_correlation,
            cfg.min_seasonality,
            cfg.max_seasonality,
        );
        if n < season * cfg.observation_multiple {
            season = (n / cfg.observation_multiple).max(1);
        }

        let trending = seasonal::detect_trend(&fitted_values, cfg.trend_window, cfg.trend_correlation);
        let d = usize::from(trending);

        let best = self.grid_search(&fitted_values, season, d);
        let (raw_forecast, mean_fallback) = match best {
            Some(model) => {
                let forecast = model.forecast(steps);
                if forecast.iter().all(|v| v.is_finite()) {
                    (forecast, false)
                } else {
                    debug!("fitted model produced non-finite values; using mean fallback");
                    (mean_tile(&fitted_values, steps), true)
                }
            }
            None => {
                debug!(
                    samples = n,
                    season, season_found, "no model order fit the series; using mean fallback"
                );
                (mean_tile(&fitted_values, steps), true)
            }
        };

        let mut out = AlignedSeries::new();
        for (offset, value) in raw_forecast.into_iter().enumerate() {
            let mut value = match &scaler {
                Some(scaler) => scaler.inverse(value),
                None => value,
            };
            if cfg.non_negative && value < 0.0 {
                value = 0.0;
            }
            out.insert(last_bucket + 1 + offset as i64, value);
        }

        Ok(Forecast {
            series: out,
            mean_fallback,
        })
    }

    /// Try every order combination at the detected seasonality and keep
    /// the lowest-AIC fit. `None` when every combination fails.
    fn grid_search(&self, values: &[f64], season: usize, d: usize) -> Option<model::FittedModel> {
        let cfg = &self.config;
        // Seasonal lags collapse onto the non-seasonal ones for tiny
        // periods; drop the seasonal part of the grid instead.
        let seasonal_usable = season >= 2;
        let zero = vec![0];
        let seasonal_ar = if seasonal_usable { &cfg.seasonal_ar_grid } else { &zero };
        let seasonal_ma = if seasonal_usable { &cfg.seasonal_ma_grid } else { &zero };

        let mut best: Option<model::FittedModel> = None;
        for &p in &cfg.ar_grid {
            for &q in &cfg.ma_grid {
                for &seasonal_p in seasonal_ar {
                    for &seasonal_q in seasonal_ma {
                        let order = ModelOrder {
                            p,
                            d,
                            q,
                            seasonal_p,
                            seasonal_d: 0,
                            seasonal_q,
                            s: season,
                        };
                        match model::fit(values, order) {
                            Ok(fitted) => {
                                if best.as_ref().map_or(true, |b| fitted.aic < b.aic) {
                                    best = Some(fitted);
                                }
                            }
                            Err(err) => {
                                debug!(?order, error = %err, "order combination rejected");
                            }
                        }
                    }
                }
            }
        }
        best
    }
}

fn mean_tile(values: &[f64], steps: usize) -> Vec<f64> {
    let mean = values.iter().sum::<f64>() / values.len().max(1) as f64;
    vec![mean; steps]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> AlignedSeries {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (i as i64, *v))
            .collect()
    }

    #[test]
    fn test_forecast_rejects_short_series() {
        let forecaster = Forecaster::default();
        let err = forecaster.forecast(&series(&[1.0; 6]), 3).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientSamples { needed: 12, got: 6 }
        ));
    }

    #[test]
    fn test_forecast_constant_series_falls_back_to_mean() {
        let forecaster = Forecaster::default();
        let forecast = forecaster.forecast(&series(&[3.5; 20]), 5).unwrap();
        assert!(forecast.mean_fallback);
        assert_eq!(forecast.series.len(), 5);
        for value in forecast.series.values() {
            assert!((value - 3.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_forecast_future_buckets_follow_the_series() {
        let values: Vec<f64> = (0..24).map(|i| ((i * 31 + 5) % 11) as f64 + 1.0).collect();
        let forecaster = Forecaster::default();
        let forecast = forecaster.forecast(&series(&values), 4).unwrap();
        let buckets: Vec<i64> = forecast.series.keys().copied().collect();
        assert_eq!(buckets, vec![24, 25, 26, 27]);
    }

    #[test]
    fn test_forecast_values_are_finite_and_non_negative() {
        let values: Vec<f64> = (0..48)
            .map(|i| 2.0 + (i as f64 * std::f64::consts::TAU / 8.0).sin() + ((i * 13 + 3) % 7) as f64 * 0.05)
            .collect();
        let forecaster = Forecaster::default();
        let forecast = forecaster.forecast(&series(&values), 8).unwrap();
        assert_eq!(forecast.series.len(), 8);
        for value in forecast.series.values() {
            assert!(value.is_finite());
            assert!(*value >= 0.0);
        }
    }

    #[test]
    fn test_forecast_imputes_gaps_before_fitting() {
        let mut values: Vec<f64> = (0..24).map(|i| ((i * 17 + 1) % 9) as f64 + 1.0).collect();
        values[5] = f64::NAN;
        let forecaster = Forecaster::default();
        assert!(forecaster.forecast(&series(&values), 3).is_ok());
    }
}
