//! Seasonal ARIMA fitting
//!
//! Models are fit by conditional least squares: regular and seasonal
//! differencing first, then a Hannan-Rissanen step where a long
//! autoregression supplies residual estimates so moving-average lags can
//! enter an ordinary least-squares regression alongside the
//! autoregressive and seasonal lags. Candidate orders are ranked by AIC.

use crate::error::EngineError;

/// A (p, d, q)(P, D, Q, s) order combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal_p: usize,
    pub seasonal_d: usize,
    pub seasonal_q: usize,
    pub s: usize,
}

impl ModelOrder {
    /// Largest lag any regressor reaches back.
    fn max_lag(&self) -> usize {
        self.p
            .max(self.q)
            .max(self.seasonal_p * self.s)
            .max(self.seasonal_q * self.s)
    }

    /// Number of regression parameters including the intercept.
    fn param_count(&self) -> usize {
        1 + self.p + self.q + self.seasonal_p + self.seasonal_q
    }

    fn has_ma(&self) -> bool {
        self.q > 0 || self.seasonal_q > 0
    }

    fn has_seasonal(&self) -> bool {
        self.seasonal_p > 0 || self.seasonal_d > 0 || self.seasonal_q > 0
    }
}

/// A fitted model, holding everything needed to extend the series.
#[derive(Debug, Clone)]
pub struct FittedModel {
    order: ModelOrder,
    /// Intercept, then AR, MA, seasonal-AR, seasonal-MA coefficients.
    coeffs: Vec<f64>,
    pub aic: f64,
    /// Fully differenced series the regression was run on.
    w: Vec<f64>,
    /// Residuals aligned with `w`; MA lags read from here.
    resid: Vec<f64>,
    /// Series history before each regular differencing step.
    reg_levels: Vec<Vec<f64>>,
    /// Series history before each seasonal differencing step.
    sea_levels: Vec<Vec<f64>>,
}

/// Fit `order` to `values` by conditional least squares.
pub fn fit(values: &[f64], order: ModelOrder) -> Result<FittedModel, EngineError> {
    if order.has_seasonal() && order.s < 2 {
        return Err(EngineError::ModelFit(
            "seasonal period shorter than 2 buckets".to_string(),
        ));
    }

    let mut reg_levels = Vec::with_capacity(order.d);
    let mut current = values.to_vec();
    for _ in 0..order.d {
        if current.len() < 2 {
            return Err(EngineError::ModelFit("series exhausted by differencing".to_string()));
        }
        reg_levels.push(current.clone());
        current = difference(&current, 1);
    }
    let mut sea_levels = Vec::with_capacity(order.seasonal_d);
    for _ in 0..order.seasonal_d {
        if current.len() <= order.s {
            return Err(EngineError::ModelFit(
                "series exhausted by seasonal differencing".to_string(),
            ));
        }
        sea_levels.push(current.clone());
        current = difference(&current, order.s);
    }
    let w = current;

    let k = order.param_count();
    let (mut resid, long_order) = if order.has_ma() {
        long_ar_residuals(&w)?
    } else {
        (vec![0.0; w.len()], 0)
    };

    let start = order.max_lag().max(long_order);
    if w.len() < start + k + 1 {
        return Err(EngineError::ModelFit(format!(
            "{} differenced samples cannot support {} parameters",
            w.len(),
            k
        )));
    }

    let rows = w.len() - start;
    let mut x = Vec::with_capacity(rows);
    let mut y = Vec::with_capacity(rows);
    for t in start..w.len() {
        x.push(regressor_row(&w, &resid, t, &order));
        y.push(w[t]);
    }

    let coeffs = solve_normal_equations(&x, &y)?;

    // Residual sum of squares under the fitted coefficients; also refresh
    // the residual estimates the forecast recursion will read from.
    let mut rss = 0.0;
    for (i, t) in (start..w.len()).enumerate() {
        let fitted: f64 = x[i].iter().zip(&coeffs).map(|(a, b)| a * b).sum();
        let e = y[i] - fitted;
        resid[t] = e;
        rss += e * e;
    }

    let sigma2 = rss / rows as f64;
    if !sigma2.is_finite() || sigma2 <= 1e-12 {
        return Err(EngineError::ModelFit(
            "zero residual variance; series is degenerate".to_string(),
        ));
    }
    let aic = rows as f64 * sigma2.ln() + 2.0 * (k as f64 + 1.0);

    Ok(FittedModel {
        order,
        coeffs,
        aic,
        w,
        resid,
        reg_levels,
        sea_levels,
    })
}

impl FittedModel {
    /// Extend the series `steps` buckets into the future, assuming future
    /// shocks of zero, then undo the differencing to return level values.
    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        let o = &self.order;
        let mut w = self.w.clone();
        let mut e = self.resid.clone();

        for _ in 0..steps {
            let t = w.len();
            let mut idx = 0;
            let mut value = self.coeffs[idx];
            idx += 1;
            for i in 1..=o.p {
                value += self.coeffs[idx] * w[t - i];
                idx += 1;
            }
            for i in 1..=o.q {
                value += self.coeffs[idx] * e[t - i];
                idx += 1;
            }
            for i in 1..=o.seasonal_p {
                value += self.coeffs[idx] * w[t - i * o.s];
                idx += 1;
            }
            for i in 1..=o.seasonal_q {
                value += self.coeffs[idx] * e[t - i * o.s];
                idx += 1;
            }
            w.push(value);
            e.push(0.0);
        }

        let mut forecast: Vec<f64> = w[self.w.len()..].to_vec();
        for level in self.sea_levels.iter().rev() {
            forecast = integrate(level, &forecast, self.order.s);
        }
        for level in self.reg_levels.iter().rev() {
            forecast = integrate(level, &forecast, 1);
        }
        forecast
    }
}

fn regressor_row(w: &[f64], resid: &[f64], t: usize, order: &ModelOrder) -> Vec<f64> {
    let mut row = Vec::with_capacity(order.param_count());
    row.push(1.0);
    for i in 1..=order.p {
        row.push(w[t - i]);
    }
    for i in 1..=order.q {
        row.push(resid[t - i]);
    }
    for i in 1..=order.seasonal_p {
        row.push(w[t - i * order.s]);
    }
    for i in 1..=order.seasonal_q {
        row.push(resid[t - i * order.s]);
    }
    row
}

fn difference(values: &[f64], lag: usize) -> Vec<f64> {
    values
        .iter()
        .skip(lag)
        .zip(values.iter())
        .map(|(a, b)| a - b)
        .collect()
}

/// Undo one differencing step: each forecast difference is added to the
/// value `lag` positions back in the reconstructed series.
fn integrate(history: &[f64], diffs: &[f64], lag: usize) -> Vec<f64> {
    let mut extended = history.to_vec();
    for d in diffs {
        let base = extended[extended.len() - lag];
        extended.push(base + d);
    }
    extended[history.len()..].to_vec()
}

/// First Hannan-Rissanen stage: fit a long autoregression and return its
/// residuals as shock estimates, together with the AR order used.
fn long_ar_residuals(w: &[f64]) -> Result<(Vec<f64>, usize), EngineError> {
    let n = w.len();
    let m = (n / 3).clamp(1, 12);
    if n < m + 3 {
        return Ok((vec![0.0; n], 0));
    }

    let mut x = Vec::with_capacity(n - m);
    let mut y = Vec::with_capacity(n - m);
    for t in m..n {
        let mut row = Vec::with_capacity(m + 1);
        row.push(1.0);
        for i in 1..=m {
            row.push(w[t - i]);
        }
        x.push(row);
        y.push(w[t]);
    }
    let coeffs = solve_normal_equations(&x, &y)?;

    let mut resid = vec![0.0; n];
    for (i, t) in (m..n).enumerate() {
        let fitted: f64 = x[i].iter().zip(&coeffs).map(|(a, b)| a * b).sum();
        resid[t] = y[i] - fitted;
    }
    Ok((resid, m))
}

/// Solve the normal equations of an ordinary least-squares problem with
/// Gaussian elimination and partial pivoting.
fn solve_normal_equations(x: &[Vec<f64>], y: &[f64]) -> Result<Vec<f64>, EngineError> {
    let k = x.first().map(Vec::len).unwrap_or(0);
    if k == 0 || x.len() < k {
        return Err(EngineError::ModelFit(
            "not enough rows for the normal equations".to_string(),
        ));
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, &target) in x.iter().zip(y) {
        for i in 0..k {
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
            xty[i] += row[i] * target;
        }
    }

    // Forward elimination with partial pivoting.
    for col in 0..k {
        let pivot_row = (col..k)
            .max_by(|&a, &b| {
                xtx[a][col]
                    .abs()
                    .partial_cmp(&xtx[b][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if xtx[pivot_row][col].abs() < 1e-10 {
            return Err(EngineError::ModelFit("singular normal equations".to_string()));
        }
        xtx.swap(col, pivot_row);
        xty.swap(col, pivot_row);

        for row in (col + 1)..k {
            let factor = xtx[row][col] / xtx[col][col];
            for j in col..k {
                xtx[row][j] -= factor * xtx[col][j];
            }
            xty[row] -= factor * xty[col];
        }
    }

    // Back substitution.
    let mut coeffs = vec![0.0; k];
    for col in (0..k).rev() {
        let mut value = xty[col];
        for j in (col + 1)..k {
            value -= xtx[col][j] * coeffs[j];
        }
        coeffs[col] = value / xtx[col][col];
    }

    if coeffs.iter().any(|c| !c.is_finite()) {
        return Err(EngineError::ModelFit("non-finite coefficients".to_string()));
    }
    Ok(coeffs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(p: usize, d: usize, q: usize) -> ModelOrder {
        ModelOrder {
            p,
            d,
            q,
            seasonal_p: 0,
            seasonal_d: 0,
            seasonal_q: 0,
            s: 4,
        }
    }

    /// A noisy AR(1)-like series; irregular enough that no fit is exact.
    fn noisy_series(n: usize) -> Vec<f64> {
        let mut values = Vec::with_capacity(n);
        let mut level = 5.0;
        for i in 0..n {
            // Deterministic pseudo-noise keeps the test reproducible.
            let noise = ((i * 37 + 11) % 17) as f64 / 17.0 - 0.5;
            level = 0.7 * level + 2.0 + noise;
            values.push(level);
        }
        values
    }

    #[test]
    fn test_difference_and_integrate_round_trip() {
        let values = vec![1.0, 3.0, 6.0, 10.0, 15.0];
        let diffs = difference(&values, 1);
        assert_eq!(diffs, vec![2.0, 3.0, 4.0, 5.0]);

        let restored = integrate(&values[..1].to_vec(), &diffs, 1);
        assert_eq!(restored, values[1..].to_vec());
    }

    #[test]
    fn test_seasonal_difference() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 2.0, 3.0, 4.0, 5.0];
        let diffs = difference(&values, 4);
        assert_eq!(diffs, vec![1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_solve_normal_equations_recovers_line() {
        // y = 2 + 3x over scattered points.
        let x: Vec<Vec<f64>> = vec![
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![1.0, 2.0],
            vec![1.0, 5.0],
        ];
        let y = vec![2.0, 5.0, 8.0, 17.0];
        let coeffs = solve_normal_equations(&x, &y).unwrap();
        assert!((coeffs[0] - 2.0).abs() < 1e-9);
        assert!((coeffs[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_solve_normal_equations_rejects_collinear_columns() {
        let x: Vec<Vec<f64>> = vec![
            vec![1.0, 2.0, 4.0],
            vec![1.0, 3.0, 6.0],
            vec![1.0, 4.0, 8.0],
            vec![1.0, 5.0, 10.0],
        ];
        let y = vec![1.0, 2.0, 3.0, 4.0];
        assert!(solve_normal_equations(&x, &y).is_err());
    }

    #[test]
    fn test_fit_rejects_constant_series() {
        let err = fit(&[4.0; 24], order(1, 0, 0)).unwrap_err();
        assert!(matches!(err, EngineError::ModelFit(_)));
    }

    #[test]
    fn test_fit_and_forecast_produces_finite_values() {
        let values = noisy_series(48);
        let model = fit(&values, order(1, 0, 1)).unwrap();
        assert!(model.aic.is_finite());

        let forecast = model.forecast(6);
        assert_eq!(forecast.len(), 6);
        assert!(forecast.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_fit_with_differencing_tracks_trend() {
        // Linear growth plus pseudo-noise; first-order differencing makes
        // the series stationary.
        let values: Vec<f64> = (0..48)
            .map(|i| i as f64 * 0.5 + ((i * 29 + 7) % 13) as f64 / 13.0)
            .collect();
        let model = fit(&values, order(1, 1, 0)).unwrap();
        let forecast = model.forecast(4);
        assert_eq!(forecast.len(), 4);
        // The continuation should keep growing past the last observation.
        assert!(forecast[3] > values[40]);
    }

    #[test]
    fn test_fit_insufficient_rows_for_order() {
        let values = noisy_series(8);
        let high = ModelOrder {
            p: 2,
            d: 0,
            q: 1,
            seasonal_p: 1,
            seasonal_d: 0,
            seasonal_q: 1,
            s: 4,
        };
        assert!(fit(&values, high).is_err());
    }
}
