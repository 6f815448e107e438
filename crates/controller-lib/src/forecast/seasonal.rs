//! Seasonality and trend detection
//!
//! Seasonality is read off the autocorrelation function: the first local
//! peak past the neighbor window whose correlation clears a floor gives
//! the period. Trend is the Pearson correlation between sample index and
//! value over the most recent window.

/// Autocorrelation at non-negative lags, normalized so lag 0 is 1.
/// Returns `None` for a zero-variance series.
pub fn autocorrelation(values: &[f64]) -> Option<Vec<f64>> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let centered: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let norm: f64 = centered.iter().map(|y| y * y).sum();
    if norm == 0.0 {
        return None;
    }

    let mut ac = Vec::with_capacity(n);
    for lag in 0..n {
        let mut sum = 0.0;
        for t in 0..(n - lag) {
            sum += centered[t] * centered[t + lag];
        }
        ac.push(sum / norm);
    }
    Some(ac)
}

/// Index of the first local peak of `ac` at offset >= `neighbor` whose
/// correlation exceeds `min_correlation`.
pub fn first_peak(ac: &[f64], neighbor: usize, min_correlation: f64) -> Option<usize> {
    if ac.len() < 2 * neighbor + 1 {
        return None;
    }
    for i in neighbor..(ac.len() - neighbor) {
        let window = &ac[i - neighbor..=i + neighbor];
        let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if ac[i] == max && ac[i] > min_correlation {
            return Some(i);
        }
    }
    None
}

/// Detect the seasonality length of `values`.
///
/// Returns `(length, found)`; when no qualifying autocorrelation peak
/// exists the configured minimum is returned with `found = false`.
pub fn detect_seasonality(
    values: &[f64],
    neighbor: usize,
    min_correlation: f64,
    min_length: usize,
    max_length: usize,
) -> (usize, bool) {
    let peak = autocorrelation(values).and_then(|ac| first_peak(&ac, neighbor, min_correlation));
    match peak {
        Some(index) => ((index + 1).clamp(min_length, max_length), true),
        None => (min_length, false),
    }
}

/// Pearson correlation coefficient of two equal-length slices; 0 when
/// either side has no variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    cov / denom
}

/// True when the most recent `window` samples correlate with their index
/// strongly enough to call the series trending.
pub fn detect_trend(values: &[f64], window: usize, threshold: f64) -> bool {
    let n = values.len();
    let tail = &values[n - window.min(n)..];
    let indices: Vec<f64> = (0..tail.len()).map(|i| i as f64).collect();
    pearson(&indices, tail).abs() > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_autocorrelation_lag_zero_is_one() {
        let values = vec![1.0, 2.0, 3.0, 2.0, 1.0, 2.0, 3.0, 2.0];
        let ac = autocorrelation(&values).unwrap();
        assert!((ac[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_autocorrelation_constant_series_is_none() {
        assert!(autocorrelation(&[3.0; 16]).is_none());
    }

    #[test]
    fn test_detect_seasonality_of_periodic_signal() {
        // Period-8 sinusoid: the first qualifying autocorrelation peak
        // sits at lag 8, giving a detected length of 9.
        let values: Vec<f64> = (0..48)
            .map(|i| (i as f64 * std::f64::consts::TAU / 8.0).sin())
            .collect();
        let (length, found) = detect_seasonality(&values, 4, 0.1, 4, 32);
        assert!(found);
        assert_eq!(length, 9);
    }

    #[test]
    fn test_detect_seasonality_defaults_without_peak() {
        let values: Vec<f64> = (0..24).map(|i| i as f64).collect();
        let (length, found) = detect_seasonality(&values, 4, 0.1, 4, 32);
        assert!(!found);
        assert_eq!(length, 4);
    }

    #[test]
    fn test_pearson_perfect_correlation() {
        let xs = vec![0.0, 1.0, 2.0, 3.0];
        let ys = vec![1.0, 3.0, 5.0, 7.0];
        assert!((pearson(&xs, &ys) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_detect_trend_on_ramp() {
        let values: Vec<f64> = (0..50).map(|i| 0.1 * i as f64).collect();
        assert!(detect_trend(&values, 100, 0.4));
    }

    #[test]
    fn test_detect_trend_on_flat_series() {
        assert!(!detect_trend(&[2.0; 50], 100, 0.4));
    }
}
