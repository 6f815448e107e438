//! Initial-stage detection
//!
//! A container's first minutes of life carry warm-up load that is not
//! representative of steady state. The detector finds the first usage
//! peak and the following valley to delimit that interval.

use crate::error::EngineError;

/// Minimum samples the detector accepts.
pub const MIN_SAMPLE_SIZE: usize = 6;

/// Summary of the detected initial stage of one metric series.
#[derive(Debug, Clone, PartialEq)]
pub struct InitStage {
    /// Mean over the samples up to and including the valley, or over the
    /// whole series when no peak was found.
    pub mean: f64,
    /// Value at the first peak, or the series maximum when no peak was
    /// found.
    pub max: f64,
    pub first_peak_found: bool,
    /// Index of the end of the initial stage; `None` when no peak was
    /// found.
    pub end_index: Option<usize>,
}

/// Scans a time-sorted series for the first peak/valley pair.
#[derive(Debug, Clone)]
pub struct InitStageDetector {
    neighbor_size: usize,
}

impl Default for InitStageDetector {
    fn default() -> Self {
        Self { neighbor_size: 2 }
    }
}

impl InitStageDetector {
    pub fn new(neighbor_size: usize) -> Self {
        Self { neighbor_size }
    }

    /// Detect the initial stage of `data`.
    ///
    /// Position `i` is a peak when its value equals the maximum over
    /// `[i - w, i + w]`; the first valley after the peak is found the same
    /// way with the minimum. When no valley follows the peak, the stage
    /// ends at `min(2 * peak, last)`, pushed to the last index if that
    /// collapses onto the peak itself.
    pub fn detect(&self, data: &[f64]) -> Result<InitStage, EngineError> {
        let n = data.len();
        if n < MIN_SAMPLE_SIZE {
            return Err(EngineError::InsufficientSamples {
                needed: MIN_SAMPLE_SIZE,
                got: n,
            });
        }

        let w = self.neighbor_size;
        let mut peak = None;
        for i in 0..n.saturating_sub(w) {
            let beg = i.saturating_sub(w);
            let end = (i + w + 1).min(n);
            if data[i] == window_max(&data[beg..end]) {
                peak = Some(i);
                break;
            }
        }

        let Some(peak) = peak else {
            // Monotonically increasing data reaches here: no sample
            // dominates its whole neighborhood.
            return Ok(InitStage {
                mean: mean(data),
                max: window_max(data),
                first_peak_found: false,
                end_index: None,
            });
        };

        let mut valley = None;
        for i in (peak + 1)..n.saturating_sub(w) {
            let beg = i.saturating_sub(w).max(peak);
            let end = (i + w + 1).min(n);
            if data[i] == window_min(&data[beg..end]) {
                valley = Some(i);
                break;
            }
        }
        let valley = match valley {
            Some(v) => v,
            None => {
                let fallback = (2 * peak).min(n - 1);
                if fallback == peak {
                    n - 1
                } else {
                    fallback
                }
            }
        };

        Ok(InitStage {
            mean: mean(&data[..=valley]),
            max: data[peak],
            first_peak_found: true,
            end_index: Some(valley),
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn window_max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn window_min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}
