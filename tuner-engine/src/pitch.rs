//! # Pitch Detection Module
//!
//! A streaming YIN period detector.
//!
//! ## Steps
//! 1. Hann weighting, compensated in the difference function:
//!    `d(lag) = sum_i w[i] w[i + lag] (x[i] - x[i + lag])^2 / sum_i w[i] w[i + lag]`,
//!    which is zero at the true period however much the taper overlaps.
//!    Every term comes from FFT auto- and cross-correlations.
//! 2. Cumulative mean normalized difference (CMNDF), searched over
//!    `[min_lag, max_lag]`
//! 3. Absolute threshold: the first dip below the YIN threshold wins, so the
//!    fundamental is preferred over its sub-harmonics; otherwise the global
//!    minimum is the candidate
//! 4. Candidates that are not periodic enough are rejected
//! 5. Parabolic interpolation for sub-sample accuracy

use rustfft::num_complex::Complex;

use crate::fft::{Correlator, hann_coefficients};

/// Lowest frequency searched, a little under a guitar's low E.
pub const MIN_FREQUENCY_HZ: f32 = 70.0;
/// Highest frequency searched.
pub const MAX_FREQUENCY_HZ: f32 = 1300.0;
/// A candidate is only accepted if its CMNDF is at most
/// `max(REJECT_FLOOR, 2 * threshold)`.
const REJECT_FLOOR: f64 = 0.5;

/// Integer lag bounds for a sample rate, clamped so at least half the window
/// overlaps at the longest lag.
pub fn lag_bounds(sample_rate: u32, window_size: usize) -> (usize, usize) {
    let sr = sample_rate as f32;
    let max_lag = ((sr / MIN_FREQUENCY_HZ) as usize).min(window_size / 2);
    let min_lag = ((sr / MAX_FREQUENCY_HZ) as usize).max(2).min(max_lag.saturating_sub(2));
    (min_lag, max_lag)
}

/// Outcome of the lag search, kept for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YinEstimate {
    pub frequency: f32,
    /// Interpolated lag in samples.
    pub period: f32,
    /// CMNDF value at the chosen integer lag; lower is more periodic.
    pub aperiodicity: f32,
}

/// YIN detector with its Hann window and scratch buffers sized for one
/// window size.
pub struct YinDetector {
    window_size: usize,
    min_lag: usize,
    max_lag: usize,
    correlator: Correlator,
    hann: Vec<f32>,
    hann_spectrum: Vec<Complex<f64>>,
    /// `sum_i w[i] w[i + lag]`, fixed per window size.
    hann_overlap: Vec<f64>,
    weighted: Vec<f32>,
    weighted_power: Vec<f32>,
    autocorr: Vec<f64>,
    power_ahead: Vec<f64>,
    power_behind: Vec<f64>,
    difference: Vec<f64>,
    cmndf: Vec<f64>,
}

impl YinDetector {
    /// Plans the correlations and sizes every buffer.
    ///
    /// # Arguments
    /// * `window_size` - Samples per analysis window
    /// * `sample_rate` - Sample rate in Hz, which fixes the lag range
    pub fn new(window_size: usize, sample_rate: u32) -> Self {
        let (min_lag, max_lag) = lag_bounds(sample_rate, window_size);
        // One lag past the search range so the last lag can be interpolated.
        let lag_count = max_lag + 2;
        let mut correlator = Correlator::new(window_size, max_lag + 1);
        let hann = hann_coefficients(window_size);
        let hann_spectrum = correlator.spectrum(&hann);
        let mut hann_overlap = vec![0.0; lag_count];
        correlator.autocorrelate(&hann, &mut hann_overlap);
        YinDetector {
            window_size,
            min_lag,
            max_lag,
            correlator,
            hann,
            hann_spectrum,
            hann_overlap,
            weighted: vec![0.0; window_size],
            weighted_power: vec![0.0; window_size],
            autocorr: vec![0.0; lag_count],
            power_ahead: vec![0.0; lag_count],
            power_behind: vec![0.0; lag_count],
            difference: vec![0.0; lag_count],
            cmndf: vec![1.0; lag_count],
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn lag_range(&self) -> (usize, usize) {
        (self.min_lag, self.max_lag)
    }

    /// Length of the per-lag scratch arrays.
    pub fn scratch_len(&self) -> usize {
        self.cmndf.len()
    }

    pub fn hann(&self) -> &[f32] {
        &self.hann
    }

    /// The CMNDF computed by the last call to [`detect`](Self::detect),
    /// indexed by lag.
    pub fn cmndf(&self) -> &[f64] {
        &self.cmndf
    }

    /// Estimates the fundamental of one analysis window.
    ///
    /// # Arguments
    /// * `window` - Exactly `window_size` raw samples in [-1, 1]; the Hann
    ///   weighting is applied here
    /// * `sample_rate` - Sample rate in Hz
    /// * `threshold` - YIN absolute threshold in (0, 1)
    ///
    /// # Returns
    /// `None` when nothing periodic enough is found, including for silent or
    /// degenerate input.
    pub fn detect(&mut self, window: &[f32], sample_rate: u32, threshold: f32) -> Option<YinEstimate> {
        if window.len() != self.window_size || self.min_lag + 2 > self.max_lag {
            return None;
        }
        self.difference_function(window);
        if !self.normalize() {
            return None;
        }

        let lag = self.select_lag(threshold as f64)?;
        let aperiodicity = self.cmndf[lag];
        if aperiodicity > REJECT_FLOOR.max(2.0 * threshold as f64) {
            return None;
        }

        let period = lag as f64 + self.parabolic_shift(lag);
        let frequency = (sample_rate as f64 / period) as f32;
        if !(period > 0.0 && frequency.is_finite() && frequency > 0.0) {
            return None;
        }
        Some(YinEstimate {
            frequency,
            period: period as f32,
            aperiodicity: aperiodicity as f32,
        })
    }

    /// Expands the weighted square as
    /// `sum w[i] w[i+lag] x[i]^2 + sum w[i] w[i+lag] x[i+lag]^2 - 2 sum y[i] y[i+lag]`
    /// with `y = w * x`, then divides by the window's own overlap.
    fn difference_function(&mut self, window: &[f32]) {
        for (i, (&x, &w)) in window.iter().zip(&self.hann).enumerate() {
            self.weighted[i] = w * x;
            self.weighted_power[i] = w * x * x;
        }
        self.correlator.autocorrelate(&self.weighted, &mut self.autocorr);
        self.correlator.cross_correlate(
            &self.weighted_power,
            &self.hann_spectrum,
            &mut self.power_ahead,
            &mut self.power_behind,
        );

        self.difference[0] = 0.0;
        for lag in 1..self.difference.len() {
            let overlap = self.hann_overlap[lag];
            let raw = self.power_ahead[lag] + self.power_behind[lag] - 2.0 * self.autocorr[lag];
            // Rounding can push a perfect match slightly negative.
            self.difference[lag] = if overlap > 0.0 { raw.max(0.0) / overlap } else { 0.0 };
        }
    }

    /// Fills the CMNDF. Returns `false` when the window carries no energy.
    ///
    /// The cumulative mean runs from lag 1 so lags just above `min_lag` are
    /// normalised against a full period of the difference function.
    fn normalize(&mut self) -> bool {
        if self.autocorr[0] <= f64::MIN_POSITIVE {
            return false;
        }
        self.cmndf[0] = 1.0;
        let mut running_sum = 0.0;
        for lag in 1..self.cmndf.len() {
            running_sum += self.difference[lag];
            self.cmndf[lag] = if running_sum > 0.0 {
                self.difference[lag] * lag as f64 / running_sum
            } else {
                1.0
            };
        }
        true
    }

    /// Single ascending scan over `[min_lag, max_lag]` keeping both the first
    /// dip under the threshold and the running global minimum.
    fn select_lag(&self, threshold: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        let mut lag = self.min_lag;
        while lag <= self.max_lag {
            let value = self.cmndf[lag];
            if value < threshold {
                // Ride the dip down to its bottom before accepting it.
                while lag < self.max_lag && self.cmndf[lag + 1] < self.cmndf[lag] {
                    lag += 1;
                }
                return Some(lag);
            }
            if best.is_none_or(|(_, v)| value < v) {
                best = Some((lag, value));
            }
            lag += 1;
        }
        best.map(|(lag, _)| lag)
    }

    fn parabolic_shift(&self, lag: usize) -> f64 {
        parabolic_shift(self.cmndf[lag - 1], self.cmndf[lag], self.cmndf[lag + 1])
    }
}

/// Vertex offset of the parabola through three equally spaced samples.
/// A flat or degenerate neighbourhood yields no shift.
pub fn parabolic_shift(left: f64, center: f64, right: f64) -> f64 {
    let denominator = left - 2.0 * center + right;
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    let shift = 0.5 * (left - right) / denominator;
    if shift.is_finite() { shift.clamp(-1.0, 1.0) } else { 0.0 }
}
