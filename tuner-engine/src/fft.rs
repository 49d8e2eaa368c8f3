//! # Fast Fourier Transform (FFT) Module
//!
//! Windowing and FFT-based correlation for the streaming pitch detector.
//!
//! ## Features
//! - Precomputed Hann coefficients for a given window size
//! - Linear (non-circular) auto- and cross-correlation via RustFFT, with
//!   cached plans so the per-hop cost is a few transforms of a fixed size

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

/// Hann window coefficients, `0.5 * (1 - cos(2*pi*i / (n - 1)))`.
pub fn hann_coefficients(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}

/// FFT-backed linear correlations of fixed-length inputs over lags
/// `0..=max_lag`.
///
/// Inputs are zero-padded to at least `input_len + max_lag + 1` so neither
/// positive nor negative lags wrap around.
pub struct Correlator {
    input_len: usize,
    max_lag: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl Correlator {
    /// Plans transforms for inputs of `input_len` samples.
    ///
    /// # Arguments
    /// * `input_len` - Length every later input must have
    /// * `max_lag` - Longest lag written by the correlation methods
    pub fn new(input_len: usize, max_lag: usize) -> Self {
        let fft_len = (input_len + max_lag + 1).next_power_of_two();
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            input_len,
            max_lag,
            forward,
            inverse,
            buffer: vec![Complex::default(); fft_len],
            scratch: vec![Complex::default(); scratch_len],
        }
    }

    pub fn fft_len(&self) -> usize {
        self.buffer.len()
    }

    /// Zero-padded spectrum of `signal`, to be kept as the fixed reference of
    /// [`cross_correlate`](Self::cross_correlate).
    pub fn spectrum(&mut self, signal: &[f32]) -> Vec<Complex<f64>> {
        self.load(signal);
        self.forward
            .process_with_scratch(&mut self.buffer, &mut self.scratch);
        self.buffer.clone()
    }

    /// Writes `r(lag) = sum_i x[i] * x[i + lag]` for `lag` in `0..=max_lag`.
    ///
    /// # Panics
    /// If `signal` is not `input_len` long or `out` is shorter than `max_lag + 1`.
    pub fn autocorrelate(&mut self, signal: &[f32], out: &mut [f64]) {
        assert!(out.len() > self.max_lag);
        self.load(signal);
        self.forward
            .process_with_scratch(&mut self.buffer, &mut self.scratch);
        for bin in self.buffer.iter_mut() {
            *bin = Complex::new(bin.norm_sqr(), 0.0);
        }
        self.inverse
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = self.scale();
        for (r, bin) in out.iter_mut().zip(&self.buffer).take(self.max_lag + 1) {
            *r = bin.re * scale;
        }
    }

    /// Correlates `signal` against a reference given by its [`spectrum`](Self::spectrum).
    ///
    /// # Arguments
    /// * `signal` - Input of `input_len` samples
    /// * `reference` - Spectrum of the reference input `r`
    /// * `ahead` - Receives `sum_i signal[i] * r[i + lag]`
    /// * `behind` - Receives `sum_i r[i] * signal[i + lag]`
    ///
    /// # Panics
    /// On a length mismatch, like [`autocorrelate`](Self::autocorrelate).
    pub fn cross_correlate(
        &mut self,
        signal: &[f32],
        reference: &[Complex<f64>],
        ahead: &mut [f64],
        behind: &mut [f64],
    ) {
        assert_eq!(reference.len(), self.buffer.len());
        assert!(ahead.len() > self.max_lag && behind.len() > self.max_lag);
        self.load(signal);
        self.forward
            .process_with_scratch(&mut self.buffer, &mut self.scratch);
        for (bin, r) in self.buffer.iter_mut().zip(reference) {
            *bin = bin.conj() * r;
        }
        self.inverse
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        // Negative lags land at the top of the buffer.
        let len = self.buffer.len();
        let scale = self.scale();
        for lag in 0..=self.max_lag {
            ahead[lag] = self.buffer[lag].re * scale;
            behind[lag] = self.buffer[(len - lag) % len].re * scale;
        }
    }

    fn load(&mut self, signal: &[f32]) {
        assert_eq!(signal.len(), self.input_len, "signal length changed without replanning");
        for (slot, &sample) in self.buffer.iter_mut().zip(signal) {
            *slot = Complex::new(sample as f64, 0.0);
        }
        for slot in self.buffer.iter_mut().skip(signal.len()) {
            *slot = Complex::default();
        }
    }

    // RustFFT does not normalise; the round trip scales by the FFT length.
    fn scale(&self) -> f64 {
        1.0 / self.buffer.len() as f64
    }
}
