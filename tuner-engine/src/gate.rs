//! # Energy Gate
//!
//! Loudness measurement and an adaptively tracked noise floor. A window is
//! only handed to the pitch detector when it is louder than
//! `max(static floor, tracked noise + margin)`.

/// Added inside the logarithm so silence maps to -200 dB instead of -inf.
pub const RMS_EPSILON: f32 = 1e-10;
/// How far above the tracked noise a window must be to open the gate.
pub const GATE_MARGIN_DB: f32 = 6.0;
/// Upward (release) coefficient of the noise tracker.
pub const NOISE_RELEASE: f32 = 0.05;
/// The tracked noise estimate never rises above this.
pub const NOISE_CEILING_DB: f32 = -20.0;
/// A fresh estimate starts this far below the static floor.
pub const NOISE_BASELINE_OFFSET_DB: f32 = 20.0;

/// `20 * log10(rms + eps)` of samples already normalised to [-1, 1].
pub fn rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 20.0 * RMS_EPSILON.log10();
    }
    let mean_square = samples
        .iter()
        .map(|&s| s as f64 * s as f64)
        .sum::<f64>()
        / samples.len() as f64;
    let db = 20.0 * (mean_square.sqrt() as f32 + RMS_EPSILON).log10();
    if db.is_finite() { db } else { 20.0 * RMS_EPSILON.log10() }
}

/// Noise-floor tracker with instant attack and slow release.
#[derive(Debug, Clone)]
pub struct EnergyGate {
    static_floor_db: f32,
    noise_estimate_db: f32,
}

impl EnergyGate {
    pub fn new(static_floor_db: f32) -> Self {
        Self {
            static_floor_db,
            noise_estimate_db: static_floor_db - NOISE_BASELINE_OFFSET_DB,
        }
    }

    pub fn noise_estimate_db(&self) -> f32 {
        self.noise_estimate_db
    }

    pub fn static_floor_db(&self) -> f32 {
        self.static_floor_db
    }

    /// `max(static floor, noise estimate + margin)`
    pub fn threshold_db(&self) -> f32 {
        self.static_floor_db
            .max(self.noise_estimate_db + GATE_MARGIN_DB)
    }

    /// Folds one window's loudness into the noise estimate.
    pub fn track(&mut self, level_db: f32) {
        if level_db < self.noise_estimate_db {
            self.noise_estimate_db = level_db;
        } else {
            self.noise_estimate_db += NOISE_RELEASE * (level_db - self.noise_estimate_db);
        }
        self.noise_estimate_db = self.noise_estimate_db.min(NOISE_CEILING_DB);
    }

    /// Decides against the threshold as it stood before this window, then
    /// tracks the window. Returns `(open, threshold_db)`.
    pub fn evaluate(&mut self, level_db: f32) -> (bool, f32) {
        let threshold = self.threshold_db();
        self.track(level_db);
        (level_db > threshold, threshold)
    }
}
