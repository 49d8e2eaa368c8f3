//! # Temporal Stabilizer
//!
//! Turns the raw per-hop estimates into a steady reading: a five-slot median
//! filter, an octave-drop hold, damping above the B3 string, and exponential
//! smoothing.

/// Number of raw estimates the median filter looks at.
pub const HISTORY_LEN: usize = 5;
/// A new estimate below this fraction of the accepted one looks like an
/// octave error.
pub const OCTAVE_DROP_RATIO: f32 = 0.85;
/// An octave drop is only believed when the window is at least this far
/// above the gate threshold.
pub const OCTAVE_DROP_HEADROOM_DB: f32 = 6.0;
/// At and above this frequency each hop only moves part of the way.
pub const HIGH_FREQ_DAMPING_HZ: f32 = 246.94;
/// Share of the distance covered per hop above [`HIGH_FREQ_DAMPING_HZ`].
pub const HIGH_FREQ_STEP: f32 = 0.35;

/// Fixed-capacity ring of recent raw estimates.
#[derive(Debug, Clone, Default)]
pub struct FrequencyHistory {
    slots: [f32; HISTORY_LEN],
    next: usize,
    len: usize,
}

impl FrequencyHistory {
    pub fn push(&mut self, frequency: f32) {
        self.slots[self.next] = frequency;
        self.next = (self.next + 1) % HISTORY_LEN;
        self.len = (self.len + 1).min(HISTORY_LEN);
    }

    pub fn clear(&mut self) {
        self.next = 0;
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Median of the stored values; the mean of the middle pair when even.
    pub fn median(&self) -> Option<f32> {
        if self.len == 0 {
            return None;
        }
        let mut sorted = [0.0_f32; HISTORY_LEN];
        sorted[..self.len].copy_from_slice(&self.slots[..self.len]);
        let sorted = &mut sorted[..self.len];
        sorted.sort_by(f32::total_cmp);
        let mid = self.len / 2;
        Some(if self.len % 2 == 0 {
            0.5 * (sorted[mid - 1] + sorted[mid])
        } else {
            sorted[mid]
        })
    }
}

/// Loudness context for one hop, in dB.
#[derive(Debug, Clone, Copy)]
pub struct Loudness {
    pub amplitude_db: f32,
    pub threshold_db: f32,
}

/// Median, octave hold, high-pitch damping and smoothing state.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    alpha: f32,
    history: FrequencyHistory,
    last_accepted: f32,
    smoothed: f32,
}

impl Stabilizer {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            history: FrequencyHistory::default(),
            last_accepted: 0.0,
            smoothed: 0.0,
        }
    }

    pub fn smoothed(&self) -> f32 {
        self.smoothed
    }

    pub fn last_accepted(&self) -> f32 {
        self.last_accepted
    }

    pub fn history(&self) -> &FrequencyHistory {
        &self.history
    }

    /// Forgets everything; called on hops without a confident pitch.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_accepted = 0.0;
        self.smoothed = 0.0;
    }

    /// Feeds one raw estimate and returns the smoothed frequency.
    pub fn update(&mut self, raw: f32, loudness: Loudness) -> f32 {
        self.history.push(raw);
        let filtered = self.history.median().unwrap_or(raw);
        let stabilized = stabilize(filtered, self.last_accepted, loudness);
        self.last_accepted = stabilized;

        self.smoothed = if self.smoothed == 0.0 {
            stabilized
        } else {
            self.smoothed + self.alpha * (stabilized - self.smoothed)
        };
        self.smoothed
    }
}

/// Applies the octave-drop hold and high-frequency damping to a filtered
/// estimate relative to the last accepted one.
///
/// The hold is a heuristic: a quiet but genuine fast drop of more than
/// ~15% is held as well.
pub fn stabilize(filtered: f32, last_accepted: f32, loudness: Loudness) -> f32 {
    if last_accepted <= 0.0 {
        return filtered;
    }
    let quiet = loudness.amplitude_db < loudness.threshold_db + OCTAVE_DROP_HEADROOM_DB;
    if filtered / last_accepted < OCTAVE_DROP_RATIO && quiet {
        last_accepted
    } else if filtered >= HIGH_FREQ_DAMPING_HZ {
        last_accepted + HIGH_FREQ_STEP * (filtered - last_accepted)
    } else {
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOUD: Loudness = Loudness {
        amplitude_db: -10.0,
        threshold_db: -50.0,
    };
    const QUIET: Loudness = Loudness {
        amplitude_db: -47.0,
        threshold_db: -50.0,
    };

    #[test]
    fn test_median_odd_and_even() {
        let mut history = FrequencyHistory::default();
        assert_eq!(history.median(), None);
        history.push(110.0);
        history.push(100.0);
        assert_eq!(history.median(), Some(105.0));
        history.push(300.0);
        assert_eq!(history.median(), Some(110.0));
    }

    #[test]
    fn test_history_keeps_five_newest() {
        let mut history = FrequencyHistory::default();
        for f in [1000.0, 1000.0, 1.0, 2.0, 3.0, 4.0, 5.0] {
            history.push(f);
        }
        assert_eq!(history.len(), HISTORY_LEN);
        assert_eq!(history.median(), Some(3.0));
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_median_rejects_single_outlier() {
        let mut stabilizer = Stabilizer::new(1.0);
        for _ in 0..4 {
            stabilizer.update(110.0, LOUD);
        }
        assert_eq!(stabilizer.update(440.0, LOUD), 110.0);
    }

    #[test]
    fn test_quiet_octave_drop_is_held() {
        assert_eq!(stabilize(55.0, 110.0, QUIET), 110.0);
        assert_eq!(stabilize(55.0, 110.0, LOUD), 55.0);
        // A small downward move is not an octave drop.
        assert_eq!(stabilize(100.0, 110.0, QUIET), 100.0);
    }

    #[test]
    fn test_quiet_octave_drop_sequence_holds_near_110() {
        let mut stabilizer = Stabilizer::new(0.2);
        for _ in 0..5 {
            stabilizer.update(110.0, QUIET);
        }
        for _ in 0..10 {
            let smoothed = stabilizer.update(55.0, QUIET);
            assert!((smoothed - 110.0).abs() < 0.5, "drifted to {smoothed}");
        }
    }

    #[test]
    fn test_loud_octave_drop_sequence_is_accepted() {
        let mut stabilizer = Stabilizer::new(1.0);
        for _ in 0..5 {
            stabilizer.update(110.0, LOUD);
        }
        let settled: Vec<f32> = (0..5).map(|_| stabilizer.update(55.0, LOUD)).collect();
        // The median needs three of five slots before it flips.
        assert_eq!(settled, vec![110.0, 110.0, 55.0, 55.0, 55.0]);
    }

    #[test]
    fn test_high_pitches_are_damped() {
        let step = stabilize(340.0, 330.0, LOUD);
        assert!((step - 333.5).abs() < 1e-4);
        // Low pitches jump straight to the new value.
        assert_eq!(stabilize(120.0, 110.0, LOUD), 120.0);
        // Nothing to damp against on a cold start.
        assert_eq!(stabilize(330.0, 0.0, LOUD), 330.0);
    }

    #[test]
    fn test_smoothing_cold_start_and_mix() {
        let mut stabilizer = Stabilizer::new(0.5);
        assert_eq!(stabilizer.update(100.0, LOUD), 100.0);
        assert_eq!(stabilizer.update(100.0, LOUD), 100.0);
        // Median of [100, 100, 120] is still 100.
        assert_eq!(stabilizer.update(120.0, LOUD), 100.0);
        // Median of [100, 100, 120, 120] is 110; smoothing halves the step.
        assert_eq!(stabilizer.update(120.0, LOUD), 105.0);

        stabilizer.reset();
        assert_eq!(stabilizer.smoothed(), 0.0);
        assert_eq!(stabilizer.last_accepted(), 0.0);
        assert!(stabilizer.history().is_empty());
        assert_eq!(stabilizer.update(200.0, LOUD), 200.0);
    }
}
