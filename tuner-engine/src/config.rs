//! # Configuration
//!
//! The tunable parameters of the engine as one immutable value. Changing a
//! parameter means deriving a new configuration with one of the `with_*`
//! methods and handing the result to
//! [`PitchEngine::apply_config`](crate::engine::PitchEngine::apply_config).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tuning::{Target, standard_guitar_targets};
use crate::windower::hop_size_for;

/// Window sizes offered to users.
pub const WINDOW_OPTIONS: [usize; 4] = [2048, 4096, 8192, 16384];
/// Smallest accepted window size.
pub const MIN_WINDOW_SIZE: usize = 1024;

pub const DEFAULT_WINDOW_SIZE: usize = 16384;
pub const DEFAULT_SMOOTHING_ALPHA: f32 = 0.08;
pub const DEFAULT_NOISE_FLOOR_DB: f32 = -50.0;
pub const DEFAULT_YIN_THRESHOLD: f32 = 0.12;

/// Analysis configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Samples per analysis window (default: 16384)
    pub window_size: usize,

    /// Exponential smoothing factor in (0, 1] (default: 0.08)
    /// Lower values settle slower but read steadier
    pub smoothing_alpha: f32,

    /// Static gate floor in dB (default: -50.0)
    /// Windows quieter than this never reach the pitch detector
    pub noise_floor_db: f32,

    /// YIN absolute threshold in (0, 1) (default: 0.12)
    pub yin_threshold: f32,

    /// Pitches to match against (default: standard guitar tuning)
    pub targets: Vec<Target>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
            noise_floor_db: DEFAULT_NOISE_FLOOR_DB,
            yin_threshold: DEFAULT_YIN_THRESHOLD,
            targets: standard_guitar_targets(),
        }
    }
}

impl TunerConfig {
    /// `max(256, window_size / 4)`
    pub fn hop_size(&self) -> usize {
        hop_size_for(self.window_size)
    }

    pub fn with_window_size(&self, window_size: usize) -> Self {
        Self {
            window_size,
            ..self.clone()
        }
    }

    pub fn with_smoothing_alpha(&self, smoothing_alpha: f32) -> Self {
        Self {
            smoothing_alpha,
            ..self.clone()
        }
    }

    pub fn with_noise_floor_db(&self, noise_floor_db: f32) -> Self {
        Self {
            noise_floor_db,
            ..self.clone()
        }
    }

    pub fn with_yin_threshold(&self, yin_threshold: f32) -> Self {
        Self {
            yin_threshold,
            ..self.clone()
        }
    }

    pub fn with_targets(&self, targets: Vec<Target>) -> Self {
        Self {
            targets,
            ..self.clone()
        }
    }

    /// Replaces the targets with equal-tempered notes, e.g. a drop-D tuning
    /// `["D2", "A2", "D3", "G3", "B3", "E4"]`.
    pub fn with_target_notes(&self, notes: &[&str]) -> Result<Self, ConfigError> {
        let targets = notes
            .iter()
            .map(|note| Target::from_note(note))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.with_targets(targets))
    }

    /// Checks every field; an invalid configuration is never applied.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size < MIN_WINDOW_SIZE {
            return Err(ConfigError::WindowTooSmall(self.window_size));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(ConfigError::SmoothingAlpha(self.smoothing_alpha));
        }
        if !(self.noise_floor_db.is_finite() && self.noise_floor_db < 0.0) {
            return Err(ConfigError::NoiseFloor(self.noise_floor_db));
        }
        if !(self.yin_threshold > 0.0 && self.yin_threshold < 1.0) {
            return Err(ConfigError::YinThreshold(self.yin_threshold));
        }
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        if let Some(bad) = self
            .targets
            .iter()
            .find(|t| !(t.frequency_hz.is_finite() && t.frequency_hz > 0.0))
        {
            return Err(ConfigError::InvalidTarget {
                label: bad.label.clone(),
                frequency_hz: bad.frequency_hz,
            });
        }
        Ok(())
    }
}
