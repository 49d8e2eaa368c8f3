//! # Error Module
//!
//! Typed errors for the pitch-detection core. Only two conditions ever reach
//! the caller: an audio feed that cannot be acquired, and a configuration that
//! fails validation. "No pitch" is a normal result, never an error.

use thiserror::Error;

/// Reasons a [`TunerConfig`](crate::config::TunerConfig) is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("window size {0} is below the minimum of {min}", min = crate::config::MIN_WINDOW_SIZE)]
    WindowTooSmall(usize),
    #[error("smoothing alpha {0} must lie in (0, 1]")]
    SmoothingAlpha(f32),
    #[error("noise floor {0} dB must be a finite negative value")]
    NoiseFloor(f32),
    #[error("YIN threshold {0} must lie in (0, 1)")]
    YinThreshold(f32),
    #[error("target set is empty")]
    NoTargets,
    #[error("target {label:?} has invalid frequency {frequency_hz}")]
    InvalidTarget { label: String, frequency_hz: f32 },
    #[error("unknown note name {0:?}")]
    UnknownNote(String),
    #[error("sample rate {0} Hz cannot cover the detection range")]
    SampleRate(u32),
}

/// Errors surfaced by the [`Tuner`](crate::tuner::Tuner) lifecycle.
#[derive(Debug, Error)]
pub enum TunerError {
    /// The audio source could not be acquired; the tuner stays stopped.
    #[error("audio feed unavailable: {0:#}")]
    FeedUnavailable(anyhow::Error),
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}
