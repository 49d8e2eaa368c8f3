// tuner-engine/src/lib.rs

//! The real-time pitch-detection core of an instrument tuner.
//! This crate turns a live stream of mono PCM into one [`PitchResult`] per
//! analysis hop: windowing, noise gating, YIN period detection, temporal
//! stabilization and nearest-target mapping. It is completely headless and
//! contains no GUI code.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod fft;
pub mod gate;
pub mod pitch;
pub mod stabilizer;
pub mod tuner;
pub mod tuning;
pub mod windower;

use serde::{Deserialize, Serialize};

pub use audio::{AudioFeed, CpalFeed, FeedSender};
pub use config::TunerConfig;
pub use engine::PitchEngine;
pub use error::{ConfigError, TunerError};
pub use tuner::Tuner;
pub use tuning::Target;

/// Sample rate requested from the audio feed unless told otherwise.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// The result of a single analysis hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchResult {
    /// Whether a confident pitch was found in this hop.
    pub has_signal: bool,
    /// The stabilized frequency in Hz, 0 without signal.
    pub frequency_hz: f32,
    /// Deviation from the nearest target in cents, 0 without signal.
    pub cents: f32,
    /// Label of the nearest target, empty without signal.
    pub nearest_label: String,
    /// Loudness of the window in dB.
    pub amplitude_db: f32,
    /// True once the reading has stayed close to one target for a few hops.
    pub stable: bool,
}

impl PitchResult {
    /// The result of a hop without a confident pitch.
    ///
    /// # Arguments
    /// * `amplitude_db` - Loudness of the window, still reported for meters
    ///
    /// # Returns
    /// A result with `has_signal == false`, zero frequency and cents, an empty
    /// label and `stable == false`.
    pub fn no_signal(amplitude_db: f32) -> Self {
        Self {
            has_signal: false,
            frequency_hz: 0.0,
            cents: 0.0,
            nearest_label: String::new(),
            amplitude_db,
            stable: false,
        }
    }
}

/// Receives what the core produces: one result per hop, plus an optional
/// diagnostic naming the audio path the feed settled on.
pub trait PitchListener: Send {
    fn on_pitch(&mut self, result: PitchResult);

    fn on_backend_selected(&mut self, _backend: &str) {}
}

impl PitchListener for crossbeam_channel::Sender<PitchResult> {
    fn on_pitch(&mut self, result: PitchResult) {
        // A receiver that went away just stops listening.
        let _ = self.send(result);
    }
}
