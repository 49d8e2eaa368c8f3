//! # Pitch Engine
//!
//! The per-hop pipeline: windower, energy gate, YIN detector, stabilizer and
//! note mapper, all owned by one value so a configuration change swaps every
//! buffer and filter in a single step.
//!
//! The engine does no I/O and never blocks, so it can run directly on an
//! audio callback thread or on a dedicated worker.

use crate::PitchResult;
use crate::config::TunerConfig;
use crate::error::ConfigError;
use crate::gate::{EnergyGate, rms_db};
use crate::pitch::{YinDetector, lag_bounds};
use crate::stabilizer::{Loudness, Stabilizer};
use crate::tuning::find_nearest_target;
use crate::windower::Windower;

/// A reading within this many cents of a target counts towards stability.
pub const STABLE_CENTS: f32 = 20.0;
/// Qualifying hops needed before a reading is flagged stable.
pub const STABLE_HITS: u32 = 3;

/// Accepted sample rates.
const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 8_000..=384_000;

/// Converts 16-bit PCM to [-1, 1].
pub fn normalize_pcm(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

pub struct PitchEngine {
    config: TunerConfig,
    sample_rate: u32,
    windower: Windower,
    analysis: Vec<f32>,
    gate: EnergyGate,
    detector: YinDetector,
    stabilizer: Stabilizer,
    stable_hits: u32,
    pcm_scratch: Vec<f32>,
}

impl PitchEngine {
    /// Creates an engine with empty buffers and fresh filter state.
    ///
    /// # Arguments
    /// * `config` - The analysis configuration; validated here
    /// * `sample_rate` - Sample rate of the incoming PCM in Hz
    ///
    /// # Returns
    /// The engine, or the [`ConfigError`] describing the first invalid field.
    pub fn new(config: TunerConfig, sample_rate: u32) -> Result<Self, ConfigError> {
        config.validate()?;
        validate_sample_rate(sample_rate, config.window_size)?;
        Ok(Self::from_validated(config, sample_rate))
    }

    /// Builds without validating; callers guarantee `config` and `sample_rate` passed validation.
    pub(crate) fn from_validated(config: TunerConfig, sample_rate: u32) -> Self {
        let window_size = config.window_size;
        PitchEngine {
            windower: Windower::new(window_size, config.hop_size()),
            analysis: vec![0.0; window_size],
            gate: EnergyGate::new(config.noise_floor_db),
            detector: YinDetector::new(window_size, sample_rate),
            stabilizer: Stabilizer::new(config.smoothing_alpha),
            stable_hits: 0,
            pcm_scratch: Vec::new(),
            config,
            sample_rate,
        }
    }

    /// Replaces the configuration: buffers are resized, the Hann window is
    /// regenerated and every filter starts over. On error nothing changes.
    pub fn apply_config(&mut self, config: TunerConfig) -> Result<(), ConfigError> {
        config.validate()?;
        validate_sample_rate(self.sample_rate, config.window_size)?;
        log::debug!(
            "Applying config: window {} hop {} alpha {} floor {} dB threshold {}",
            config.window_size,
            config.hop_size(),
            config.smoothing_alpha,
            config.noise_floor_db,
            config.yin_threshold
        );
        *self = Self::from_validated(config, self.sample_rate);
        Ok(())
    }

    /// Adopts the sample rate the audio feed actually negotiated.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), ConfigError> {
        if sample_rate == self.sample_rate {
            return Ok(());
        }
        validate_sample_rate(sample_rate, self.config.window_size)?;
        log::info!("Sample rate changed from {} to {} Hz", self.sample_rate, sample_rate);
        *self = Self::from_validated(self.config.clone(), sample_rate);
        Ok(())
    }

    /// Clears buffered audio and all transient state, keeping the configuration.
    pub fn reset(&mut self) {
        self.windower.reset();
        self.gate = EnergyGate::new(self.config.noise_floor_db);
        self.stabilizer.reset();
        self.stable_hits = 0;
    }

    /// Ingests 16-bit PCM and calls `on_result` once per completed hop.
    ///
    /// # Arguments
    /// * `chunk` - Mono PCM of any length; it need not line up with hops
    /// * `on_result` - Receives each [`PitchResult`] in hop order
    ///
    /// A chunk that completes no hop produces no call. A caller that fell
    /// behind gets every backlogged hop from one call.
    pub fn process<F>(&mut self, chunk: &[i16], on_result: F)
    where
        F: FnMut(PitchResult),
    {
        let mut samples = std::mem::take(&mut self.pcm_scratch);
        samples.clear();
        samples.extend(chunk.iter().copied().map(normalize_pcm));
        self.process_normalized(&samples, on_result);
        self.pcm_scratch = samples;
    }

    /// Like [`process`](Self::process) for samples already in [-1, 1].
    pub fn process_normalized<F>(&mut self, chunk: &[f32], mut on_result: F)
    where
        F: FnMut(PitchResult),
    {
        self.windower.ingest(chunk);
        while self.windower.try_extract(&mut self.analysis) {
            let result = self.analyze_window();
            log::trace!(
                "hop: signal {} freq {:.2} Hz cents {:.1} level {:.1} dB",
                result.has_signal,
                result.frequency_hz,
                result.cents,
                result.amplitude_db
            );
            on_result(result);
        }
    }

    fn analyze_window(&mut self) -> PitchResult {
        let amplitude_db = rms_db(&self.analysis);
        let (open, threshold_db) = self.gate.evaluate(amplitude_db);
        if !open {
            return self.no_pitch(amplitude_db);
        }

        let Some(estimate) = self
            .detector
            .detect(&self.analysis, self.sample_rate, self.config.yin_threshold)
        else {
            return self.no_pitch(amplitude_db);
        };

        let smoothed = self.stabilizer.update(
            estimate.frequency,
            Loudness {
                amplitude_db,
                threshold_db,
            },
        );
        let Some(nearest) = find_nearest_target(&self.config.targets, smoothed) else {
            return self.no_pitch(amplitude_db);
        };

        if nearest.cents.abs() < STABLE_CENTS {
            self.stable_hits = self.stable_hits.saturating_add(1);
        } else {
            self.stable_hits = 0;
        }
        PitchResult {
            has_signal: true,
            frequency_hz: smoothed,
            cents: nearest.cents,
            nearest_label: nearest.target.label.clone(),
            amplitude_db,
            stable: self.stable_hits >= STABLE_HITS,
        }
    }

    fn no_pitch(&mut self, amplitude_db: f32) -> PitchResult {
        self.stabilizer.reset();
        self.stable_hits = 0;
        PitchResult::no_signal(amplitude_db)
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn hop_size(&self) -> usize {
        self.windower.hop_size()
    }

    pub fn ring_capacity(&self) -> usize {
        self.windower.capacity()
    }

    pub fn analysis_len(&self) -> usize {
        self.analysis.len()
    }

    pub fn hann_len(&self) -> usize {
        self.detector.hann().len()
    }

    pub fn scratch_len(&self) -> usize {
        self.detector.scratch_len()
    }

    pub fn lag_range(&self) -> (usize, usize) {
        self.detector.lag_range()
    }

    pub fn smoothed_frequency(&self) -> f32 {
        self.stabilizer.smoothed()
    }

    pub fn last_accepted_frequency(&self) -> f32 {
        self.stabilizer.last_accepted()
    }

    pub fn stable_hit_count(&self) -> u32 {
        self.stable_hits
    }

    pub fn noise_estimate_db(&self) -> f32 {
        self.gate.noise_estimate_db()
    }

    pub fn history_len(&self) -> usize {
        self.stabilizer.history().len()
    }
}

fn validate_sample_rate(sample_rate: u32, window_size: usize) -> Result<(), ConfigError> {
    let (min_lag, max_lag) = lag_bounds(sample_rate, window_size);
    if !SAMPLE_RATE_RANGE.contains(&sample_rate) || min_lag + 2 > max_lag {
        return Err(ConfigError::SampleRate(sample_rate));
    }
    Ok(())
}
