//! # Musical Tuning Module
//!
//! Equal-tempered note arithmetic and the target set a tuner matches against.
//!
//! ## Features
//! - Note name + octave to frequency (`A4` = 440 Hz, MIDI 69)
//! - Parsing of note names such as `"E2"` or `"C#3"`
//! - Cent deviation calculations
//! - A chromatic table of selectable target notes
//! - Nearest-target matching for a detected frequency

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Chromatic note names, indexed by semitone above C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Lowest and highest octave offered in [`NOTE_OPTIONS`].
const OPTION_OCTAVES: std::ops::RangeInclusive<i32> = 1..=6;

/// Standard guitar tuning, low string first.
pub const STANDARD_GUITAR: [&str; 6] = ["E2", "A2", "D3", "G3", "B3", "E4"];

/// A named pitch the tuner can lock onto (for example a guitar string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Display label, e.g. `"D3"`.
    pub label: String,
    /// Frequency in Hz.
    pub frequency_hz: f32,
}

impl Target {
    pub fn new(label: impl Into<String>, frequency_hz: f32) -> Self {
        Self {
            label: label.into(),
            frequency_hz,
        }
    }

    /// Builds an equal-tempered target from a note name like `"G3"`.
    pub fn from_note(name: &str) -> Result<Self, ConfigError> {
        let frequency_hz = parse_note(name)?;
        Ok(Self::new(name, frequency_hz))
    }
}

/// Every note from C1 to B6, computed once on first use.
///
/// Hosts use this table to offer a per-string note picker.
pub static NOTE_OPTIONS: Lazy<Vec<Target>> = Lazy::new(|| {
    OPTION_OCTAVES
        .flat_map(|octave| {
            NOTE_NAMES
                .iter()
                .enumerate()
                .map(move |(semitone, name)| {
                    Target::new(
                        format!("{name}{octave}"),
                        midi_to_frequency(midi_number(semitone as i32, octave)),
                    )
                })
        })
        .collect()
});

/// Returns the targets for standard guitar tuning.
pub fn standard_guitar_targets() -> Vec<Target> {
    STANDARD_GUITAR
        .iter()
        .filter_map(|name| Target::from_note(name).ok())
        .collect()
}

/// `midi = (octave + 1) * 12 + semitone`
pub fn midi_number(semitone: i32, octave: i32) -> i32 {
    (octave + 1) * 12 + semitone
}

/// Equal temperament with A4 (MIDI 69) at 440 Hz.
pub fn midi_to_frequency(midi: i32) -> f32 {
    440.0 * 2.0_f32.powf((midi - 69) as f32 / 12.0)
}

/// Looks up the semitone offset above C for a chromatic note name.
pub fn semitone_of(name: &str) -> Option<i32> {
    NOTE_NAMES
        .iter()
        .position(|n| *n == name)
        .map(|i| i as i32)
}

/// Frequency of `name` in the given octave, e.g. `note_frequency("A", 4) == 440.0`.
pub fn note_frequency(name: &str, octave: i32) -> Option<f32> {
    semitone_of(name).map(|semitone| midi_to_frequency(midi_number(semitone, octave)))
}

/// Parses a note such as `"E2"`, `"C#3"` or `"A-1"` into its frequency.
pub fn parse_note(note: &str) -> Result<f32, ConfigError> {
    let unknown = || ConfigError::UnknownNote(note.to_string());
    let split = note
        .find(|c: char| c.is_ascii_digit() || c == '-')
        .ok_or_else(unknown)?;
    let (name, octave) = note.split_at(split);
    let octave: i32 = octave.parse().map_err(|_| unknown())?;
    note_frequency(name, octave).ok_or_else(unknown)
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat; 1200 cents per octave.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// The closest target to a detected frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestTarget<'a> {
    pub target: &'a Target,
    pub cents: f32,
}

/// Finds the target minimising `|cents|` for `freq`.
///
/// Returns `None` for an empty target set or a non-positive frequency.
pub fn find_nearest_target(targets: &[Target], freq: f32) -> Option<NearestTarget<'_>> {
    if !(freq.is_finite() && freq > 0.0) {
        return None;
    }
    targets
        .iter()
        .map(|target| NearestTarget {
            target,
            cents: calculate_cents_deviation(freq, target.frequency_hz),
        })
        .filter(|m| m.cents.is_finite())
        .min_by(|a, b| a.cents.abs().total_cmp(&b.cents.abs()))
}
