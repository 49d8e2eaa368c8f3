mod common;

use common::{CHUNK, SAMPLE_RATE, init_logging, sine};
use tuner_engine::config::WINDOW_OPTIONS;
use tuner_engine::pitch::{MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ};
use tuner_engine::tuning::NOTE_OPTIONS;
use tuner_engine::{PitchEngine, PitchResult, TunerConfig};

fn run(engine: &mut PitchEngine, samples: &[i16]) -> Vec<PitchResult> {
    let mut results = Vec::new();
    for chunk in samples.chunks(CHUNK) {
        engine.process(chunk, |r| results.push(r));
    }
    results
}

#[test]
fn test_every_detectable_note_maps_back_to_itself() {
    init_logging();
    let mut checked = 0;
    for window_size in WINDOW_OPTIONS {
        let config = TunerConfig::default()
            .with_window_size(window_size)
            .with_targets(NOTE_OPTIONS.to_vec());
        // In range, with at least four periods in the window.
        let notes = NOTE_OPTIONS.iter().filter(|t| {
            (MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&t.frequency_hz)
                && window_size as f32 * t.frequency_hz >= 4.0 * SAMPLE_RATE as f32
        });

        for note in notes {
            let mut engine = PitchEngine::new(config.clone(), SAMPLE_RATE).unwrap();
            let results = run(
                &mut engine,
                &sine(note.frequency_hz as f64, SAMPLE_RATE, window_size),
            );
            let last = results.last().unwrap();
            assert!(last.has_signal, "{} at window {window_size}", note.label);
            assert_eq!(last.nearest_label, note.label, "window {window_size}");
            let error = (last.frequency_hz - note.frequency_hz).abs() / note.frequency_hz;
            assert!(
                error < 0.005,
                "{} read {} Hz at window {window_size}",
                note.label,
                last.frequency_hz
            );
            assert!(last.cents.abs() < 5.0, "{} off by {} cents", note.label, last.cents);
            checked += 1;
        }
    }
    // F2..D#6 at 2048, D2..D#6 at every larger window.
    assert_eq!(checked, 47 + 3 * 50);
}

#[test]
fn test_open_strings_read_in_tune_on_short_windows() {
    init_logging();
    for window_size in [2048, 4096] {
        let config = TunerConfig::default().with_window_size(window_size);
        for target in &config.targets {
            if (window_size as f32) * target.frequency_hz < 4.0 * SAMPLE_RATE as f32 {
                continue;
            }
            let mut engine = PitchEngine::new(config.clone(), SAMPLE_RATE).unwrap();
            let results = run(
                &mut engine,
                &sine(target.frequency_hz as f64, SAMPLE_RATE, 3 * window_size),
            );
            for result in &results {
                assert_eq!(result.nearest_label, target.label);
                assert!(
                    result.cents.abs() < 2.0,
                    "{} off by {} cents at window {window_size}",
                    target.label,
                    result.cents
                );
            }
            assert!(results.last().unwrap().stable);
        }
    }
}

#[test]
fn test_all_zero_input_is_silent() {
    init_logging();
    let mut engine = PitchEngine::new(TunerConfig::default(), SAMPLE_RATE).unwrap();
    let results = run(&mut engine, &vec![0; 3 * 16384]);
    assert!(!results.is_empty());
    for result in results {
        assert!(!result.has_signal);
        assert!(result.amplitude_db <= -199.0);
        assert_eq!(result.frequency_hz, 0.0);
        assert!(result.nearest_label.is_empty());
        assert!(!result.stable);
    }
}

#[test]
fn test_stable_after_three_hops_then_reset_by_silence() {
    init_logging();
    let config = TunerConfig::default().with_window_size(4096);
    let mut engine = PitchEngine::new(config, SAMPLE_RATE).unwrap();

    let mut stable = Vec::new();
    for result in run(&mut engine, &sine(246.94, SAMPLE_RATE, 4096 + 6 * 1024)) {
        assert!(result.has_signal);
        assert_eq!(result.nearest_label, "B3");
        stable.push(result.stable);
    }
    // The chunk that completes the first window spills 314 samples that the
    // four backlogged hops absorb.
    assert_eq!(stable.len(), 9);
    assert_eq!(&stable[..3], &[false, false, true]);
    assert!(stable[2..].iter().all(|&s| s));

    let silence = run(&mut engine, &vec![0; 4096]);
    assert!(!silence.last().unwrap().has_signal);
    assert_eq!(engine.stable_hit_count(), 0);
    assert_eq!(engine.history_len(), 0);

    let resumed = run(&mut engine, &sine(246.94, SAMPLE_RATE, 4096));
    assert!(!resumed[0].stable);
}

#[test]
fn test_quiet_input_below_floor_is_gated() {
    init_logging();
    let mut engine = PitchEngine::new(TunerConfig::default(), SAMPLE_RATE).unwrap();
    // About -63 dB: a clean tone, but under the -50 dB floor.
    let quiet: Vec<i16> = sine(196.0, SAMPLE_RATE, 20000)
        .into_iter()
        .map(|s| s / 1000)
        .collect();
    let results = run(&mut engine, &quiet);
    assert!(!results.is_empty());
    for result in results {
        assert!(!result.has_signal);
        assert!(result.amplitude_db < -50.0);
    }
}
