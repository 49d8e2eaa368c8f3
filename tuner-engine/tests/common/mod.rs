#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use tuner_engine::{AudioFeed, FeedSender, PitchResult, PitchListener};

pub const SAMPLE_RATE: u32 = 44100;
/// 10 ms at 44.1 kHz, deliberately not a divisor of any hop size.
pub const CHUNK: usize = 441;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Full-scale 16-bit sine.
pub fn sine(frequency: f64, sample_rate: u32, len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * frequency * i as f64 / sample_rate as f64;
            (32767.0 * phase.sin()).round() as i16
        })
        .collect()
}

/// An in-memory feed that replays the same script on every start.
#[derive(Default)]
pub struct ScriptedFeed {
    pub script: Vec<i16>,
    pub negotiated_rate: Option<u32>,
    pub backend: Option<String>,
    pub failures_remaining: usize,
    pub starts: usize,
    pub stops: usize,
    sender: Option<FeedSender>,
}

impl ScriptedFeed {
    pub fn with_script(script: Vec<i16>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// The live sender while started, for pushing more audio.
    pub fn sender(&self) -> Option<&FeedSender> {
        self.sender.as_ref()
    }
}

impl AudioFeed for ScriptedFeed {
    fn start(&mut self, _requested_sample_rate: u32, sender: FeedSender) -> Result<()> {
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            bail!("input device busy");
        }
        self.starts += 1;
        if let Some(backend) = &self.backend {
            sender.report_backend(backend);
        }
        if let Some(rate) = self.negotiated_rate {
            sender.report_sample_rate(rate);
        }
        for chunk in self.script.chunks(CHUNK) {
            sender.push_pcm(chunk);
        }
        self.sender = Some(sender);
        Ok(())
    }

    fn stop(&mut self) {
        self.stops += 1;
        self.sender = None;
    }
}

/// Listener that records everything it is told.
#[derive(Clone, Default)]
pub struct Recorder {
    pub results: Arc<Mutex<Vec<PitchResult>>>,
    pub backends: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn take_results(&self) -> Vec<PitchResult> {
        std::mem::take(&mut *self.results.lock().unwrap())
    }
}

impl PitchListener for Recorder {
    fn on_pitch(&mut self, result: PitchResult) {
        self.results.lock().unwrap().push(result);
    }

    fn on_backend_selected(&mut self, backend: &str) {
        self.backends.lock().unwrap().push(backend.to_string());
    }
}
