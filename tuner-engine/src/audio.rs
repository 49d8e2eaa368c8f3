//! # Audio Feed Module
//!
//! The push boundary between an audio source and the analysis core.
//!
//! An [`AudioFeed`] is started with a [`FeedSender`] and pushes mono 16-bit
//! PCM chunks of any length through it, plus a one-time notification of the
//! sample rate it actually negotiated. [`CpalFeed`] implements this for the
//! default input device using CPAL (Cross-Platform Audio Library).

use anyhow::{Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfigRange};
use crossbeam_channel::Sender;

use crate::config::TunerConfig;

/// Messages delivered, in order, to the analysis worker.
pub(crate) enum FeedMessage {
    Pcm(Vec<i16>),
    SampleRate(u32),
    Backend(String),
    Reconfigure(TunerConfig),
    Shutdown,
}

/// Clonable handle a feed uses to push audio into the core.
///
/// Every method is non-blocking and may be called from an audio callback.
#[derive(Clone)]
pub struct FeedSender {
    sender: Sender<FeedMessage>,
}

impl FeedSender {
    pub(crate) fn new(sender: Sender<FeedMessage>) -> Self {
        Self { sender }
    }

    /// Pushes a chunk of mono 16-bit PCM.
    pub fn push_pcm(&self, chunk: &[i16]) {
        if chunk.is_empty() {
            return;
        }
        let _ = self.sender.send(FeedMessage::Pcm(chunk.to_vec()));
    }

    /// Pushes mono float samples in [-1, 1], converted to 16-bit PCM.
    pub fn push_f32(&self, chunk: &[f32]) {
        if chunk.is_empty() {
            return;
        }
        let pcm = chunk.iter().copied().map(f32_to_pcm).collect();
        let _ = self.sender.send(FeedMessage::Pcm(pcm));
    }

    /// Reports the sample rate the device actually runs at.
    pub fn report_sample_rate(&self, sample_rate: u32) {
        let _ = self.sender.send(FeedMessage::SampleRate(sample_rate));
    }

    /// Names the audio path that was selected, for diagnostics.
    pub fn report_backend(&self, backend: &str) {
        let _ = self.sender.send(FeedMessage::Backend(backend.to_string()));
    }
}

/// A push-driven audio source.
pub trait AudioFeed {
    /// Acquires the source and begins pushing into `sender`.
    ///
    /// An error means the source is unavailable; nothing was acquired.
    fn start(&mut self, requested_sample_rate: u32, sender: FeedSender) -> Result<()>;

    /// Releases the source. Must be safe to call at any time, repeatedly.
    fn stop(&mut self);
}

/// Scales a float sample to 16-bit PCM, clamping out-of-range input.
pub fn f32_to_pcm(sample: f32) -> i16 {
    if !sample.is_finite() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

fn i16_to_pcm(sample: i16) -> i16 {
    sample
}

/// Averages one interleaved frame down to a mono sample.
fn downmix<T: Copy>(frame: &[T], to_pcm: fn(T) -> i16) -> i16 {
    if frame.is_empty() {
        return 0;
    }
    let sum: i32 = frame.iter().map(|&s| to_pcm(s) as i32).sum();
    (sum / frame.len() as i32) as i16
}

/// Captures from the default input device.
#[derive(Default)]
pub struct CpalFeed {
    stream: Option<cpal::Stream>,
}

impl CpalFeed {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioFeed for CpalFeed {
    fn start(&mut self, requested_sample_rate: u32, sender: FeedSender) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown device".to_string());

        let configs = device.supported_input_configs()?.collect::<Vec<_>>();
        let (supported, path) = match find_supported_config(configs, requested_sample_rate) {
            Some(range) => (
                range.with_sample_rate(cpal::SampleRate(requested_sample_rate)),
                "requested rate",
            ),
            None => (device.default_input_config()?, "device default"),
        };
        let sample_format = supported.sample_format();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        log::info!(
            "Using audio input device: {} ({} Hz, {} ch, {:?}, {})",
            device_name,
            sample_rate,
            config.channels,
            sample_format,
            path
        );
        sender.report_backend(&format!(
            "{} / {} / {:?} / {}",
            host.id().name(),
            device_name,
            sample_format,
            path
        ));
        sender.report_sample_rate(sample_rate);

        let stream = match sample_format {
            SampleFormat::I16 => build_stream(&device, &config, sender, i16_to_pcm)?,
            SampleFormat::F32 => build_stream(&device, &config, sender, f32_to_pcm)?,
            other => bail!("Unsupported input sample format {other:?}"),
        };
        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log::debug!("Pausing input stream failed: {err}");
            }
            // Dropping the stream closes the device.
            drop(stream);
            log::info!("Audio input released");
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sender: FeedSender,
    to_pcm: fn(T) -> i16,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + Send + 'static,
{
    let channels = config.channels.max(1) as usize;
    let mut mono: Vec<i16> = Vec::new();
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            mono.clear();
            mono.extend(data.chunks(channels).map(|frame| downmix(frame, to_pcm)));
            sender.push_pcm(&mono);
        },
        |err| log::warn!("An error occurred on the audio stream: {}", err),
        None,
    )?;
    Ok(stream)
}

/// Picks the input configuration that covers the requested rate, preferring
/// fewer channels and native 16-bit samples.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .min_by_key(|c| (c.channels(), c.sample_format() != SampleFormat::I16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_pcm_clamps() {
        assert_eq!(f32_to_pcm(0.0), 0);
        assert_eq!(f32_to_pcm(1.0), 32767);
        assert_eq!(f32_to_pcm(-1.0), -32767);
        assert_eq!(f32_to_pcm(4.0), 32767);
        assert_eq!(f32_to_pcm(f32::NAN), 0);
    }

    #[test]
    fn test_downmix_averages_frame() {
        assert_eq!(downmix(&[1000_i16, 3000], i16_to_pcm), 2000);
        assert_eq!(downmix(&[0.5_f32], f32_to_pcm), 16384);
        assert_eq!(downmix::<i16>(&[], i16_to_pcm), 0);
    }

    #[test]
    fn test_sender_preserves_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sender = FeedSender::new(tx);
        sender.report_sample_rate(48000);
        sender.push_pcm(&[1, 2, 3]);
        sender.push_pcm(&[]);
        sender.push_f32(&[0.5]);

        let received: Vec<FeedMessage> = rx.try_iter().collect();
        assert_eq!(received.len(), 3);
        assert!(matches!(received[0], FeedMessage::SampleRate(48000)));
        assert!(matches!(&received[1], FeedMessage::Pcm(pcm) if pcm == &[1, 2, 3]));
        assert!(matches!(&received[2], FeedMessage::Pcm(pcm) if pcm == &[16384]));
    }
}
