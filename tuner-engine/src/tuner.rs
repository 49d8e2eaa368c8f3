//! # Tuner Lifecycle
//!
//! Couples an [`AudioFeed`] to a [`PitchEngine`] running on a dedicated
//! analysis thread.
//!
//! ## Architecture
//! - **Feed**: pushes PCM through a [`FeedSender`]
//! - **Worker**: drains a crossbeam FIFO, owns the engine while running and
//!   hands each result to the [`PitchListener`]
//! - **Control**: `start`/`stop`/`apply_config` on the caller's thread;
//!   reconfiguration while running travels through the same FIFO, so every
//!   hop sees either the old or the new configuration, never a mix

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::audio::{AudioFeed, FeedMessage, FeedSender};
use crate::config::TunerConfig;
use crate::engine::PitchEngine;
use crate::error::TunerError;
use crate::{DEFAULT_SAMPLE_RATE, PitchListener};

type SharedListener = Arc<Mutex<dyn PitchListener>>;

/// The running analysis thread.
struct AnalysisWorker {
    sender: Sender<FeedMessage>,
    handle: JoinHandle<PitchEngine>,
}

pub struct Tuner<F: AudioFeed> {
    feed: F,
    config: TunerConfig,
    requested_sample_rate: u32,
    listener: SharedListener,
    engine: Option<PitchEngine>,
    worker: Option<AnalysisWorker>,
}

impl<F: AudioFeed> Tuner<F> {
    /// Creates a stopped tuner requesting 44.1 kHz from the feed.
    pub fn new<L>(feed: F, config: TunerConfig, listener: L) -> Result<Self, TunerError>
    where
        L: PitchListener + 'static,
    {
        Self::with_sample_rate(feed, config, DEFAULT_SAMPLE_RATE, listener)
    }

    pub fn with_sample_rate<L>(
        feed: F,
        config: TunerConfig,
        requested_sample_rate: u32,
        listener: L,
    ) -> Result<Self, TunerError>
    where
        L: PitchListener + 'static,
    {
        let engine = PitchEngine::new(config.clone(), requested_sample_rate)?;
        Ok(Self {
            feed,
            config,
            requested_sample_rate,
            listener: Arc::new(Mutex::new(listener)),
            engine: Some(engine),
            worker: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    /// The idle engine; `None` while running, when the worker owns it.
    pub fn engine(&self) -> Option<&PitchEngine> {
        self.engine.as_ref()
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Acquires the audio feed and starts analysing.
    ///
    /// All transient state is reset first. If the feed cannot be acquired the
    /// tuner stays stopped and the error is returned once; calling `start`
    /// again retries. Starting a running tuner does nothing.
    pub fn start(&mut self) -> Result<(), TunerError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let mut engine = self.take_engine();
        if let Err(err) = engine.set_sample_rate(self.requested_sample_rate) {
            self.engine = Some(engine);
            return Err(err.into());
        }
        engine.reset();

        let (sender, receiver) = crossbeam_channel::unbounded();
        if let Err(err) = self
            .feed
            .start(self.requested_sample_rate, FeedSender::new(sender.clone()))
        {
            log::warn!("Audio feed unavailable: {err:#}");
            self.feed.stop();
            self.engine = Some(engine);
            return Err(TunerError::FeedUnavailable(err));
        }

        let listener = Arc::clone(&self.listener);
        let handle = thread::spawn(move || run_worker(engine, receiver, listener));
        self.worker = Some(AnalysisWorker { sender, handle });
        log::info!("Tuner started (requested {} Hz)", self.requested_sample_rate);
        Ok(())
    }

    /// Releases the feed and stops the worker after it has analysed
    /// everything already delivered. Safe to call at any time.
    pub fn stop(&mut self) {
        self.feed.stop();
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.sender.send(FeedMessage::Shutdown);
        let engine = match worker.handle.join() {
            Ok(engine) => engine,
            Err(_) => {
                log::error!("Analysis worker panicked; rebuilding the engine");
                self.fresh_engine()
            }
        };
        self.engine = Some(engine);
        log::info!("Tuner stopped");
    }

    /// Validates and applies a new configuration.
    ///
    /// While stopped it takes effect immediately. While running it is queued
    /// behind the audio already delivered and applied between hops. An
    /// invalid configuration changes nothing.
    pub fn apply_config(&mut self, config: TunerConfig) -> Result<(), TunerError> {
        config.validate()?;
        if let Some(worker) = &self.worker {
            let _ = worker.sender.send(FeedMessage::Reconfigure(config.clone()));
        } else if let Some(engine) = &mut self.engine {
            engine.apply_config(config.clone())?;
        }
        log::info!(
            "Configuration applied (window {}, hop {}, {} targets)",
            config.window_size,
            config.hop_size(),
            config.targets.len()
        );
        self.config = config;
        Ok(())
    }

    fn take_engine(&mut self) -> PitchEngine {
        match self.engine.take() {
            Some(engine) => engine,
            None => self.fresh_engine(),
        }
    }

    fn fresh_engine(&self) -> PitchEngine {
        PitchEngine::from_validated(self.config.clone(), self.requested_sample_rate)
    }
}

impl<F: AudioFeed> Drop for Tuner<F> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(listener: &SharedListener) -> MutexGuard<'_, dyn PitchListener + 'static> {
    listener.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_worker(
    mut engine: PitchEngine,
    receiver: Receiver<FeedMessage>,
    listener: SharedListener,
) -> PitchEngine {
    log::debug!("Analysis worker running");
    for message in receiver.iter() {
        match message {
            FeedMessage::Pcm(chunk) => {
                let mut listener = lock(&listener);
                engine.process(&chunk, |result| listener.on_pitch(result));
            }
            FeedMessage::SampleRate(sample_rate) => {
                if let Err(err) = engine.set_sample_rate(sample_rate) {
                    log::warn!("Ignoring negotiated sample rate: {err}");
                }
            }
            FeedMessage::Backend(backend) => {
                log::info!("Audio backend: {backend}");
                lock(&listener).on_backend_selected(&backend);
            }
            FeedMessage::Reconfigure(config) => {
                if let Err(err) = engine.apply_config(config) {
                    log::warn!("Rejected configuration: {err}");
                }
            }
            FeedMessage::Shutdown => break,
        }
    }
    log::debug!("Analysis worker finished");
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PitchResult;

    struct Count(usize);

    impl PitchListener for Count {
        fn on_pitch(&mut self, _result: PitchResult) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_lock_survives_a_poisoned_listener() {
        let listener: SharedListener = Arc::new(Mutex::new(Count(0)));
        let poisoner = Arc::clone(&listener);
        let outcome = thread::spawn(move || {
            let _guard = poisoner.lock();
            panic!("listener panicked mid-hop");
        })
        .join();
        assert!(outcome.is_err());
        assert!(listener.is_poisoned());

        lock(&listener).on_pitch(PitchResult::no_signal(-200.0));
        lock(&listener).on_backend_selected("test");
    }
}
