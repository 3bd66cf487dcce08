//! Streaming cry detector: Idle → Accumulating → (validated) → Idle.
//! Driven synchronously by the caller's audio block cadence; no timers.
//! Elapsed time is measured on an injected clock between the first loud block
//! and the block being processed.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel as cb;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio::compute_rms;
use crate::features::pitch;
use crate::features::spectral::SpectrumAnalyzer;
use crate::model::AudioFeatures;

/// Detector states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DetectorState {
    Idle,
    Accumulating,
}

impl std::fmt::Display for DetectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorState::Idle => write!(f, "Idle"),
            DetectorState::Accumulating => write!(f, "Accumulating"),
        }
    }
}

/// Detector thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Block RMS (normalized 0..1) above which audio counts as cry activity.
    pub cry_threshold: f32,
    /// Elapsed time after which a still-loud buffer is validated (s).
    pub confirm_after_secs: f32,
    /// Blocks required (exclusive) before validating a still-loud buffer.
    pub confirm_min_blocks: usize,
    /// Elapsed time required to validate a buffer when activity stops (s).
    pub release_min_secs: f32,
    /// Blocks required (exclusive) to validate a buffer when activity stops.
    pub release_min_blocks: usize,
    pub min_f0_hz: f32,
    pub max_f0_hz: f32,
    /// Spectral centroid the buffer must exceed (Hz).
    pub min_centroid_hz: f32,
    /// Buffered audio required for validation (s).
    pub min_validation_secs: f32,
    /// Most recent audio the F0 and centroid guards look at (s).
    pub validation_window_secs: f32,
    /// Buffered audio kept for the confirmation (s). Oldest blocks are dropped beyond this.
    pub max_buffered_secs: f32,
    /// Capacity of each subscriber channel.
    pub event_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            cry_threshold: 0.1,
            confirm_after_secs: 0.5,
            confirm_min_blocks: 20,
            release_min_secs: 0.3,
            release_min_blocks: 10,
            min_f0_hz: pitch::CRY_MIN_F0_HZ,
            max_f0_hz: pitch::CRY_MAX_F0_HZ,
            min_centroid_hz: 500.0,
            min_validation_secs: 0.3,
            validation_window_secs: 1.0,
            max_buffered_secs: 10.0,
            event_capacity: 32,
        }
    }
}

/// Time source for elapsed-duration checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for replaying recorded block sequences.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// A validated cry: minimal features plus the audio that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct CryConfirmation {
    pub features: AudioFeatures,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Event published to subscribers on each confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct CryEvent {
    pub features: AudioFeatures,
    /// Wall time from the first loud block to confirmation.
    pub elapsed: Duration,
}

pub type CallbackResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Confirmation callback. Errors are logged and otherwise ignored.
pub type CryCallback = Box<dyn FnMut(&AudioFeatures) -> CallbackResult + Send>;

/// Why a block triggered validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Sustained,
    Released,
}

pub struct CryDetector {
    config: DetectorConfig,
    clock: Box<dyn Clock>,
    state: DetectorState,
    blocks: VecDeque<Vec<f32>>,
    buffered_samples: usize,
    sample_rate: u32,
    spectrum: Option<SpectrumAnalyzer>,
    started_at: Option<Instant>,
    callback: Option<CryCallback>,
    subscribers: Vec<cb::Sender<CryEvent>>,
}

impl CryDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock))
    }

    pub fn with_clock(config: DetectorConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: DetectorState::Idle,
            blocks: VecDeque::new(),
            buffered_samples: 0,
            sample_rate: 0,
            spectrum: None,
            started_at: None,
            callback: None,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn buffered_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn buffered_samples(&self) -> usize {
        self.buffered_samples
    }

    /// Samples the next validation would analyze.
    pub fn validation_window_len(&self) -> usize {
        self.buffered_samples.min(self.window_cap())
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Register the confirmation callback, replacing any previous one.
    pub fn on_cry(&mut self, callback: CryCallback) {
        self.callback = Some(callback);
    }

    /// Bounded channel of confirmation events. A full channel drops events.
    pub fn subscribe(&mut self) -> cb::Receiver<CryEvent> {
        let (tx, rx) = cb::bounded(self.config.event_capacity.max(1));
        self.subscribers.push(tx);
        rx
    }

    /// Process one block. Returns true iff a cry was confirmed on this call.
    pub fn process_audio_block(&mut self, samples: &[f32], sample_rate: u32) -> bool {
        self.process_block(samples, sample_rate).is_some()
    }

    /// Process one block, returning the confirmation if a cry was validated.
    pub fn process_block(&mut self, samples: &[f32], sample_rate: u32) -> Option<CryConfirmation> {
        if samples.is_empty() || sample_rate == 0 {
            return None;
        }
        let rms = compute_rms(samples);
        let loud = rms.is_finite() && rms > self.config.cry_threshold;

        match (self.state, loud) {
            (DetectorState::Idle, false) => None,
            (DetectorState::Idle, true) => {
                self.start(samples, sample_rate);
                None
            }
            (DetectorState::Accumulating, true) => {
                if sample_rate != self.sample_rate {
                    warn!(from = self.sample_rate, to = sample_rate, "sample rate changed, restarting accumulation");
                    self.start(samples, sample_rate);
                    return None;
                }
                self.push(samples);
                if self.ready(Trigger::Sustained) {
                    let elapsed = self.elapsed();
                    let confirmation = self.validate();
                    if confirmation.is_some() {
                        self.reset();
                    }
                    return confirmation.map(|c| self.deliver(c, elapsed));
                }
                None
            }
            (DetectorState::Accumulating, false) => {
                let elapsed = self.elapsed();
                let confirmation = if self.ready(Trigger::Released) {
                    self.validate()
                } else {
                    None
                };
                debug!(blocks = self.blocks.len(), confirmed = confirmation.is_some(), "activity_ended");
                self.reset();
                confirmation.map(|c| self.deliver(c, elapsed))
            }
        }
    }

    fn start(&mut self, samples: &[f32], sample_rate: u32) {
        self.blocks.clear();
        self.blocks.push_back(samples.to_vec());
        self.buffered_samples = samples.len();
        self.sample_rate = sample_rate;
        self.started_at = Some(self.clock.now());
        self.state = DetectorState::Accumulating;
        debug!(sample_rate, "accumulation_started");
    }

    fn push(&mut self, samples: &[f32]) {
        self.blocks.push_back(samples.to_vec());
        self.buffered_samples += samples.len();
        let max = self.secs_to_samples(self.config.max_buffered_secs);
        while self.buffered_samples > max && self.blocks.len() > 1 {
            if let Some(dropped) = self.blocks.pop_front() {
                self.buffered_samples -= dropped.len();
            }
        }
    }

    fn secs_to_samples(&self, secs: f32) -> usize {
        (secs.max(0.0) as f64 * self.sample_rate as f64) as usize
    }

    fn window_cap(&self) -> usize {
        self.secs_to_samples(self.config.validation_window_secs).max(1)
    }

    /// The newest `len` buffered samples, oldest first.
    fn recent_samples(&self, len: usize) -> Vec<f32> {
        let mut skip = self.buffered_samples.saturating_sub(len);
        let mut out = Vec::with_capacity(len.min(self.buffered_samples));
        for block in &self.blocks {
            if skip >= block.len() {
                skip -= block.len();
                continue;
            }
            out.extend_from_slice(&block[skip..]);
            skip = 0;
        }
        out
    }

    /// Centroid of `window`, reusing the FFT plan while the window size is unchanged.
    fn centroid(&mut self, window: &[f32]) -> f32 {
        if window.is_empty() {
            return 0.0;
        }
        let analyzer = match self.spectrum.take() {
            Some(a) if a.size() == window.len() => a,
            _ => SpectrumAnalyzer::new(window.len()),
        };
        let centroid = analyzer.magnitudes(window, self.sample_rate).centroid();
        self.spectrum = Some(analyzer);
        centroid
    }

    fn elapsed(&self) -> Duration {
        self.started_at
            .map(|t| self.clock.now().saturating_duration_since(t))
            .unwrap_or_default()
    }

    fn ready(&self, trigger: Trigger) -> bool {
        let (min_secs, min_blocks) = match trigger {
            Trigger::Sustained => (self.config.confirm_after_secs, self.config.confirm_min_blocks),
            Trigger::Released => (self.config.release_min_secs, self.config.release_min_blocks),
        };
        self.elapsed().as_secs_f32() >= min_secs && self.blocks.len() > min_blocks
    }

    /// F0 and centroid guards over the most recent window, duration guard over
    /// the whole buffer. Per-block cost is bounded by the window, not the buffer.
    fn validate(&mut self) -> Option<CryConfirmation> {
        let sample_rate = self.sample_rate;
        let duration = self.buffered_samples as f32 / sample_rate as f32;
        let window = self.recent_samples(self.window_cap());
        let f0 = pitch::estimate_f0(&window, sample_rate);
        let centroid = self.centroid(&window);

        let accepted = f0 >= self.config.min_f0_hz
            && f0 <= self.config.max_f0_hz
            && centroid > self.config.min_centroid_hz
            && duration >= self.config.min_validation_secs;

        debug!(f0, centroid, duration, window = window.len(), accepted, "cry_validation");
        if !accepted {
            return None;
        }

        let samples: Vec<f32> = self.blocks.iter().flatten().copied().collect();
        let features = AudioFeatures {
            f0: vec![f0],
            f0_mean: f0,
            rms: compute_rms(&samples),
            spectral_centroid: centroid,
            duration,
            sample_rate,
            ..AudioFeatures::default()
        };
        Some(CryConfirmation {
            features,
            samples,
            sample_rate,
        })
    }

    fn reset(&mut self) {
        self.blocks.clear();
        self.buffered_samples = 0;
        self.started_at = None;
        self.state = DetectorState::Idle;
    }

    /// Notify the callback and subscribers. Runs after the reset to Idle.
    fn deliver(&mut self, confirmation: CryConfirmation, elapsed: Duration) -> CryConfirmation {
        info!(
            f0 = confirmation.features.f0_mean,
            centroid = confirmation.features.spectral_centroid,
            duration = confirmation.features.duration,
            elapsed_ms = elapsed.as_millis() as u64,
            "cry_confirmed"
        );

        if let Some(callback) = self.callback.as_mut() {
            match catch_unwind(AssertUnwindSafe(|| callback(&confirmation.features))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "cry callback failed"),
                Err(_) => warn!("cry callback panicked"),
            }
        }

        let event = CryEvent {
            features: confirmation.features.clone(),
            elapsed,
        };
        self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(cb::TrySendError::Full(_)) => {
                warn!("cry event channel full, event dropped");
                true
            }
            Err(cb::TrySendError::Disconnected(_)) => false,
        });

        confirmation
    }
}
