//! End-to-end cry monitoring: detector → extractor → analyzer → diagnosis →
//! history. `spawn` runs a monitor on a dedicated thread fed by audio blocks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel as cb;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::analysis::CryAnalyzer;
use crate::audio::{encode_wav, samples_from_i16, WAV_MIME};
use crate::config::CoreConfig;
use crate::detector::CryDetector;
use crate::diagnosis::DiagnosisEngine;
use crate::error::{PersistError, StoreError};
use crate::features::FeatureExtractor;
use crate::history::{BlobReceipt, HistoryStore};
use crate::metrics::{Counter, MetricsRegistry, Stage};
use crate::model::CryInstance;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Store the captured cry as a WAV attachment.
    pub attach_audio: bool,
    /// How long the worker waits for a block before re-checking the stop flag (ms).
    pub poll_interval_ms: u64,
    /// Capacity of the instance output channel.
    pub output_capacity: usize,
    /// Uncollected blob receipts kept; the oldest is dropped beyond this.
    pub max_pending_receipts: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            attach_audio: true,
            poll_interval_ms: 20,
            output_capacity: 16,
            max_pending_receipts: 64,
        }
    }
}

/// One block of mono audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBlock {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn from_i16(samples: &[i16], sample_rate: u32) -> Self {
        Self::new(samples_from_i16(samples), sample_rate)
    }
}

pub struct CryMonitor {
    config: MonitorConfig,
    detector: CryDetector,
    extractor: FeatureExtractor,
    analyzer: CryAnalyzer,
    engine: DiagnosisEngine,
    store: Arc<HistoryStore>,
    metrics: Arc<MetricsRegistry>,
    receipts: VecDeque<BlobReceipt>,
}

impl CryMonitor {
    pub fn new(config: CoreConfig, store: Arc<HistoryStore>, metrics: Arc<MetricsRegistry>) -> Self {
        let mut analysis = config.analysis;
        // Hyperphonation runs are counted in extractor hops.
        analysis.hop_size = config.extractor.hop_size;
        Self {
            config: config.monitor,
            detector: CryDetector::new(config.detector),
            extractor: FeatureExtractor::new(config.extractor),
            analyzer: CryAnalyzer::new(analysis),
            engine: DiagnosisEngine::new(),
            store,
            metrics,
            receipts: VecDeque::new(),
        }
    }

    /// Replace the detector, e.g. one driven by a manual clock.
    pub fn with_detector(mut self, detector: CryDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn detector(&self) -> &CryDetector {
        &self.detector
    }

    /// For registering callbacks and subscribers.
    pub fn detector_mut(&mut self) -> &mut CryDetector {
        &mut self.detector
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Receipts of audio attachments not yet collected, oldest first.
    pub fn take_blob_receipts(&mut self) -> Vec<BlobReceipt> {
        self.receipts.drain(..).collect()
    }

    /// Feed one block. `Ok(Some)` is the stored instance of a cry this block
    /// completed. `Err` means a cry was detected but its record was not stored.
    pub fn process_audio_block(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Option<CryInstance>, PersistError> {
        self.metrics.incr(Counter::BlocksProcessed);
        let confirmation = self
            .metrics
            .time(Stage::Detect, || self.detector.process_block(samples, sample_rate));
        let Some(confirmation) = confirmation else {
            return Ok(None);
        };
        self.metrics.incr(Counter::CriesConfirmed);
        let started = Instant::now();

        let features = self.metrics.time(Stage::Extract, || {
            self.extractor.extract(&confirmation.samples, confirmation.sample_rate)
        });
        let (result, classification) = self.metrics.time(Stage::Analyze, || {
            let result = self.analyzer.analyze(features);
            let classification = self.analyzer.classify(&result.features);
            (result, classification)
        });
        if result.cry_check.is_some_and(|check| !check.is_cry) {
            self.metrics.incr(Counter::GateRejected);
        }
        let diagnosis = self.metrics.time(Stage::Diagnose, || self.engine.diagnose(&result));

        let mut instance = CryInstance::new(result, diagnosis).with_cry_type(classification);

        let persist_started = Instant::now();
        let outcome = self.persist(&mut instance, &confirmation.samples, confirmation.sample_rate);
        self.metrics.record(Stage::Persist, persist_started.elapsed());
        if let Err(source) = outcome {
            self.metrics.incr(Counter::PersistFailures);
            warn!(id = %instance.id, error = %source, "cry instance not persisted");
            return Err(PersistError {
                instance: Box::new(instance),
                source,
            });
        }

        self.metrics.record(Stage::Pipeline, started.elapsed());
        info!(
            id = %instance.id,
            primary = %instance.diagnosis.primary,
            risk = ?instance.risk_level,
            alerts = instance.alerts.len(),
            "cry_recorded"
        );
        Ok(Some(instance))
    }

    fn persist(&mut self, instance: &mut CryInstance, samples: &[f32], sample_rate: u32) -> Result<(), StoreError> {
        let audio = if self.config.attach_audio {
            match encode_wav(samples, sample_rate) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(id = %instance.id, error = %e, "wav encoding failed, storing metadata only");
                    None
                }
            }
        } else {
            None
        };

        match audio {
            Some(bytes) => {
                let receipt = self.store.append_with_audio(instance.clone(), bytes, WAV_MIME)?;
                instance.audio_reference = Some(instance.id.clone());
                self.keep_receipt(receipt);
            }
            None => self.store.append(instance.clone())?,
        }
        Ok(())
    }

    fn keep_receipt(&mut self, receipt: BlobReceipt) {
        if self.receipts.len() >= self.config.max_pending_receipts.max(1) {
            if let Some(dropped) = self.receipts.pop_front() {
                debug!(id = %dropped.id(), "uncollected blob receipt dropped");
            }
        }
        self.receipts.push_back(receipt);
    }
}

/// Keeps a spawned monitor alive. Stops and joins the worker on drop.
pub struct MonitorHandle {
    stop_flag: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
    instances: cb::Receiver<CryInstance>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    /// Persisted instances, in detection order.
    pub fn instances(&self) -> &cb::Receiver<CryInstance> {
        &self.instances
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("cry monitor thread panicked");
            }
        }
    }
}

/// Run `monitor` on a dedicated thread reading from `blocks`. The worker exits
/// when stopped or when every block sender is dropped.
pub fn spawn(monitor: CryMonitor, blocks: cb::Receiver<AudioBlock>) -> std::io::Result<MonitorHandle> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let (tx, instances) = cb::bounded(monitor.config.output_capacity.max(1));

    let stop = Arc::clone(&stop_flag);
    let worker = std::thread::Builder::new()
        .name("cry-monitor".into())
        .spawn(move || run_monitor_loop(monitor, blocks, tx, stop))?;

    Ok(MonitorHandle {
        stop_flag,
        worker: Some(worker),
        instances,
    })
}

fn run_monitor_loop(
    mut monitor: CryMonitor,
    blocks: cb::Receiver<AudioBlock>,
    out: cb::Sender<CryInstance>,
    stop_flag: Arc<AtomicBool>,
) {
    let poll = Duration::from_millis(monitor.config.poll_interval_ms.max(1));
    info!("cry monitor loop started");

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            info!("cry monitor loop stopping");
            break;
        }

        let block = match blocks.recv_timeout(poll) {
            Ok(block) => block,
            Err(cb::RecvTimeoutError::Timeout) => continue,
            Err(cb::RecvTimeoutError::Disconnected) => {
                info!("audio source closed, cry monitor loop exiting");
                break;
            }
        };

        // Nobody collects receipts here; the store logs and counts blob failures.
        let stored = monitor.process_audio_block(&block.samples, block.sample_rate);
        monitor.receipts.clear();
        // Persist failures are already logged and counted by the monitor.
        if let Ok(Some(instance)) = stored {
            match out.try_send(instance) {
                Ok(()) => {}
                Err(cb::TrySendError::Full(instance)) => {
                    warn!(id = %instance.id, "instance channel full, event dropped")
                }
                Err(cb::TrySendError::Disconnected(_)) => {
                    debug!("instance receiver dropped");
                }
            }
        }
    }
    monitor.metrics.log_summary();
}
