//! Cry pipeline metrics: a latency window per pipeline stage and counters for
//! what the monitor saw (blocks, confirmed cries, gate rejections, failures).
//! Shared as `Arc<MetricsRegistry>` between the monitor and the blob writer.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

/// Latencies kept per stage; older samples fall out of the window.
const DEFAULT_WINDOW: usize = 512;

/// One timed step of turning audio into a stored cry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// One block through the detector, validation included.
    Detect,
    Extract,
    Analyze,
    Diagnose,
    /// Metadata append to the history log.
    Persist,
    /// Background audio attachment write.
    BlobPersist,
    /// Confirmation to stored instance.
    Pipeline,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Detect,
        Stage::Extract,
        Stage::Analyze,
        Stage::Diagnose,
        Stage::Persist,
        Stage::BlobPersist,
        Stage::Pipeline,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Detect => "detect",
            Stage::Extract => "extract",
            Stage::Analyze => "analyze",
            Stage::Diagnose => "diagnose",
            Stage::Persist => "persist",
            Stage::BlobPersist => "blob_persist",
            Stage::Pipeline => "pipeline",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event counts kept by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    BlocksProcessed,
    CriesConfirmed,
    /// Confirmed by the detector, rejected by the analyzer's cry gate.
    GateRejected,
    PersistFailures,
    BlobFailures,
}

impl Counter {
    fn index(self) -> usize {
        match self {
            Counter::BlocksProcessed => 0,
            Counter::CriesConfirmed => 1,
            Counter::GateRejected => 2,
            Counter::PersistFailures => 3,
            Counter::BlobFailures => 4,
        }
    }
}

/// Most recent latencies of one stage, in microseconds.
#[derive(Debug, Default)]
struct LatencyWindow {
    samples: VecDeque<u64>,
    total: u64,
}

impl LatencyWindow {
    fn push(&mut self, micros: u64, capacity: usize) {
        if self.samples.len() == capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(micros);
        self.total += 1;
    }

    fn summary(&self) -> StageSummary {
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        StageSummary {
            recorded: self.total,
            p50_us: nearest_rank(&sorted, 0.50),
            p95_us: nearest_rank(&sorted, 0.95),
            p99_us: nearest_rank(&sorted, 0.99),
            max_us: sorted.last().copied().unwrap_or(0),
        }
    }
}

/// Nearest-rank quantile of sorted samples; 0 when empty.
fn nearest_rank(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (q.clamp(0.0, 1.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Latency digest of one stage over the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    /// Samples recorded since start, including ones that left the window.
    pub recorded: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub stages: BTreeMap<Stage, StageSummary>,
    pub blocks_processed: u64,
    pub cries_confirmed: u64,
    pub gate_rejected: u64,
    pub persist_failures: u64,
    pub blob_failures: u64,
}

pub struct MetricsRegistry {
    stages: Mutex<HashMap<Stage, LatencyWindow>>,
    counters: [AtomicU64; 5],
    window: usize,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// Keep the latest `window` latencies per stage.
    pub fn with_window(window: usize) -> Self {
        Self {
            stages: Mutex::new(HashMap::new()),
            counters: Default::default(),
            window: window.max(1),
        }
    }

    pub fn record(&self, stage: Stage, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.stages
            .lock()
            .entry(stage)
            .or_default()
            .push(micros, self.window);
        debug!(stage = %stage, elapsed_us = micros, "stage_timed");
    }

    /// Run `f`, recording its wall time under `stage`.
    pub fn time<T>(&self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(stage, start.elapsed());
        out
    }

    pub fn incr(&self, counter: Counter) {
        self.counters[counter.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn counter(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Samples recorded for `stage` since start.
    pub fn recorded(&self, stage: Stage) -> u64 {
        self.stages.lock().get(&stage).map_or(0, |w| w.total)
    }

    pub fn stage_summary(&self, stage: Stage) -> Option<StageSummary> {
        self.stages.lock().get(&stage).map(LatencyWindow::summary)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let stages = self
            .stages
            .lock()
            .iter()
            .map(|(&stage, window)| (stage, window.summary()))
            .collect();
        MetricsSnapshot {
            stages,
            blocks_processed: self.counter(Counter::BlocksProcessed),
            cries_confirmed: self.counter(Counter::CriesConfirmed),
            gate_rejected: self.counter(Counter::GateRejected),
            persist_failures: self.counter(Counter::PersistFailures),
            blob_failures: self.counter(Counter::BlobFailures),
        }
    }

    /// One `info!` line per stage seen so far, then the counters.
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        for (stage, s) in &snapshot.stages {
            info!(
                stage = %stage,
                recorded = s.recorded,
                p50_us = s.p50_us,
                p95_us = s.p95_us,
                p99_us = s.p99_us,
                max_us = s.max_us,
                "stage_latency"
            );
        }
        info!(
            blocks = snapshot.blocks_processed,
            cries = snapshot.cries_confirmed,
            gate_rejected = snapshot.gate_rejected,
            persist_failures = snapshot.persist_failures,
            blob_failures = snapshot.blob_failures,
            "cry_pipeline_counters"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us(n: u64) -> Duration {
        Duration::from_micros(n)
    }

    #[test]
    fn test_stage_quantiles() {
        let metrics = MetricsRegistry::new();
        for v in 1..=100 {
            metrics.record(Stage::Analyze, us(v));
        }
        let s = metrics.stage_summary(Stage::Analyze).unwrap();
        assert_eq!((s.p50_us, s.p95_us, s.p99_us, s.max_us), (50, 95, 99, 100));
        assert_eq!(s.recorded, 100);
        assert!(metrics.stage_summary(Stage::Diagnose).is_none());
    }

    #[test]
    fn test_window_drops_oldest() {
        let metrics = MetricsRegistry::with_window(4);
        for v in [900, 900, 1, 2, 3, 4] {
            metrics.record(Stage::Detect, us(v));
        }
        let s = metrics.stage_summary(Stage::Detect).unwrap();
        assert_eq!(s.max_us, 4);
        assert_eq!(s.p50_us, 2);
        assert_eq!(metrics.recorded(Stage::Detect), 6);
    }

    #[test]
    fn test_time_records_and_returns() {
        let metrics = MetricsRegistry::new();
        let out = metrics.time(Stage::Extract, || 7);
        assert_eq!(out, 7);
        assert_eq!(metrics.recorded(Stage::Extract), 1);
        assert_eq!(metrics.recorded(Stage::BlobPersist), 0);
    }

    #[test]
    fn test_counters_and_snapshot() {
        let metrics = MetricsRegistry::new();
        for _ in 0..3 {
            metrics.incr(Counter::BlocksProcessed);
        }
        metrics.incr(Counter::CriesConfirmed);
        metrics.incr(Counter::BlobFailures);
        metrics.record(Stage::Pipeline, us(250));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.blocks_processed, 3);
        assert_eq!(snapshot.cries_confirmed, 1);
        assert_eq!(snapshot.gate_rejected, 0);
        assert_eq!(snapshot.blob_failures, 1);
        assert_eq!(snapshot.stages[&Stage::Pipeline].p99_us, 250);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["stages"]["pipeline"]["recorded"], 1);
        assert_eq!(Stage::ALL.len(), 7);
        assert_eq!(Stage::BlobPersist.to_string(), "blob_persist");
    }
}
