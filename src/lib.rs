//! cryscope: infant cry detection and analysis core.
//! Streaming detection, acoustic feature extraction, rule-based analysis,
//! diagnosis mapping and a capped cry history with audio attachments.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod detector;
pub mod diagnosis;
pub mod error;
pub mod features;
pub mod history;
pub mod metrics;
pub mod model;
pub mod monitor;

pub use analysis::{AnalysisConfig, CryAnalyzer};
pub use config::CoreConfig;
pub use detector::{Clock, CryConfirmation, CryDetector, CryEvent, DetectorConfig, DetectorState, ManualClock, SystemClock};
pub use diagnosis::{diagnose, DiagnosisEngine};
pub use error::{ConfigError, EncodeError, PersistError, StorageError, StoreError};
pub use features::{extract_features, ExtractorConfig, FeatureExtractor};
pub use history::{BlobReceipt, HistoryStore, MemoryStorage, SqliteStorage, StoragePort, StoreConfig};
pub use metrics::{Counter, MetricsRegistry, MetricsSnapshot, Stage, StageSummary};
pub use model::{
    Alert, AlertType, AudioFeatures, CanonicalBabbling, CryCheck, CryClassification, CryInstance, CryType,
    DetectionResult, Diagnosis, MedicalAttention, RiskLevel, Severity,
};
pub use monitor::{spawn, AudioBlock, CryMonitor, MonitorConfig, MonitorHandle};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// `cryscope=debug` filter. Returns false if a subscriber was already set.
pub fn init_tracing() -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cryscope=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .is_ok()
}

/// Like [`init_tracing`], emitting one JSON object per event.
pub fn init_json_tracing() -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cryscope=debug"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .try_init()
        .is_ok()
}
