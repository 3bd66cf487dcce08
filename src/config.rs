//! Top-level configuration: one section per component, loaded from JSON.
//! Every field has a default, so a partial file only overrides what it names.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::analysis::AnalysisConfig;
use crate::detector::DetectorConfig;
use crate::error::ConfigError;
use crate::features::ExtractorConfig;
use crate::history::StoreConfig;
use crate::monitor::MonitorConfig;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub detector: DetectorConfig,
    pub extractor: ExtractorConfig,
    pub analysis: AnalysisConfig,
    pub store: StoreConfig,
    pub monitor: MonitorConfig,
}

impl CoreConfig {
    /// Load configuration from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is missing or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load_from_file(path).unwrap_or_else(|e| {
            warn!(error = %e, path = %path.display(), "config load failed, using defaults");
            Self::default()
        })
    }
}
