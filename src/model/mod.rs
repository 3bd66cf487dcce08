//! Shared data model: features, alerts, detection results, diagnoses and the
//! persisted `CryInstance` record.
//! Values are created once per detection event and never mutated afterwards.

pub mod date;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Acoustic features of one audio segment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioFeatures {
    /// Per-frame F0 estimates (Hz) of voiced frames, in temporal order.
    pub f0: Vec<f32>,
    pub f0_mean: f32,
    pub f0_std: f32,
    /// Mean and spread of voiced-frame F0 with the search extended up to
    /// 2 kHz, so shrill cries above the cry band are not folded an octave down.
    pub extended_f0_mean: f32,
    pub extended_f0_std: f32,
    /// Harmonics-to-noise ratio (dB).
    pub hnr: f32,
    /// Cycle-to-cycle period perturbation (%).
    pub jitter: f32,
    /// Cycle-to-cycle amplitude perturbation (%).
    pub shimmer: f32,
    pub rms: f32,
    /// Spread of the 10 ms RMS envelope.
    pub intensity_std: f32,
    pub spectral_centroid: f32,
    pub spectral_flatness: f32,
    pub voiced_segment_lengths: Vec<f32>,
    /// Per voiced segment: F0 std / mean of the voiced frames inside it, `None`
    /// when no frame in the segment carried a pitch.
    pub segment_f0_stability: Vec<Option<f32>>,
    pub pause_lengths: Vec<f32>,
    pub burst_lengths: Vec<f32>,
    pub repetition_rate: f32,
    pub nasal_energy_ratio: f32,
    pub low_mid_harmonics: f32,
    pub duration: f32,
    pub sample_rate: u32,
}

impl AudioFeatures {
    /// All-zero features: the sentinel for empty or unusable input.
    pub fn empty(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    /// Whether any frame was voiced.
    pub fn is_voiced(&self) -> bool {
        !self.f0.is_empty()
    }
}

/// Mean and population standard deviation of an F0 track. `(0, 0)` when empty.
pub fn f0_stats(f0: &[f32]) -> (f32, f32) {
    if f0.is_empty() {
        return (0.0, 0.0);
    }
    let n = f0.len() as f64;
    let mean = f0.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = f0.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    (mean as f32, variance.sqrt() as f32)
}

/// Clinical pattern an alert refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Hyperphonation,
    Hoarseness,
    CriDuChat,
    WeakCry,
    Grunting,
    SeriousIllness,
    HearingImpairment,
    Hypernasality,
}

impl AlertType {
    /// Wire name, as persisted.
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::Hyperphonation => "hyperphonation",
            AlertType::Hoarseness => "hoarseness",
            AlertType::CriDuChat => "cri_du_chat",
            AlertType::WeakCry => "weak_cry",
            AlertType::Grunting => "grunting",
            AlertType::SeriousIllness => "serious_illness",
            AlertType::HearingImpairment => "hearing_impairment",
            AlertType::Hypernasality => "hypernasality",
        }
    }

    /// Human-readable diagnosis label.
    pub fn label(self) -> &'static str {
        match self {
            AlertType::Hyperphonation => "Hyperphonation",
            AlertType::Hoarseness => "Hoarse Cry",
            AlertType::CriDuChat => "Cri du Chat Pattern",
            AlertType::WeakCry => "Weak Cry",
            AlertType::Grunting => "Expiratory Grunting",
            AlertType::SeriousIllness => "Serious Illness Indicators",
            AlertType::HearingImpairment => "Hearing Impairment Cues",
            AlertType::Hypernasality => "Hypernasal Resonance",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity, ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall risk of a detection, derived from the worst alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl From<Severity> for RiskLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => RiskLevel::Low,
            Severity::Medium => RiskLevel::Medium,
            Severity::High => RiskLevel::High,
            Severity::Critical => RiskLevel::Critical,
        }
    }
}

impl RiskLevel {
    /// Maximum severity present in `alerts`; `Low` when there are none.
    pub fn from_alerts(alerts: &[Alert]) -> Self {
        alerts
            .iter()
            .map(|a| a.severity)
            .max()
            .map(RiskLevel::from)
            .unwrap_or_default()
    }
}

/// One clinically-styled finding about a cry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: Severity,
    /// Confidence in [0, 1].
    pub confidence: f32,
    pub message: String,
    pub description: String,
    pub recommendation: String,
}

/// Whole-clip cry gate: does this audio sound like an infant cry at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryCheck {
    pub is_cry: bool,
    /// Confidence in [0, 1].
    pub confidence: f32,
}

/// Features plus the alerts raised for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    #[serde(with = "date")]
    pub timestamp: DateTime<Utc>,
    pub features: AudioFeatures,
    pub alerts: Vec<Alert>,
    pub risk_level: RiskLevel,
    /// Cry gate outcome, when the analyzer ran one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cry_check: Option<CryCheck>,
}

impl DetectionResult {
    /// Build a result stamped now; `risk_level` follows the alerts.
    pub fn new(features: AudioFeatures, alerts: Vec<Alert>) -> Self {
        Self::at(date::now_millis(), features, alerts)
    }

    pub fn at(timestamp: DateTime<Utc>, features: AudioFeatures, alerts: Vec<Alert>) -> Self {
        let risk_level = RiskLevel::from_alerts(&alerts);
        Self {
            timestamp: date::truncate_to_millis(timestamp),
            features,
            alerts,
            risk_level,
            cry_check: None,
        }
    }

    pub fn with_cry_check(mut self, check: CryCheck) -> Self {
        self.cry_check = Some(check);
        self
    }
}

/// How urgently a caregiver should involve a clinician.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MedicalAttention {
    None,
    Monitor,
    Consult,
    Urgent,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    pub primary: String,
    pub description: String,
    pub recommendations: Vec<String>,
    pub medical_attention: MedicalAttention,
    pub confidence: f32,
    pub tags: Vec<String>,
}

/// Rule-based cry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CryType {
    Pain,
    Discomfort,
    Hunger,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryClassification {
    pub cry_type: CryType,
    pub confidence: f32,
}

/// Canonical babbling ratio of a vocalization and the age-specific reading of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalBabbling {
    /// Canonical syllables over all syllables, 0 when there are none.
    pub cbr: f32,
    pub age_months: u32,
    pub total_syllables: usize,
    pub canonical_syllables: usize,
    pub recommendations: Vec<String>,
    /// Whether the ratio is interpretable at this age (7 to 12 months).
    pub age_appropriate: bool,
}

/// A persisted detection: what was heard, what it means, and where its audio lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryInstance {
    pub id: String,
    #[serde(with = "date")]
    pub timestamp: DateTime<Utc>,
    pub duration: f32,
    pub features: AudioFeatures,
    pub alerts: Vec<Alert>,
    pub diagnosis: Diagnosis,
    pub risk_level: RiskLevel,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cry_type: Option<CryClassification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_reference: Option<String>,
}

impl CryInstance {
    /// Fold a detection and its diagnosis into a new record with a fresh id.
    pub fn new(result: DetectionResult, diagnosis: Diagnosis) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: result.timestamp,
            duration: result.features.duration,
            confidence: diagnosis.confidence,
            risk_level: result.risk_level,
            features: result.features,
            alerts: result.alerts,
            diagnosis,
            cry_type: None,
            audio_reference: None,
        }
    }

    pub fn with_cry_type(mut self, classification: CryClassification) -> Self {
        self.cry_type = Some(classification);
        self
    }
}
