//! Maps a `DetectionResult` onto a caregiver-facing `Diagnosis`.
//! Selection is severity-first, then list order: the first alert in the highest
//! severity band present becomes the primary finding.

use tracing::debug;

use crate::model::{Alert, DetectionResult, Diagnosis, MedicalAttention, Severity};

const NORMAL_CONFIDENCE: f32 = 0.8;

/// Severity bands, highest first. Medium and low share a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Band {
    Routine,
    High,
    Critical,
}

impl Band {
    fn of(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Band::Critical,
            Severity::High => Band::High,
            Severity::Medium | Severity::Low => Band::Routine,
        }
    }

    fn attention(self) -> MedicalAttention {
        match self {
            Band::Critical => MedicalAttention::Emergency,
            Band::High => MedicalAttention::Consult,
            Band::Routine => MedicalAttention::Monitor,
        }
    }

    fn boilerplate(self) -> &'static str {
        match self {
            Band::Critical => "Seek immediate medical evaluation",
            Band::High => "Schedule a consultation with your pediatrician",
            Band::Routine => "Continue monitoring and note any changes",
        }
    }
}

/// Stateless diagnosis engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosisEngine;

impl DiagnosisEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn diagnose(&self, result: &DetectionResult) -> Diagnosis {
        let Some(primary) = primary_alert(&result.alerts) else {
            return normal();
        };
        let band = Band::of(primary.severity);
        debug!(
            primary = %primary.alert_type,
            severity = %primary.severity,
            alerts = result.alerts.len(),
            "diagnosis_selected"
        );

        Diagnosis {
            primary: primary.alert_type.label().to_string(),
            description: primary.description.clone(),
            recommendations: vec![primary.recommendation.clone(), band.boilerplate().to_string()],
            medical_attention: band.attention(),
            confidence: primary.confidence,
            tags: vec![
                primary.severity.as_str().to_string(),
                primary.alert_type.as_str().to_string(),
            ],
        }
    }
}

/// First alert in list order among those in the highest band present.
fn primary_alert(alerts: &[Alert]) -> Option<&Alert> {
    let top = alerts.iter().map(|a| Band::of(a.severity)).max()?;
    alerts.iter().find(|a| Band::of(a.severity) == top)
}

fn normal() -> Diagnosis {
    Diagnosis {
        primary: "Normal Cry".to_string(),
        description: "No concerning acoustic patterns detected.".to_string(),
        recommendations: vec!["Continue routine care".to_string()],
        medical_attention: MedicalAttention::None,
        confidence: NORMAL_CONFIDENCE,
        tags: vec!["normal".to_string(), "healthy".to_string()],
    }
}

/// Diagnose with the default engine.
pub fn diagnose(result: &DetectionResult) -> Diagnosis {
    DiagnosisEngine::new().diagnose(result)
}
