//! Rule-based cry analysis: turns `AudioFeatures` into a cry gate, alerts and
//! a cry-type guess. Every rule is a pure threshold check over the features.
//! Also scores canonical babbling for speech-development follow-up.

use serde::Deserialize;
use tracing::debug;

use crate::model::{
    Alert, AlertType, AudioFeatures, CanonicalBabbling, CryCheck, CryClassification, CryType, DetectionResult,
    Severity,
};

/// Thresholds for the alert rules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Hop between F0 frames (samples), used to turn frame runs into seconds.
    pub hop_size: usize,

    /// Only raise alerts for audio that passes the cry gate.
    pub cry_gate: bool,
    /// Open interval the extended mean F0 must fall in (Hz).
    pub cry_f0_hz: (f32, f32),
    pub cry_min_f0_std: f32,
    pub cry_min_intensity_std: f32,
    /// Overall RMS the clip must exceed.
    pub cry_min_intensity: f32,

    pub hyperphonation_f0_hz: f32,
    pub hyperphonation_min_secs: f32,

    pub hoarse_max_hnr: f32,
    pub hoarse_max_jitter: f32,
    pub hoarse_max_shimmer: f32,

    pub cri_du_chat_min_f0: f32,
    pub cri_du_chat_max_f0_std: f32,
    pub cri_du_chat_burst_secs: (f32, f32),
    pub cri_du_chat_repetition_hz: (f32, f32),

    /// Typical cry RMS and its spread; weak cries fall two spreads below.
    pub weak_baseline_rms: f32,
    pub weak_rms_std: f32,
    pub weak_short_segment_secs: f32,
    pub weak_long_pause_secs: f32,

    pub grunt_repetition_hz: (f32, f32),
    pub grunt_pulse_secs: (f32, f32),
    pub grunt_min_low_mid: f32,
    pub grunt_min_pulses: usize,

    pub illness_min_secs: f32,
    pub moan_max_centroid: f32,
    pub moan_min_flatness: f32,
    pub illness_extreme_f0: f32,

    pub hearing_min_f0: f32,
    pub hearing_max_rms: f32,
    pub hearing_min_secs: f32,
    pub hearing_min_score: f32,

    /// Nasal share of nasal + mid band energy.
    pub nasal_min_ratio: f32,
    pub nasal_min_flatness: f32,

    /// Voiced segments shorter than this are not syllables (s).
    pub syllable_min_secs: f32,
    pub canonical_syllable_secs: (f32, f32),
    /// Canonical syllables keep F0 std / mean below this.
    pub canonical_max_f0_instability: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            hop_size: 512,
            cry_gate: true,
            cry_f0_hz: (300.0, 2000.0),
            cry_min_f0_std: 50.0,
            cry_min_intensity_std: 0.01,
            cry_min_intensity: 0.05,
            hyperphonation_f0_hz: 1000.0,
            hyperphonation_min_secs: 0.15,
            hoarse_max_hnr: 6.0,
            hoarse_max_jitter: 1.5,
            hoarse_max_shimmer: 4.0,
            cri_du_chat_min_f0: 800.0,
            cri_du_chat_max_f0_std: 80.0,
            cri_du_chat_burst_secs: (0.1, 0.5),
            cri_du_chat_repetition_hz: (1.0, 2.0),
            weak_baseline_rms: 0.1,
            weak_rms_std: 0.02,
            weak_short_segment_secs: 0.3,
            weak_long_pause_secs: 1.0,
            grunt_repetition_hz: (0.5, 1.2),
            grunt_pulse_secs: (0.15, 0.35),
            grunt_min_low_mid: 0.5,
            grunt_min_pulses: 3,
            illness_min_secs: 300.0,
            moan_max_centroid: 600.0,
            moan_min_flatness: 0.7,
            illness_extreme_f0: 1200.0,
            hearing_min_f0: 500.0,
            hearing_max_rms: 0.08,
            hearing_min_secs: 30.0,
            hearing_min_score: 0.6,
            // 1.2 : 1 nasal-to-mid
            nasal_min_ratio: 1.2 / 2.2,
            nasal_min_flatness: 0.6,
            syllable_min_secs: 0.05,
            canonical_syllable_secs: (0.1, 1.0),
            canonical_max_f0_instability: 0.3,
        }
    }
}

fn within(v: f32, (lo, hi): (f32, f32)) -> bool {
    v >= lo && v <= hi
}

/// Share of `values` satisfying `pred`; 0 for an empty slice.
fn share(values: &[f32], pred: impl Fn(f32) -> bool) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|&&v| pred(v)).count() as f32 / values.len() as f32
}

fn alert(
    alert_type: AlertType,
    severity: Severity,
    confidence: f32,
    message: String,
    description: &str,
    recommendation: &str,
) -> Alert {
    Alert {
        alert_type,
        severity,
        confidence: confidence.clamp(0.0, 1.0),
        message,
        description: description.to_string(),
        recommendation: recommendation.to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct CryAnalyzer {
    config: AnalysisConfig,
}

impl CryAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Features plus every alert they raise, stamped now. With the cry gate
    /// on, audio that does not sound like a cry gets no alerts.
    pub fn analyze(&self, features: AudioFeatures) -> DetectionResult {
        let check = self.detect_cry(&features);
        let alerts = if check.is_cry || !self.config.cry_gate {
            self.alerts(&features)
        } else {
            Vec::new()
        };
        let result = DetectionResult::new(features, alerts).with_cry_check(check);
        debug!(
            is_cry = check.is_cry,
            cry_confidence = check.confidence,
            alerts = result.alerts.len(),
            risk = ?result.risk_level,
            "cry_analyzed"
        );
        result
    }

    /// Whole-clip cry gate: pitch in the cry band, a varying pitch, a varying
    /// and loud enough intensity.
    pub fn detect_cry(&self, f: &AudioFeatures) -> CryCheck {
        let c = &self.config;
        let mean_f0 = f.extended_f0_mean;
        let is_cry = mean_f0 > c.cry_f0_hz.0
            && mean_f0 < c.cry_f0_hz.1
            && f.extended_f0_std > c.cry_min_f0_std
            && f.intensity_std > c.cry_min_intensity_std
            && f.rms > c.cry_min_intensity;
        let confidence = ((mean_f0 / 500.0) * (f.intensity_std * 100.0)).clamp(0.0, 1.0);
        CryCheck { is_cry, confidence }
    }

    pub fn is_cry(&self, features: &AudioFeatures) -> bool {
        self.detect_cry(features).is_cry
    }

    /// Canonical babbling ratio: syllables of suitable length and stable F0
    /// over all syllables, read against the infant's age.
    pub fn canonical_babbling(&self, f: &AudioFeatures, age_months: u32) -> CanonicalBabbling {
        let c = &self.config;
        let syllables: Vec<(f32, Option<f32>)> = f
            .voiced_segment_lengths
            .iter()
            .copied()
            .zip(f.segment_f0_stability.iter().copied().chain(std::iter::repeat(None)))
            .filter(|&(len, _)| len >= c.syllable_min_secs)
            .collect();
        let canonical = syllables
            .iter()
            .filter(|&&(len, stability)| {
                within(len, c.canonical_syllable_secs)
                    && stability.is_some_and(|s| s < c.canonical_max_f0_instability)
            })
            .count();
        let cbr = if syllables.is_empty() {
            0.0
        } else {
            canonical as f32 / syllables.len() as f32
        };

        let mut recommendations = Vec::new();
        if (9..=10).contains(&age_months) && cbr < 0.15 {
            recommendations.push("Monitor language; consider SLP follow-up".to_string());
        } else if (7..=12).contains(&age_months) {
            if cbr < 0.1 {
                recommendations.push("Low CBR for age; recommend speech evaluation".to_string());
            } else if cbr > 0.3 {
                recommendations.push("Good canonical babbling development".to_string());
            }
        }
        debug!(cbr, age_months, syllables = syllables.len(), canonical, "canonical_babbling");

        CanonicalBabbling {
            cbr,
            age_months,
            total_syllables: syllables.len(),
            canonical_syllables: canonical,
            recommendations,
            age_appropriate: (7..=12).contains(&age_months),
        }
    }

    /// Alerts in rule order.
    pub fn alerts(&self, features: &AudioFeatures) -> Vec<Alert> {
        [
            self.hyperphonation(features),
            self.hoarseness(features),
            self.cri_du_chat(features),
            self.weak_cry(features),
            self.grunting(features),
            self.serious_illness(features),
            self.hearing_impairment(features),
            self.hypernasality(features),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Pain / discomfort / hunger from mean F0.
    pub fn classify(&self, features: &AudioFeatures) -> CryClassification {
        let (cry_type, confidence) = if features.f0_mean > 600.0 {
            (CryType::Pain, 0.7)
        } else if features.f0_mean > 450.0 {
            (CryType::Discomfort, 0.6)
        } else {
            (CryType::Hunger, 0.5)
        };
        CryClassification {
            cry_type,
            confidence,
        }
    }

    /// Longest run of consecutive F0 frames above the hyperphonation threshold (s).
    fn longest_high_run(&self, features: &AudioFeatures) -> f32 {
        if features.sample_rate == 0 {
            return 0.0;
        }
        let (longest, _) = features.f0.iter().fold((0usize, 0usize), |(best, run), &f| {
            if f > self.config.hyperphonation_f0_hz {
                (best.max(run + 1), run + 1)
            } else {
                (best, 0)
            }
        });
        longest as f32 * self.config.hop_size as f32 / features.sample_rate as f32
    }

    fn hyperphonation(&self, f: &AudioFeatures) -> Option<Alert> {
        let secs = self.longest_high_run(f);
        (secs >= self.config.hyperphonation_min_secs).then(|| {
            alert(
                AlertType::Hyperphonation,
                Severity::High,
                0.6 + 0.4 * secs.min(1.0),
                format!("Very high-pitched cry sustained for {secs:.2} s"),
                "Fundamental frequency stayed above 1 kHz, which can accompany neurological distress.",
                "Hyperphonation detected - consider neurological assessment",
            )
        })
    }

    fn hoarseness(&self, f: &AudioFeatures) -> Option<Alert> {
        let c = &self.config;
        let hoarse = f.is_voiced()
            && (f.hnr < c.hoarse_max_hnr || f.jitter > c.hoarse_max_jitter || f.shimmer > c.hoarse_max_shimmer);
        hoarse.then(|| {
            let hits = [f.hnr < c.hoarse_max_hnr, f.jitter > c.hoarse_max_jitter, f.shimmer > c.hoarse_max_shimmer]
                .iter()
                .filter(|&&b| b)
                .count();
            alert(
                AlertType::Hoarseness,
                Severity::Medium,
                0.5 + 0.15 * hits as f32,
                format!(
                    "Hoarse voice quality (HNR {:.1} dB, jitter {:.2}%, shimmer {:.2}%)",
                    f.hnr, f.jitter, f.shimmer
                ),
                "Noisy or irregular vocal fold vibration.",
                "Consider laryngeal issues / hypothyroidism check",
            )
        })
    }

    fn cri_du_chat(&self, f: &AudioFeatures) -> Option<Alert> {
        let c = &self.config;
        let matched = f.f0_mean >= c.cri_du_chat_min_f0
            && f.f0_std < c.cri_du_chat_max_f0_std
            && f.burst_lengths.iter().any(|&b| within(b, c.cri_du_chat_burst_secs))
            && within(f.repetition_rate, c.cri_du_chat_repetition_hz);
        matched.then(|| {
            alert(
                AlertType::CriDuChat,
                Severity::High,
                0.7,
                format!(
                    "High, monotonous cry at {:.0} Hz repeating at {:.1} Hz",
                    f.f0_mean, f.repetition_rate
                ),
                "High-pitched, cat-like cry with little pitch variation in short repeated bursts.",
                "Consider genetic evaluation for cri du chat syndrome",
            )
        })
    }

    fn weak_cry(&self, f: &AudioFeatures) -> Option<Alert> {
        let c = &self.config;
        let low_energy = f.rms < c.weak_baseline_rms - 2.0 * c.weak_rms_std;
        let short_segments = share(&f.voiced_segment_lengths, |l| l < c.weak_short_segment_secs) > 0.5;
        let long_pauses = share(&f.pause_lengths, |l| l > c.weak_long_pause_secs) > 0.3;
        (low_energy && short_segments && long_pauses).then(|| {
            alert(
                AlertType::WeakCry,
                Severity::Medium,
                0.65,
                format!("Weak cry (RMS {:.3}) with short segments and long pauses", f.rms),
                "Low cry energy with fragmented phonation, as seen with reduced muscle tone.",
                "Consider SMA/botulism screen note",
            )
        })
    }

    fn grunting(&self, f: &AudioFeatures) -> Option<Alert> {
        let c = &self.config;
        let matched = f.burst_lengths.len() >= c.grunt_min_pulses
            && within(f.repetition_rate, c.grunt_repetition_hz)
            && f.low_mid_harmonics > c.grunt_min_low_mid
            && share(&f.burst_lengths, |b| within(b, c.grunt_pulse_secs)) > 0.5;
        matched.then(|| {
            alert(
                AlertType::Grunting,
                Severity::High,
                0.7,
                format!(
                    "{} short low-pitched pulses at {:.1} Hz",
                    f.burst_lengths.len(),
                    f.repetition_rate
                ),
                "Rhythmic expiratory grunts with strong low-mid harmonics.",
                "Respiratory distress signs detected",
            )
        })
    }

    fn serious_illness(&self, f: &AudioFeatures) -> Option<Alert> {
        let c = &self.config;
        if f.duration <= c.illness_min_secs {
            return None;
        }
        let moaning = f.spectral_centroid < c.moan_max_centroid && f.spectral_flatness > c.moan_min_flatness;
        let shrill = f.extended_f0_mean.max(f.f0_mean) > c.illness_extreme_f0;
        if !(moaning || shrill) {
            return None;
        }
        let message = if moaning {
            "Possible signs of serious illness detected".to_string()
        } else {
            "Very high-pitched inconsolable cry detected".to_string()
        };
        Some(alert(
            AlertType::SeriousIllness,
            Severity::Critical,
            0.8,
            message,
            "Prolonged crying with a moaning or extremely high-pitched quality.",
            "SEEK IMMEDIATE MEDICAL CARE",
        ))
    }

    fn hearing_impairment(&self, f: &AudioFeatures) -> Option<Alert> {
        let c = &self.config;
        let score = [
            f.f0_mean > c.hearing_min_f0,
            f.rms < c.hearing_max_rms,
            f.duration > c.hearing_min_secs,
        ]
        .iter()
        .filter(|&&b| b)
        .count() as f32
            / 3.0;
        (score > c.hearing_min_score).then(|| {
            alert(
                AlertType::HearingImpairment,
                Severity::Low,
                score,
                format!("Cry pattern matches {:.0}% of hearing impairment cues", score * 100.0),
                "Higher pitch, lower intensity and longer cries are associated with reduced auditory feedback.",
                "Consider a hearing screening",
            )
        })
    }

    fn hypernasality(&self, f: &AudioFeatures) -> Option<Alert> {
        let c = &self.config;
        let matched = f.nasal_energy_ratio > c.nasal_min_ratio && f.spectral_flatness > c.nasal_min_flatness;
        matched.then(|| {
            alert(
                AlertType::Hypernasality,
                Severity::Low,
                0.5,
                format!("Nasal resonance ratio {:.2}", f.nasal_energy_ratio),
                "Energy concentrated in the nasal band relative to the mid band.",
                "Consider an evaluation of palatal function",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::extract_features;
    use crate::model::RiskLevel;
    use std::f32::consts::PI;

    const SR: u32 = 44100;

    /// A healthy-looking voiced cry that trips no rule.
    fn healthy() -> AudioFeatures {
        AudioFeatures {
            f0: vec![450.0; 40],
            f0_mean: 450.0,
            f0_std: 60.0,
            extended_f0_mean: 450.0,
            extended_f0_std: 60.0,
            hnr: 15.0,
            jitter: 0.5,
            shimmer: 2.0,
            rms: 0.3,
            intensity_std: 0.05,
            spectral_centroid: 1500.0,
            spectral_flatness: 0.1,
            voiced_segment_lengths: vec![1.2, 0.9],
            segment_f0_stability: vec![Some(0.1), Some(0.1)],
            pause_lengths: vec![0.4],
            burst_lengths: vec![],
            repetition_rate: 0.8,
            nasal_energy_ratio: 0.3,
            low_mid_harmonics: 0.3,
            duration: 3.0,
            sample_rate: SR,
        }
    }

    fn types(alerts: &[Alert]) -> Vec<AlertType> {
        alerts.iter().map(|a| a.alert_type).collect()
    }

    #[test]
    fn test_healthy_cry_has_no_alerts() {
        let result = CryAnalyzer::default().analyze(healthy());
        assert!(result.alerts.is_empty());
        assert_eq!(result.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_hyperphonation_needs_sustained_run() {
        let analyzer = CryAnalyzer::default();
        let mut f = healthy();
        // 0.15 s at 512-sample hops is 13 frames.
        f.f0 = [vec![450.0; 5], vec![1100.0; 13], vec![450.0; 5]].concat();
        assert_eq!(types(&analyzer.alerts(&f)), vec![AlertType::Hyperphonation]);

        f.f0 = [vec![1100.0; 6], vec![450.0], vec![1100.0; 6]].concat();
        assert!(analyzer.alerts(&f).is_empty());
    }

    #[test]
    fn test_hoarseness() {
        let analyzer = CryAnalyzer::default();
        let mut f = healthy();
        f.jitter = 2.0;
        let alerts = analyzer.alerts(&f);
        assert_eq!(types(&alerts), vec![AlertType::Hoarseness]);
        assert_eq!(alerts[0].severity, Severity::Medium);
        assert_eq!(alerts[0].recommendation, "Consider laryngeal issues / hypothyroidism check");

        // Unvoiced audio has no voice quality to judge.
        let mut silent = AudioFeatures::empty(SR);
        silent.rms = 0.2;
        assert!(!types(&analyzer.alerts(&silent)).contains(&AlertType::Hoarseness));
    }

    #[test]
    fn test_cri_du_chat() {
        let mut f = healthy();
        f.f0 = vec![850.0; 10];
        f.f0_mean = 850.0;
        f.f0_std = 30.0;
        f.burst_lengths = vec![0.3, 0.3];
        f.repetition_rate = 1.5;
        let alerts = CryAnalyzer::default().alerts(&f);
        assert!(types(&alerts).contains(&AlertType::CriDuChat));
        assert!(!types(&alerts).contains(&AlertType::HearingImpairment));
    }

    #[test]
    fn test_weak_cry() {
        let mut f = healthy();
        f.rms = 0.03;
        f.voiced_segment_lengths = vec![0.1, 0.2, 0.5];
        f.pause_lengths = vec![1.5, 0.2];
        let alerts = CryAnalyzer::default().alerts(&f);
        assert_eq!(types(&alerts), vec![AlertType::WeakCry]);
        assert_eq!(alerts[0].recommendation, "Consider SMA/botulism screen note");
    }

    #[test]
    fn test_grunting() {
        let mut f = healthy();
        f.burst_lengths = vec![0.2, 0.25, 0.3, 0.6];
        f.repetition_rate = 0.9;
        f.low_mid_harmonics = 0.7;
        let alerts = CryAnalyzer::default().alerts(&f);
        assert_eq!(types(&alerts), vec![AlertType::Grunting]);
        assert_eq!(alerts[0].severity, Severity::High);

        f.burst_lengths.truncate(2);
        assert!(CryAnalyzer::default().alerts(&f).is_empty());
    }

    #[test]
    fn test_serious_illness_is_critical() {
        let mut f = healthy();
        f.duration = 400.0;
        f.spectral_centroid = 400.0;
        f.spectral_flatness = 0.8;
        let result = CryAnalyzer::default().analyze(f);
        let illness = result
            .alerts
            .iter()
            .find(|a| a.alert_type == AlertType::SeriousIllness)
            .unwrap();
        assert_eq!(illness.recommendation, "SEEK IMMEDIATE MEDICAL CARE");
        assert_eq!(result.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_shrill_cry_raises_serious_illness() {
        // 1.6 kHz with a slow 300 Hz vibrato and a swelling envelope.
        let mut phase = 0.0f32;
        let samples: Vec<f32> = (0..SR as usize)
            .map(|i| {
                let t = i as f32 / SR as f32;
                phase += 2.0 * PI * (1600.0 + 300.0 * (2.0 * PI * t).sin()) / SR as f32;
                phase.sin() * 0.5 * (0.6 + 0.4 * (2.0 * PI * 3.0 * t).sin())
            })
            .collect();
        let mut f = extract_features(&samples, SR);
        assert!(f.extended_f0_mean > 1200.0, "extended f0 {}", f.extended_f0_mean);
        f.duration = 400.0;

        let analyzer = CryAnalyzer::default();
        assert!(analyzer.is_cry(&f));
        let result = analyzer.analyze(f);
        let illness = result
            .alerts
            .iter()
            .find(|a| a.alert_type == AlertType::SeriousIllness)
            .unwrap();
        assert_eq!(illness.message, "Very high-pitched inconsolable cry detected");
        assert_eq!(result.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_cry_gate_accepts_healthy_cry() {
        let result = CryAnalyzer::default().analyze(healthy());
        let check = result.cry_check.unwrap();
        assert!(check.is_cry);
        // (450 / 500) * (0.05 * 100) saturates.
        assert_eq!(check.confidence, 1.0);
    }

    #[test]
    fn test_non_cry_gets_no_alerts() {
        let analyzer = CryAnalyzer::default();
        // A steady moan: pitch never moves, envelope flat.
        let mut f = healthy();
        f.extended_f0_std = 5.0;
        f.intensity_std = 0.002;
        f.duration = 400.0;
        f.spectral_centroid = 400.0;
        f.spectral_flatness = 0.8;

        let check = analyzer.detect_cry(&f);
        assert!(!check.is_cry);
        assert!((check.confidence - 0.18).abs() < 1e-4);
        assert!(!analyzer.alerts(&f).is_empty());

        let result = analyzer.analyze(f.clone());
        assert!(result.alerts.is_empty());
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.cry_check, Some(check));

        let ungated = CryAnalyzer::new(AnalysisConfig {
            cry_gate: false,
            ..AnalysisConfig::default()
        });
        assert!(types(&ungated.analyze(f).alerts).contains(&AlertType::SeriousIllness));
    }

    #[test]
    fn test_cry_gate_rejects_silence_and_out_of_band_pitch() {
        let analyzer = CryAnalyzer::default();
        let silent = analyzer.detect_cry(&AudioFeatures::empty(SR));
        assert!(!silent.is_cry);
        assert_eq!(silent.confidence, 0.0);

        let mut f = healthy();
        f.extended_f0_mean = 2100.0;
        assert!(!analyzer.is_cry(&f));
        f.extended_f0_mean = 250.0;
        assert!(!analyzer.is_cry(&f));
        f.extended_f0_mean = 450.0;
        f.rms = 0.04;
        assert!(!analyzer.is_cry(&f));
    }

    fn babbling(lengths: Vec<f32>, stability: Vec<Option<f32>>) -> AudioFeatures {
        AudioFeatures {
            voiced_segment_lengths: lengths,
            segment_f0_stability: stability,
            ..AudioFeatures::empty(SR)
        }
    }

    #[test]
    fn test_canonical_babbling_ratio() {
        let analyzer = CryAnalyzer::default();
        // Too short to count, canonical, unstable, too long, no pitch.
        let f = babbling(
            vec![0.04, 0.3, 0.5, 1.5, 0.2],
            vec![Some(0.1), Some(0.1), Some(0.5), Some(0.1), None],
        );
        let cbr = analyzer.canonical_babbling(&f, 11);
        assert_eq!(cbr.total_syllables, 4);
        assert_eq!(cbr.canonical_syllables, 1);
        assert!((cbr.cbr - 0.25).abs() < 1e-6);
        assert!(cbr.age_appropriate);
        assert!(cbr.recommendations.is_empty());

        let empty = analyzer.canonical_babbling(&AudioFeatures::empty(SR), 8);
        assert_eq!(empty.cbr, 0.0);
        assert_eq!(empty.total_syllables, 0);
        assert_eq!(empty.recommendations, vec!["Low CBR for age; recommend speech evaluation"]);
    }

    #[test]
    fn test_canonical_babbling_recommendations_by_age() {
        let analyzer = CryAnalyzer::default();
        // One canonical syllable in eight.
        let mut lengths = vec![0.3];
        lengths.extend(vec![1.5; 7]);
        let sparse = babbling(lengths, vec![Some(0.1); 8]);
        assert_eq!(
            analyzer.canonical_babbling(&sparse, 9).recommendations,
            vec!["Monitor language; consider SLP follow-up"]
        );
        assert!(analyzer.canonical_babbling(&sparse, 12).recommendations.is_empty());

        let rich = babbling(vec![0.3, 0.4, 0.5], vec![Some(0.1); 3]);
        assert_eq!(
            analyzer.canonical_babbling(&rich, 10).recommendations,
            vec!["Good canonical babbling development"]
        );

        let young = analyzer.canonical_babbling(&rich, 4);
        assert!(!young.age_appropriate);
        assert!(young.recommendations.is_empty());
    }

    #[test]
    fn test_hearing_impairment_needs_two_cues() {
        let analyzer = CryAnalyzer::default();
        let mut f = healthy();
        f.f0_mean = 550.0;
        assert!(analyzer.alerts(&f).is_empty());

        f.duration = 45.0;
        let alerts = analyzer.alerts(&f);
        assert_eq!(types(&alerts), vec![AlertType::HearingImpairment]);
        assert!((alerts[0].confidence - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_hypernasality() {
        let mut f = healthy();
        f.nasal_energy_ratio = 0.6;
        f.spectral_flatness = 0.65;
        assert_eq!(types(&CryAnalyzer::default().alerts(&f)), vec![AlertType::Hypernasality]);
    }

    #[test]
    fn test_classify_by_mean_f0() {
        let analyzer = CryAnalyzer::default();
        let mut f = healthy();
        f.f0_mean = 700.0;
        assert_eq!(analyzer.classify(&f).cry_type, CryType::Pain);
        f.f0_mean = 500.0;
        assert_eq!(analyzer.classify(&f).cry_type, CryType::Discomfort);
        f.f0_mean = 400.0;
        let c = analyzer.classify(&f);
        assert_eq!(c.cry_type, CryType::Hunger);
        assert_eq!(c.confidence, 0.5);
    }
}
