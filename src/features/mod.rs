//! Acoustic feature extraction for a captured cry segment.
//! Pipeline: sanitize → frame → per-frame pitch + spectrum → voice quality →
//! envelope segmentation → `AudioFeatures`.
//! Stateless and deterministic: the same samples always give the same features.

pub mod pitch;
pub mod segmentation;
pub mod spectral;
pub mod voice_quality;

use serde::Deserialize;
use tracing::debug;

use crate::audio::{compute_rms, sanitize};
use crate::model::{f0_stats, AudioFeatures};
use segmentation::SegmentationParams;
use spectral::SpectrumAnalyzer;
use voice_quality::VoicedFrame;

/// Nasal resonance band (Hz).
const NASAL_BAND: (f32, f32) = (250.0, 300.0);
/// Oral mid band used as the nasal reference (Hz).
const MID_BAND: (f32, f32) = (500.0, 1500.0);
/// Low-mid harmonic band (Hz).
const LOW_MID_BAND: (f32, f32) = (200.0, 800.0);

/// Feature extractor configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Analysis frame length (samples).
    pub frame_size: usize,
    /// Hop between analysis frames (samples).
    pub hop_size: usize,
    pub min_f0_hz: f32,
    pub max_f0_hz: f32,
    /// Upper edge of the extended F0 search (Hz).
    pub extended_max_f0_hz: f32,
    /// Frames quieter than this are unvoiced.
    pub voicing_rms: f32,
    /// Frames whose peak correlation is below this are unvoiced.
    pub voicing_correlation: f32,
    /// Envelope frame for segmentation (s).
    pub envelope_frame_secs: f32,
    pub segment_floor_rms: f32,
    pub segment_relative_threshold: f32,
    pub burst_max_secs: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
            min_f0_hz: pitch::CRY_MIN_F0_HZ,
            max_f0_hz: pitch::CRY_MAX_F0_HZ,
            extended_max_f0_hz: 2000.0,
            voicing_rms: 0.01,
            voicing_correlation: 0.3,
            envelope_frame_secs: 0.01,
            segment_floor_rms: 0.01,
            segment_relative_threshold: 0.2,
            burst_max_secs: 0.5,
        }
    }
}

impl ExtractorConfig {
    fn segmentation(&self) -> SegmentationParams {
        SegmentationParams {
            frame_secs: self.envelope_frame_secs,
            floor_rms: self.segment_floor_rms,
            relative_threshold: self.segment_relative_threshold,
            burst_max_secs: self.burst_max_secs,
        }
    }

    /// Duration of one hop at `sample_rate` (s).
    pub fn hop_secs(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            0.0
        } else {
            self.hop_size.max(1) as f32 / sample_rate as f32
        }
    }
}

/// Running sums of per-frame spectral measures.
#[derive(Default)]
struct SpectralAccumulator {
    centroid: f64,
    flatness: f64,
    nasal: f64,
    mid: f64,
    low_mid: f64,
    total: f64,
    frames: usize,
}

impl SpectralAccumulator {
    fn add(&mut self, spectrum: &spectral::Spectrum) {
        if spectrum.is_silent() {
            return;
        }
        self.centroid += spectrum.centroid() as f64;
        self.flatness += spectrum.flatness().unwrap_or(0.0) as f64;
        self.nasal += spectrum.band_mean(NASAL_BAND.0, NASAL_BAND.1) as f64;
        self.mid += spectrum.band_mean(MID_BAND.0, MID_BAND.1) as f64;
        self.low_mid += spectrum.band_sum(LOW_MID_BAND.0, LOW_MID_BAND.1) as f64;
        self.total += spectrum.total() as f64;
        self.frames += 1;
    }

    fn mean(&self, sum: f64) -> f32 {
        if self.frames == 0 {
            0.0
        } else {
            (sum / self.frames as f64) as f32
        }
    }

    fn ratio(num: f64, den: f64) -> f32 {
        if den > 0.0 {
            (num / den).clamp(0.0, 1.0) as f32
        } else {
            0.0
        }
    }
}

/// Frame boundaries: full frames every `hop`, or one frame for short input.
fn frame_bounds(len: usize, frame: usize, hop: usize) -> Vec<(usize, usize)> {
    if len <= frame {
        return vec![(0, len)];
    }
    let hop = hop.max(1);
    (0..=len - frame).step_by(hop).map(|s| (s, s + frame)).collect()
}

/// Computes [`AudioFeatures`] for whole segments.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract the full feature set from mono samples in [-1, 1].
    pub fn extract(&self, samples: &[f32], sample_rate: u32) -> AudioFeatures {
        if samples.is_empty() || sample_rate == 0 {
            return AudioFeatures::empty(sample_rate);
        }
        let samples = sanitize(samples);
        let samples = samples.as_ref();
        let cfg = &self.config;

        let frame_size = cfg.frame_size.max(1);
        let bounds = frame_bounds(samples.len(), frame_size, cfg.hop_size);
        let analyzer = SpectrumAnalyzer::new(frame_size.min(samples.len()));

        let mut f0 = Vec::new();
        let mut extended = Vec::new();
        let mut centers = Vec::new();
        let mut voiced = Vec::new();
        let mut spectra = SpectralAccumulator::default();

        for &(start, end) in &bounds {
            let frame = &samples[start..end];
            spectra.add(&analyzer.magnitudes(frame, sample_rate));

            if compute_rms(frame) < cfg.voicing_rms {
                continue;
            }
            let est = pitch::estimate_pitch(frame, sample_rate, cfg.min_f0_hz, cfg.max_f0_hz);
            if !est.is_voiced() || est.correlation < cfg.voicing_correlation {
                continue;
            }
            f0.push(est.f0);
            extended.push(self.extended_f0(frame, sample_rate, est));
            centers.push((start + end) as f32 / 2.0 / sample_rate as f32);
            voiced.push(VoicedFrame {
                f0: est.f0,
                periodicity: est.periodicity(frame.len()),
                peak_amplitude: frame.iter().fold(0.0f32, |m, &s| m.max(s.abs())),
            });
        }

        let quality = voice_quality::voice_quality(&voiced);
        let segments = segmentation::segment(samples, sample_rate, &cfg.segmentation());
        let (f0_mean, f0_std) = f0_stats(&f0);
        let (extended_f0_mean, extended_f0_std) = f0_stats(&extended);
        let segment_f0_stability = segments
            .voiced_spans
            .iter()
            .map(|&(from, to)| {
                let inside: Vec<f32> = centers
                    .iter()
                    .zip(&f0)
                    .filter(|&(&c, _)| c >= from && c < to)
                    .map(|(_, &v)| v)
                    .collect();
                let (mean, std) = f0_stats(&inside);
                (mean > 0.0).then(|| std / mean)
            })
            .collect();

        debug!(
            frames = bounds.len(),
            voiced_frames = f0.len(),
            f0_mean,
            extended_f0_mean,
            "features_extracted"
        );

        let features = AudioFeatures {
            f0,
            f0_mean,
            f0_std,
            extended_f0_mean,
            extended_f0_std,
            hnr: quality.hnr,
            jitter: quality.jitter,
            shimmer: quality.shimmer,
            rms: compute_rms(samples),
            intensity_std: segments.intensity_std,
            spectral_centroid: spectra.mean(spectra.centroid),
            spectral_flatness: spectra.mean(spectra.flatness),
            voiced_segment_lengths: segments.voiced,
            segment_f0_stability,
            pause_lengths: segments.pauses,
            burst_lengths: segments.bursts,
            repetition_rate: segments.repetition_rate,
            nasal_energy_ratio: SpectralAccumulator::ratio(spectra.nasal, spectra.nasal + spectra.mid),
            low_mid_harmonics: SpectralAccumulator::ratio(spectra.low_mid, spectra.total),
            duration: samples.len() as f32 / sample_rate as f32,
            sample_rate,
        };
        finite(features)
    }

    /// F0 of a voiced frame with the search extended above the cry band. The
    /// cry-band estimate lands on a multiple of the period when the true F0 is
    /// higher; the shorter period then correlates better.
    fn extended_f0(&self, frame: &[f32], sample_rate: u32, in_band: pitch::PitchEstimate) -> f32 {
        let cfg = &self.config;
        if cfg.extended_max_f0_hz <= cfg.max_f0_hz {
            return in_band.f0;
        }
        let high = pitch::estimate_pitch(frame, sample_rate, cfg.max_f0_hz, cfg.extended_max_f0_hz);
        if high.is_voiced() && high.correlation > in_band.correlation {
            high.f0
        } else {
            in_band.f0
        }
    }
}

/// Replace any non-finite value with 0.
fn finite(mut features: AudioFeatures) -> AudioFeatures {
    fn fix(v: &mut f32) {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
    for v in [
        &mut features.f0_mean,
        &mut features.f0_std,
        &mut features.extended_f0_mean,
        &mut features.extended_f0_std,
        &mut features.hnr,
        &mut features.jitter,
        &mut features.shimmer,
        &mut features.rms,
        &mut features.intensity_std,
        &mut features.spectral_centroid,
        &mut features.spectral_flatness,
        &mut features.repetition_rate,
        &mut features.nasal_energy_ratio,
        &mut features.low_mid_harmonics,
        &mut features.duration,
    ] {
        fix(v);
    }
    features.f0.retain(|v| v.is_finite());
    for s in &mut features.segment_f0_stability {
        *s = s.filter(|v| v.is_finite());
    }
    for seq in [
        &mut features.voiced_segment_lengths,
        &mut features.pause_lengths,
        &mut features.burst_lengths,
    ] {
        seq.iter_mut().for_each(fix);
    }
    features
}

/// Extract features with the default configuration.
pub fn extract_features(samples: &[f32], sample_rate: u32) -> AudioFeatures {
    FeatureExtractor::default().extract(samples, sample_rate)
}
