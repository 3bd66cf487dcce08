//! HNR, jitter and shimmer from the voiced analysis frames.
//! Each voiced frame contributes one period (1/F0), one peak amplitude and one
//! periodicity value; consecutive frames stand in for consecutive glottal cycles.

/// Fewer voiced frames than this reports all-zero quality measures.
pub const MIN_VOICED_FRAMES: usize = 3;

/// Periodicity is clamped to this range before the HNR log ratio.
const PERIODICITY_CLAMP: (f32, f32) = (1e-4, 0.9999);

/// Per-frame inputs to the quality measures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoicedFrame {
    pub f0: f32,
    /// Taper-corrected peak autocorrelation in [0, 1].
    pub periodicity: f32,
    pub peak_amplitude: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoiceQuality {
    /// Harmonics-to-noise ratio (dB).
    pub hnr: f32,
    /// Local jitter (%).
    pub jitter: f32,
    /// Local shimmer (%).
    pub shimmer: f32,
}

pub fn voice_quality(frames: &[VoicedFrame]) -> VoiceQuality {
    if frames.len() < MIN_VOICED_FRAMES {
        return VoiceQuality::default();
    }

    let hnr = frames
        .iter()
        .map(|f| {
            let r = f.periodicity.clamp(PERIODICITY_CLAMP.0, PERIODICITY_CLAMP.1);
            10.0 * (r / (1.0 - r)).log10()
        })
        .sum::<f32>()
        / frames.len() as f32;

    let periods: Vec<f32> = frames
        .iter()
        .filter(|f| f.f0 > 0.0)
        .map(|f| 1.0 / f.f0)
        .collect();
    let amplitudes: Vec<f32> = frames.iter().map(|f| f.peak_amplitude).collect();

    VoiceQuality {
        hnr: finite_or_zero(hnr),
        jitter: local_perturbation(&periods),
        shimmer: local_perturbation(&amplitudes),
    }
}

/// Mean absolute difference of consecutive values over their mean, in percent.
fn local_perturbation(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    if mean <= 0.0 {
        return 0.0;
    }
    let diff = values
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .sum::<f32>()
        / (values.len() - 1) as f32;
    finite_or_zero(diff / mean * 100.0)
}

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
