//! Autocorrelation F0 estimation.
//!
//! The lag search covers `[ceil(sr / max_hz), floor(sr / min_hz)]` and always
//! scans the whole range, keeping the global maximum. The correlation is
//! normalized by the zero-lag energy, so its natural `1 - lag / n` taper makes
//! the shortest matching period win over its multiples.

/// Lower edge of the infant-cry F0 range (Hz).
pub const CRY_MIN_F0_HZ: f32 = 300.0;
/// Upper edge of the infant-cry F0 range (Hz).
pub const CRY_MAX_F0_HZ: f32 = 1200.0;

/// Best lag found for one analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PitchEstimate {
    /// Estimated F0 in Hz, 0 when unvoiced.
    pub f0: f32,
    /// Lag (samples) of the correlation peak, 0 when unvoiced.
    pub lag: usize,
    /// Peak normalized correlation, 0 when unvoiced.
    pub correlation: f32,
}

impl PitchEstimate {
    pub fn is_voiced(&self) -> bool {
        self.f0 > 0.0
    }

    /// Peak correlation with the lag taper divided out, clamped to [0, 1].
    pub fn periodicity(&self, window_len: usize) -> f32 {
        if !self.is_voiced() || self.lag >= window_len {
            return 0.0;
        }
        let taper = 1.0 - self.lag as f32 / window_len as f32;
        (self.correlation / taper).clamp(0.0, 1.0)
    }
}

/// Admissible lag range for an F0 band, or `None` if it is empty at this rate.
pub fn lag_range(sample_rate: u32, min_hz: f32, max_hz: f32) -> Option<(usize, usize)> {
    if sample_rate == 0 || min_hz <= 0.0 || max_hz < min_hz {
        return None;
    }
    let sr = sample_rate as f32;
    let min_lag = ((sr / max_hz).ceil() as usize).max(1);
    let max_lag = (sr / min_hz).floor() as usize;
    (min_lag <= max_lag).then_some((min_lag, max_lag))
}

/// Estimate F0 of `window` within `[min_hz, max_hz]`.
pub fn estimate_pitch(window: &[f32], sample_rate: u32, min_hz: f32, max_hz: f32) -> PitchEstimate {
    let Some((min_lag, max_lag)) = lag_range(sample_rate, min_hz, max_hz) else {
        return PitchEstimate::default();
    };
    if window.len() < 2 {
        return PitchEstimate::default();
    }
    let max_lag = max_lag.min(window.len() - 1);
    if min_lag > max_lag {
        return PitchEstimate::default();
    }

    let energy: f64 = window.iter().map(|&s| (s as f64) * (s as f64)).sum();
    if energy <= 0.0 || !energy.is_finite() {
        return PitchEstimate::default();
    }

    let mut best_lag = 0usize;
    let mut best_corr = 0.0f64;
    for lag in min_lag..=max_lag {
        let sum: f64 = window[..window.len() - lag]
            .iter()
            .zip(&window[lag..])
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum();
        let corr = sum / energy;
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }

    if best_lag == 0 {
        return PitchEstimate::default();
    }
    PitchEstimate {
        f0: sample_rate as f32 / best_lag as f32,
        lag: best_lag,
        correlation: best_corr as f32,
    }
}

/// F0 of `window` in the infant-cry range, 0 when unvoiced.
pub fn estimate_f0(window: &[f32], sample_rate: u32) -> f32 {
    estimate_pitch(window, sample_rate, CRY_MIN_F0_HZ, CRY_MAX_F0_HZ).f0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_lag_range_at_44k() {
        assert_eq!(lag_range(44100, 300.0, 1200.0), Some((37, 147)));
        assert_eq!(lag_range(0, 300.0, 1200.0), None);
        // 44100/1102 = 40.02 and 44100/1101 = 40.05: no integer lag in between.
        assert_eq!(lag_range(44100, 1101.0, 1102.0), None);
    }

    #[test]
    fn test_sine_within_tolerance() {
        for freq in [300.0, 440.0, 600.0, 850.0, 1000.0, 1150.0] {
            let est = estimate_pitch(&sine(freq, 44100, 2048), 44100, 300.0, 1200.0);
            let err = (est.f0 - freq).abs() / freq;
            assert!(err < 0.05, "freq {freq}: estimated {}", est.f0);
            assert!(est.correlation > 0.8);
        }
    }

    #[test]
    fn test_no_octave_error_on_long_window() {
        // Multiples of the period are also in range here; the global maximum must still
        // sit on the fundamental.
        let est = estimate_pitch(&sine(1000.0, 44100, 8192), 44100, 300.0, 1200.0);
        assert!((est.f0 - 1000.0).abs() < 50.0, "estimated {}", est.f0);
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let est = estimate_pitch(&vec![0.0; 2048], 44100, 300.0, 1200.0);
        assert_eq!(est, PitchEstimate::default());
        assert_eq!(estimate_f0(&[], 44100), 0.0);
    }

    #[test]
    fn test_periodicity_is_bounded() {
        let window = sine(500.0, 16000, 1024);
        let est = estimate_pitch(&window, 16000, 300.0, 1200.0);
        let p = est.periodicity(window.len());
        assert!(p > 0.9 && p <= 1.0, "periodicity {p}");
    }
}
