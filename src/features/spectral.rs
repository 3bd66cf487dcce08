//! Magnitude spectra and the measures derived from them: centroid, flatness
//! and band energies. Only bins below Nyquist are kept.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Floor applied to power bins before taking logs.
const POWER_FLOOR: f64 = 1e-10;

/// Forward FFT of a fixed size with a periodic Hann window.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
}

impl SpectrumAnalyzer {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(size.max(1)),
            size: size.max(1),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Magnitude spectrum of `frame`, zero-padded or truncated to the analyzer size.
    pub fn magnitudes(&self, frame: &[f32], sample_rate: u32) -> Spectrum {
        let len = frame.len().min(self.size);
        let mut buffer: Vec<Complex<f32>> = frame[..len]
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let w = 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / len as f32).cos();
                Complex::new(s * w, 0.0)
            })
            .collect();
        buffer.resize(self.size, Complex::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        let bins = self.size / 2;
        Spectrum {
            magnitudes: buffer[..bins].iter().map(|c| c.norm()).collect(),
            bin_hz: sample_rate as f32 / self.size as f32,
        }
    }
}

/// One-sided magnitude spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub magnitudes: Vec<f32>,
    /// Frequency spacing of bins (Hz).
    pub bin_hz: f32,
}

impl Spectrum {
    fn freq(&self, bin: usize) -> f32 {
        bin as f32 * self.bin_hz
    }

    pub fn total(&self) -> f32 {
        self.magnitudes.iter().sum()
    }

    pub fn is_silent(&self) -> bool {
        !(self.total() > 0.0)
    }

    /// Σ f·|X(f)| / Σ |X(f)|, 0 when the spectrum is empty or silent.
    pub fn centroid(&self) -> f32 {
        let (weighted, total) = self
            .magnitudes
            .iter()
            .enumerate()
            .fold((0.0f64, 0.0f64), |(w, t), (k, &m)| {
                (w + self.freq(k) as f64 * m as f64, t + m as f64)
            });
        if total > 0.0 && weighted.is_finite() {
            (weighted / total) as f32
        } else {
            0.0
        }
    }

    /// Geometric over arithmetic mean of the power spectrum. `None` when silent.
    pub fn flatness(&self) -> Option<f32> {
        if self.magnitudes.is_empty() || self.is_silent() {
            return None;
        }
        let n = self.magnitudes.len() as f64;
        let (log_sum, sum) = self.magnitudes.iter().fold((0.0f64, 0.0f64), |(l, s), &m| {
            let p = ((m as f64) * (m as f64)).max(POWER_FLOOR);
            (l + p.ln(), s + p)
        });
        let geometric = (log_sum / n).exp();
        let arithmetic = sum / n;
        let flatness = geometric / arithmetic;
        flatness.is_finite().then_some(flatness.clamp(0.0, 1.0) as f32)
    }

    /// Sum of magnitudes with bin frequency in `[lo_hz, hi_hz]`.
    pub fn band_sum(&self, lo_hz: f32, hi_hz: f32) -> f32 {
        self.band(lo_hz, hi_hz).sum()
    }

    /// Mean magnitude with bin frequency in `[lo_hz, hi_hz]`, 0 if no bin falls inside.
    pub fn band_mean(&self, lo_hz: f32, hi_hz: f32) -> f32 {
        let (sum, count) = self.band(lo_hz, hi_hz).fold((0.0f32, 0usize), |(s, c), m| (s + m, c + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    fn band(&self, lo_hz: f32, hi_hz: f32) -> impl Iterator<Item = f32> + '_ {
        self.magnitudes
            .iter()
            .enumerate()
            .filter(move |(k, _)| {
                let f = self.freq(*k);
                f >= lo_hz && f <= hi_hz
            })
            .map(|(_, &m)| m)
    }
}
