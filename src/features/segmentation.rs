//! Voiced / pause / burst segmentation of a cry from its RMS envelope.

use crate::audio::compute_rms;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationParams {
    /// Envelope frame length (s).
    pub frame_secs: f32,
    /// Absolute floor of the activity threshold.
    pub floor_rms: f32,
    /// Activity threshold as a fraction of the envelope peak.
    pub relative_threshold: f32,
    /// Longest voiced run still counted as a burst (s).
    pub burst_max_secs: f32,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            frame_secs: 0.01,
            floor_rms: 0.01,
            relative_threshold: 0.2,
            burst_max_secs: 0.5,
        }
    }
}

/// Interval lengths (s) in chronological order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Segmentation {
    pub voiced: Vec<f32>,
    pub pauses: Vec<f32>,
    pub bursts: Vec<f32>,
    /// `(start, end)` of each voiced run (s), parallel to `voiced`.
    pub voiced_spans: Vec<(f32, f32)>,
    /// Voiced-run repetition frequency (Hz).
    pub repetition_rate: f32,
    /// Population standard deviation of the RMS envelope.
    pub intensity_std: f32,
}

/// A maximal run of envelope frames on one side of the threshold.
#[derive(Debug, Clone, Copy)]
struct Run {
    active: bool,
    start: usize,
    end: usize,
}

/// RMS of consecutive non-overlapping frames; the last frame may be shorter.
/// Returns `(start_sample, end_sample, rms)` triples.
pub fn rms_envelope(samples: &[f32], frame_len: usize) -> Vec<(usize, usize, f32)> {
    let frame_len = frame_len.max(1);
    samples
        .chunks(frame_len)
        .enumerate()
        .map(|(i, chunk)| {
            let start = i * frame_len;
            (start, start + chunk.len(), compute_rms(chunk))
        })
        .collect()
}

pub fn segment(samples: &[f32], sample_rate: u32, params: &SegmentationParams) -> Segmentation {
    if samples.is_empty() || sample_rate == 0 {
        return Segmentation::default();
    }
    let frame_len = (params.frame_secs * sample_rate as f32).round() as usize;
    let envelope = rms_envelope(samples, frame_len);
    let peak = envelope.iter().map(|&(_, _, r)| r).fold(0.0f32, f32::max);
    let threshold = params.floor_rms.max(params.relative_threshold * peak);
    let intensity_std = spread(envelope.iter().map(|&(_, _, r)| r));

    let mut runs: Vec<Run> = Vec::new();
    for &(start, end, rms) in &envelope {
        let active = rms >= threshold && rms > 0.0;
        match runs.last_mut() {
            Some(run) if run.active == active => run.end = end,
            _ => runs.push(Run { active, start, end }),
        }
    }

    let secs = |run: &Run| (run.end - run.start) as f32 / sample_rate as f32;
    let last = runs.len().saturating_sub(1);
    let mut out = Segmentation {
        intensity_std,
        ..Segmentation::default()
    };
    let mut onsets = Vec::new();

    for (i, run) in runs.iter().enumerate() {
        let interior = i > 0 && i < last;
        if run.active {
            let length = secs(run);
            out.voiced.push(length);
            let onset = run.start as f32 / sample_rate as f32;
            onsets.push(onset);
            out.voiced_spans.push((onset, run.end as f32 / sample_rate as f32));
            // Runs alternate, so an interior active run has silence on both sides.
            if interior && length <= params.burst_max_secs {
                out.bursts.push(length);
            }
        } else if interior {
            out.pauses.push(secs(run));
        }
    }

    if onsets.len() >= 2 {
        let span = onsets[onsets.len() - 1] - onsets[0];
        let mean_interval = span / (onsets.len() - 1) as f32;
        if mean_interval > 0.0 {
            out.repetition_rate = 1.0 / mean_interval;
        }
    }
    out
}

fn spread(values: impl Iterator<Item = f32>) -> f32 {
    let values: Vec<f64> = values.map(f64::from).collect();
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt() as f32
}
