//! Sample-level helpers shared by the detector and the extractor:
//! RMS level, PCM conversion, input sanitizing and WAV attachment encoding.

use std::borrow::Cow;
use std::io::Cursor;

use crate::error::EncodeError;

/// MIME type of attachments produced by [`encode_wav`].
pub const WAV_MIME: &str = "audio/wav";

/// RMS level of a block of normalized samples. 0 for an empty block.
#[inline]
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let f = s as f64;
            f * f
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Convert 16-bit PCM to normalized `f32` in [-1, 1).
pub fn samples_from_i16(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Replace non-finite samples with silence. Borrows when the input is already clean.
pub fn sanitize(samples: &[f32]) -> Cow<'_, [f32]> {
    if samples.iter().all(|s| s.is_finite()) {
        Cow::Borrowed(samples)
    } else {
        Cow::Owned(
            samples
                .iter()
                .map(|&s| if s.is_finite() { s } else { 0.0 })
                .collect(),
        )
    }
}

/// Encode mono samples as a 16-bit PCM WAV file in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, EncodeError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            let clamped = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
