//! Voice-activity detection over 30 ms frames.
//!
//! The detector is advisory: any failure returns the input unmodified so a
//! misbehaving classifier can never block transcription.

use speech_domain::AudioBuffer;
use thiserror::Error;

use crate::segments::{merge_segments, VoiceSegment};

const SUPPORTED_RATES: [u32; 3] = [8_000, 16_000, 32_000];
const FALLBACK_RATE: u32 = 16_000;
const FRAME_DURATION_MS: u32 = 30;

// Aggressive sensitivity: frames must be clearly voiced to be kept.
const MIN_FRAME_RMS: f32 = 450.0;
const MAX_ZERO_CROSSING_RATE: f32 = 0.35;

#[derive(Debug, Error)]
pub enum VadError {
    #[error("sample rate {0} Hz cannot be framed")]
    UnframeableRate(u32),
}

#[derive(Debug, Default)]
pub struct VoiceActivityDetector;

impl VoiceActivityDetector {
    pub fn new() -> Self {
        Self
    }

    /// Keep only the samples covered by merged speech intervals.
    ///
    /// Unsupported sample rates are first linear-resampled to 16 kHz, so the
    /// returned buffer may carry a different rate than the input. When no
    /// speech is found, or classification fails, the input is returned as-is.
    pub fn extract_voice(&self, buffer: AudioBuffer) -> AudioBuffer {
        let buffer = if SUPPORTED_RATES.contains(&buffer.sample_rate_hz) {
            buffer
        } else {
            tracing::warn!(
                sample_rate_hz = buffer.sample_rate_hz,
                "unsupported rate for voice detection, resampling to 16 kHz"
            );
            let samples = resample_linear(&buffer.samples, buffer.sample_rate_hz, FALLBACK_RATE);
            AudioBuffer::new(FALLBACK_RATE, samples)
        };

        match self.detect(&buffer) {
            Ok(segments) if segments.is_empty() => {
                tracing::warn!("no voice segments detected, keeping full signal");
                buffer
            }
            Ok(segments) => {
                let frame_size = frame_size(buffer.sample_rate_hz);
                let merged = merge_segments(&segments, frame_size * 2);
                let kept = apply_mask(&buffer.samples, &merged);
                tracing::debug!(
                    raw_segments = segments.len(),
                    merged_segments = merged.len(),
                    kept_samples = kept.len(),
                    "voice segments extracted"
                );
                AudioBuffer::new(buffer.sample_rate_hz, kept)
            }
            Err(error) => {
                tracing::warn!(%error, "voice detection failed, keeping full signal");
                buffer
            }
        }
    }

    fn detect(&self, buffer: &AudioBuffer) -> Result<Vec<VoiceSegment>, VadError> {
        let frame_size = frame_size(buffer.sample_rate_hz);
        if frame_size == 0 {
            return Err(VadError::UnframeableRate(buffer.sample_rate_hz));
        }

        let pcm: Vec<i16> = buffer
            .samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32_767.0) as i16)
            .collect();

        let mut segments = Vec::new();
        let mut start = 0;
        // Only full frames are classified; a trailing partial frame is skipped.
        while start + frame_size <= pcm.len() {
            let frame = &pcm[start..start + frame_size];
            if is_speech_frame(frame) {
                segments.push((start, start + frame_size));
            }
            start += frame_size;
        }
        Ok(segments)
    }
}

fn frame_size(sample_rate_hz: u32) -> usize {
    (sample_rate_hz * FRAME_DURATION_MS / 1_000) as usize
}

/// Energy plus zero-crossing gate: voiced speech carries energy well above
/// the noise floor and crosses zero far less often than broadband noise.
fn is_speech_frame(frame: &[i16]) -> bool {
    if frame.is_empty() {
        return false;
    }

    let sum_squares: f64 = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    let rms = (sum_squares / frame.len() as f64).sqrt() as f32;
    if rms < MIN_FRAME_RMS {
        return false;
    }

    let crossings = frame
        .windows(2)
        .filter(|pair| (pair[0] >= 0) != (pair[1] >= 0))
        .count();
    let zcr = crossings as f32 / frame.len() as f32;
    zcr <= MAX_ZERO_CROSSING_RATE
}

fn apply_mask(samples: &[f32], segments: &[VoiceSegment]) -> Vec<f32> {
    let mut kept = Vec::new();
    for &(start, end) in segments {
        let end = end.min(samples.len());
        if start < end {
            kept.extend_from_slice(&samples[start..end]);
        }
    }
    kept
}

fn resample_linear(samples: &[f32], source_rate_hz: u32, target_rate_hz: u32) -> Vec<f32> {
    if source_rate_hz == target_rate_hz || samples.len() <= 1 {
        return samples.to_vec();
    }

    let output_len = ((samples.len() as u64 * u64::from(target_rate_hz))
        / u64::from(source_rate_hz))
    .max(1) as usize;
    if output_len <= 1 {
        return vec![samples[0]];
    }

    let max_source_idx = samples.len() - 1;
    let mut output = Vec::with_capacity(output_len);
    for out_idx in 0..output_len {
        let source_pos =
            out_idx as f64 * f64::from(source_rate_hz) / f64::from(target_rate_hz);
        let left_idx = source_pos.floor() as usize;
        let right_idx = (left_idx + 1).min(max_source_idx);
        let frac = (source_pos - left_idx as f64) as f32;
        output.push(samples[left_idx] * (1.0 - frac) + samples[right_idx] * frac);
    }
    output
}
