//! Signal pre-processing pipeline: noise reduction, loudness normalization,
//! voice extraction, low-pass filtering.
//!
//! Only the initial decode is fatal. Every later stage is best-effort: a
//! failing stage logs and passes its input through unchanged, so enabling
//! pre-processing can degrade quality but never availability.

use std::path::{Path, PathBuf};

use speech_domain::{AudioBuffer, DomainError};

use crate::filters::{lowpass_filter, rms_normalize};
use crate::noise::SpectralNoiseReducer;
use crate::normalizer::{decode_to_target, write_wav};
use crate::vad::VoiceActivityDetector;

/// Cutoff for the final low-pass stage. At the canonical 16 kHz rate this
/// sits above Nyquist and the filter clamps it down, matching the behavior
/// at higher source rates.
const LOWPASS_CUTOFF_HZ: f64 = 8_000.0;

#[derive(Debug, Clone, Copy)]
pub struct PreprocessOptions {
    pub noise_reduction: bool,
    pub normalize: bool,
    pub vad: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            noise_reduction: true,
            normalize: true,
            vad: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct Preprocessor {
    options: PreprocessOptions,
    noise: SpectralNoiseReducer,
    vad: VoiceActivityDetector,
}

impl Preprocessor {
    pub fn new(options: PreprocessOptions) -> Self {
        Self {
            options,
            noise: SpectralNoiseReducer::new(),
            vad: VoiceActivityDetector::new(),
        }
    }

    /// Run the enabled stages over an in-memory buffer.
    pub fn process_buffer(&self, mut buffer: AudioBuffer) -> AudioBuffer {
        let input_samples = buffer.samples.len();

        if self.options.noise_reduction {
            match self.noise.reduce(&buffer.samples) {
                Ok(cleaned) => buffer.samples = cleaned,
                Err(error) => {
                    tracing::warn!(%error, "noise reduction skipped");
                }
            }
        }

        if self.options.normalize {
            buffer.samples = rms_normalize(buffer.samples);
        }

        if self.options.vad {
            buffer = self.vad.extract_voice(buffer);
        }

        buffer.samples = lowpass_filter(&buffer.samples, buffer.sample_rate_hz, LOWPASS_CUTOFF_HZ);

        tracing::debug!(
            input_samples,
            output_samples = buffer.samples.len(),
            sample_rate_hz = buffer.sample_rate_hz,
            "pre-processing complete"
        );
        buffer
    }

    /// Decode `input` and run the pipeline.
    ///
    /// A decode failure is fatal; there is nothing to pass through.
    pub fn process(&self, input: &Path) -> Result<AudioBuffer, DomainError> {
        let buffer = decode_to_target(input)?;
        Ok(self.process_buffer(buffer))
    }

    /// Like [`process`](Self::process), additionally writing the result to
    /// `output` as a canonical WAV.
    pub fn process_file(&self, input: &Path, output: &Path) -> Result<PathBuf, DomainError> {
        let processed = self.process(input)?;
        write_wav(output, &processed.samples, processed.sample_rate_hz)?;
        Ok(output.to_path_buf())
    }
}
