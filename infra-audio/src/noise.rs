//! Stationary-noise reduction by spectral gating.
//!
//! Best-effort stage: the pipeline maps any error here to pass-through, so
//! this module only has to be honest about failure, not resilient.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use thiserror::Error;

const FFT_SIZE: usize = 1_024;
const HOP_SIZE: usize = 256;

/// Fraction by which gated bins are attenuated.
const REDUCTION_STRENGTH: f32 = 0.8;
/// Bins louder than `mean + N * std` of their own history count as signal.
const GATE_STD_FACTOR: f32 = 1.5;

const EPSILON: f32 = 1e-10;

#[derive(Debug, Error)]
pub enum NoiseError {
    #[error("signal too short for spectral analysis: {0} samples")]
    TooShort(usize),
}

#[derive(Debug, Default)]
pub struct SpectralNoiseReducer;

impl SpectralNoiseReducer {
    pub fn new() -> Self {
        Self
    }

    /// Gate each spectrogram bin against a per-bin stationary noise profile
    /// estimated from the whole signal, attenuating gated bins by
    /// [`REDUCTION_STRENGTH`].
    pub fn reduce(&self, samples: &[f32]) -> Result<Vec<f32>, NoiseError> {
        if samples.len() < FFT_SIZE {
            return Err(NoiseError::TooShort(samples.len()));
        }

        let window = hann_window();
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let ifft = planner.plan_fft_inverse(FFT_SIZE);

        // Zero-pad the tail so the last hop still fills a frame.
        let mut padded = samples.to_vec();
        padded.resize(samples.len() + FFT_SIZE, 0.0);

        let frame_count = (padded.len() - FFT_SIZE) / HOP_SIZE + 1;
        let mut spectra: Vec<Vec<Complex<f32>>> = Vec::with_capacity(frame_count);
        for frame_idx in 0..frame_count {
            let offset = frame_idx * HOP_SIZE;
            let mut frame: Vec<Complex<f32>> = padded[offset..offset + FFT_SIZE]
                .iter()
                .zip(&window)
                .map(|(&s, &w)| Complex::new(s * w, 0.0))
                .collect();
            fft.process(&mut frame);
            spectra.push(frame);
        }

        // Stationary profile: mean and deviation of each bin's log magnitude.
        let bins = FFT_SIZE / 2 + 1;
        let mut thresholds = vec![0.0f32; bins];
        for bin in 0..bins {
            let mags: Vec<f32> = spectra
                .iter()
                .map(|frame| log_magnitude(frame[bin]))
                .collect();
            let mean = mags.iter().sum::<f32>() / mags.len() as f32;
            let variance =
                mags.iter().map(|m| (m - mean).powi(2)).sum::<f32>() / mags.len() as f32;
            thresholds[bin] = mean + GATE_STD_FACTOR * variance.sqrt();
        }

        for frame in &mut spectra {
            for bin in 0..bins {
                let gain = if log_magnitude(frame[bin]) > thresholds[bin] {
                    1.0
                } else {
                    1.0 - REDUCTION_STRENGTH
                };
                frame[bin] *= gain;
                // Mirror the gain onto the conjugate bin to keep the
                // inverse transform real-valued.
                if bin > 0 && bin < FFT_SIZE / 2 {
                    frame[FFT_SIZE - bin] *= gain;
                }
            }
        }

        // Weighted overlap-add with the same window on synthesis.
        let mut output = vec![0.0f32; padded.len()];
        let mut norm = vec![0.0f32; padded.len()];
        for (frame_idx, mut frame) in spectra.into_iter().enumerate() {
            ifft.process(&mut frame);
            let offset = frame_idx * HOP_SIZE;
            for i in 0..FFT_SIZE {
                output[offset + i] += frame[i].re / FFT_SIZE as f32 * window[i];
                norm[offset + i] += window[i] * window[i];
            }
        }
        for (sample, weight) in output.iter_mut().zip(&norm) {
            if *weight > EPSILON {
                *sample /= weight;
            }
        }

        output.truncate(samples.len());
        Ok(output)
    }
}

fn hann_window() -> Vec<f32> {
    (0..FFT_SIZE)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / FFT_SIZE as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

fn log_magnitude(value: Complex<f32>) -> f32 {
    20.0 * (value.norm() + EPSILON).log10()
}
