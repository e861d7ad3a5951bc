//! Stateless signal filters: RMS loudness normalization and a zero-phase
//! Butterworth low-pass.

/// Target RMS level after loudness normalization.
const TARGET_RMS: f32 = 0.1;

/// Scale samples so their RMS hits [`TARGET_RMS`], then clip to [-1, 1].
///
/// Empty input is returned unchanged; silent input (RMS 0) is not scaled but
/// still passes through the clip.
pub fn rms_normalize(mut samples: Vec<f32>) -> Vec<f32> {
    if samples.is_empty() {
        return samples;
    }

    let rms = rms(&samples);
    if rms > 0.0 {
        let gain = TARGET_RMS / rms;
        for sample in &mut samples {
            *sample *= gain;
        }
    }

    for sample in &mut samples {
        *sample = sample.clamp(-1.0, 1.0);
    }
    samples
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|&x| x * x).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// 4th-order Butterworth low-pass, applied forward and backward so the net
/// phase response is zero.
///
/// The cutoff is clamped before design: a cutoff at or above Nyquist becomes
/// 0.95 x Nyquist, and the normalized ratio is kept inside (0.01, 0.95) so
/// the biquad coefficients stay well-conditioned.
pub fn lowpass_filter(samples: &[f32], sample_rate_hz: u32, cutoff_hz: f64) -> Vec<f32> {
    if samples.len() < 2 || sample_rate_hz == 0 {
        return samples.to_vec();
    }

    let ratio = normalized_cutoff(sample_rate_hz, cutoff_hz);
    let sections = butterworth_lowpass_sections(ratio);

    // Forward pass, then reversed pass, cancels the cascade's phase shift.
    let mut forward = cascade(&sections, samples);
    forward.reverse();
    let mut backward = cascade(&sections, &forward);
    backward.reverse();
    backward
}

/// Clamped cutoff ratio relative to Nyquist, always inside [0.01, 0.95].
pub fn normalized_cutoff(sample_rate_hz: u32, cutoff_hz: f64) -> f64 {
    let nyquist = f64::from(sample_rate_hz) / 2.0;
    let mut cutoff = cutoff_hz;
    if cutoff >= nyquist {
        cutoff = nyquist * 0.95;
    }
    (cutoff / nyquist).clamp(0.01, 0.95)
}

#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    /// RBJ cookbook low-pass section for the given quality factor.
    fn lowpass(ratio: f64, q: f64) -> Self {
        let w0 = std::f64::consts::PI * ratio;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let a0 = 1.0 + alpha;
        Self {
            b0: ((1.0 - cos_w0) / 2.0) / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: ((1.0 - cos_w0) / 2.0) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn run(&self, input: &[f32]) -> Vec<f32> {
        // Direct form II transposed.
        let mut z1 = 0.0f64;
        let mut z2 = 0.0f64;
        input
            .iter()
            .map(|&x| {
                let x = f64::from(x);
                let y = self.b0 * x + z1;
                z1 = self.b1 * x - self.a1 * y + z2;
                z2 = self.b2 * x - self.a2 * y;
                y as f32
            })
            .collect()
    }
}

/// A 4th-order Butterworth low-pass as two cascaded biquad sections.
fn butterworth_lowpass_sections(ratio: f64) -> [Biquad; 2] {
    // Pole quality factors for the order-4 Butterworth prototype.
    let q1 = 1.0 / (2.0 * (std::f64::consts::PI / 8.0).cos());
    let q2 = 1.0 / (2.0 * (3.0 * std::f64::consts::PI / 8.0).cos());
    [Biquad::lowpass(ratio, q1), Biquad::lowpass(ratio, q2)]
}

fn cascade(sections: &[Biquad; 2], input: &[f32]) -> Vec<f32> {
    let stage = sections[0].run(input);
    sections[1].run(&stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rms_normalize_empty_is_noop() {
        assert!(rms_normalize(Vec::new()).is_empty());
    }

    #[test]
    fn rms_normalize_silence_is_unchanged() {
        let silence = vec![0.0f32; 480];
        assert_eq!(rms_normalize(silence.clone()), silence);
    }

    #[test]
    fn rms_normalize_hits_target_level() {
        let samples: Vec<f32> = (0..1600)
            .map(|i| 0.5 * (i as f32 * 0.05).sin())
            .collect();
        let normalized = rms_normalize(samples);
        assert_abs_diff_eq!(rms(&normalized), 0.1, epsilon = 1e-3);
    }

    #[test]
    fn rms_normalize_output_stays_in_range() {
        // Very quiet input gets a large gain; the clip must still hold.
        let samples: Vec<f32> = (0..1600).map(|i| if i % 100 == 0 { 0.9 } else { 1e-4 }).collect();
        let normalized = rms_normalize(samples);
        assert!(normalized.iter().all(|&s| (-1.0..=1.0).contains(&s)));
    }

    #[test]
    fn cutoff_clamps_at_nyquist() {
        // 8 kHz cutoff at an 8 kHz sample rate is twice Nyquist.
        let ratio = normalized_cutoff(8_000, 8_000.0);
        assert!(ratio <= 0.95);
        assert!(ratio >= 0.01);

        // Regular case: 8 kHz cutoff at 44.1 kHz.
        let ratio = normalized_cutoff(44_100, 8_000.0);
        assert_abs_diff_eq!(ratio, 8_000.0 / 22_050.0, epsilon = 1e-9);

        // Degenerate low cutoff still stays off zero.
        assert!(normalized_cutoff(16_000, 0.0) >= 0.01);
    }

    #[test]
    fn lowpass_attenuates_high_frequency() {
        let sample_rate = 44_100u32;
        let low: Vec<f32> = (0..4_410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin())
            .collect();
        let high: Vec<f32> = (0..4_410)
            .map(|i| (2.0 * std::f32::consts::PI * 15_000.0 * i as f32 / sample_rate as f32).sin())
            .collect();

        let low_out = lowpass_filter(&low, sample_rate, 8_000.0);
        let high_out = lowpass_filter(&high, sample_rate, 8_000.0);

        // Interior region avoids filter edge transients.
        let mid = 1_000..3_410;
        let low_energy = rms(&low_out[mid.clone()]);
        let high_energy = rms(&high_out[mid]);
        assert!(low_energy > 0.5, "passband should survive: {low_energy}");
        assert!(
            high_energy < 0.05,
            "stopband should be attenuated: {high_energy}"
        );
    }

    #[test]
    fn lowpass_short_input_is_passthrough() {
        assert_eq!(lowpass_filter(&[0.5], 16_000, 8_000.0), vec![0.5]);
    }
}
