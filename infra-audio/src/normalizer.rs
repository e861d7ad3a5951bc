//! Conversion of arbitrary uploaded audio into the canonical format every
//! downstream stage assumes: WAV, PCM s16le, mono, 16 kHz.

use std::path::{Path, PathBuf};
use std::process::Command;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use speech_domain::{AudioBuffer, DomainError};

pub const TARGET_SAMPLE_RATE: u32 = 16_000;
const BYTES_PER_SAMPLE: u64 = 2;
/// Encoded output may be at most this much smaller than the size implied by
/// the source duration before the conversion counts as incomplete.
const SIZE_FLOOR_RATIO: f64 = 0.8;
/// Allowed relative mismatch between source and re-decoded duration.
const DURATION_TOLERANCE: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct AudioNormalizer {
    min_duration_secs: f64,
}

impl Default for AudioNormalizer {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl AudioNormalizer {
    pub fn new(min_duration_secs: f64) -> Self {
        Self { min_duration_secs }
    }

    /// Produce a canonical WAV for `input`, returning its path.
    ///
    /// A `.wav` input is already canonical and is returned unchanged. For
    /// anything else the in-process decoder runs first and an external
    /// `ffmpeg` transcode is the fallback; the original file is deleted only
    /// after the canonical file has passed validation.
    pub fn normalize(&self, input: &Path) -> Result<PathBuf, DomainError> {
        if has_extension(input, "wav") {
            return Ok(input.to_path_buf());
        }

        let canonical = input.with_extension("wav");
        match self.transcode_in_process(input, &canonical) {
            Ok(()) => {}
            // Data problems are final; only decoder failures earn a fallback.
            Err(TranscodeFailure::Invalid(error)) => return Err(error),
            Err(TranscodeFailure::Decode(detail)) => {
                tracing::warn!(
                    input = %input.display(),
                    detail,
                    "in-process transcode failed, falling back to ffmpeg"
                );
                self.transcode_with_ffmpeg(input, &canonical)?;
            }
        }

        // Never delete-before-verify: the original goes away only now that
        // the canonical file exists and validated.
        if canonical != input {
            if let Err(error) = std::fs::remove_file(input) {
                tracing::warn!(input = %input.display(), %error, "failed to remove source file");
            }
        }
        Ok(canonical)
    }

    fn transcode_in_process(
        &self,
        input: &Path,
        canonical: &Path,
    ) -> Result<(), TranscodeFailure> {
        let source = decode_file(input).map_err(|error| TranscodeFailure::Decode(error.to_string()))?;
        let source_duration = source.duration_secs();
        if source_duration < self.min_duration_secs {
            return Err(TranscodeFailure::Invalid(DomainError::invalid_audio(
                format!(
                    "source too short: {source_duration:.2}s (minimum {:.2}s)",
                    self.min_duration_secs
                ),
            )));
        }

        let samples = resample_sinc(&source.samples, source.sample_rate_hz, TARGET_SAMPLE_RATE)
            .map_err(|error| TranscodeFailure::Decode(error.to_string()))?;
        write_wav(canonical, &samples, TARGET_SAMPLE_RATE)
            .map_err(|error| TranscodeFailure::Decode(error.to_string()))?;

        self.validate_canonical(canonical, source_duration)
            .map_err(|error| {
                let _ = std::fs::remove_file(canonical);
                TranscodeFailure::Invalid(error)
            })
    }

    /// Validation gates over the freshly written canonical file.
    fn validate_canonical(&self, canonical: &Path, source_duration: f64) -> Result<(), DomainError> {
        let size = std::fs::metadata(canonical)
            .map_err(|error| DomainError::invalid_audio(format!("converted file unreadable: {error}")))?
            .len();
        let expected_floor = (source_duration
            * f64::from(TARGET_SAMPLE_RATE)
            * BYTES_PER_SAMPLE as f64
            * SIZE_FLOOR_RATIO) as u64;
        if size < expected_floor {
            return Err(DomainError::invalid_audio(format!(
                "converted file too small: {size} bytes (expected > {expected_floor}), conversion incomplete"
            )));
        }

        let decoded_duration = wav_duration_secs(canonical)?;
        if (decoded_duration - source_duration).abs() > source_duration * DURATION_TOLERANCE {
            return Err(DomainError::invalid_audio(format!(
                "converted duration {decoded_duration:.2}s does not match source {source_duration:.2}s"
            )));
        }
        Ok(())
    }

    fn transcode_with_ffmpeg(&self, input: &Path, canonical: &Path) -> Result<(), DomainError> {
        let output = Command::new("ffmpeg")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-ar", "16000", "-ac", "1", "-f", "wav"])
            .arg(canonical)
            .output()
            .map_err(|error| {
                if error.kind() == std::io::ErrorKind::NotFound {
                    DomainError::conversion_unavailable(
                        "ffmpeg not found in PATH; install it (apt-get install ffmpeg / brew install ffmpeg)",
                    )
                } else {
                    DomainError::conversion_unavailable(format!("failed to run ffmpeg: {error}"))
                }
            })?;

        if !output.status.success() {
            let _ = std::fs::remove_file(canonical);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail: String = stderr.lines().next_back().unwrap_or("unknown error").into();
            return Err(DomainError::conversion_unavailable(format!(
                "ffmpeg transcode failed: {detail}"
            )));
        }

        // The source duration is unknown on this path, so only the duration
        // floor can be enforced.
        let duration = wav_duration_secs(canonical).map_err(|error| {
            let _ = std::fs::remove_file(canonical);
            error
        })?;
        if duration < self.min_duration_secs {
            let _ = std::fs::remove_file(canonical);
            return Err(DomainError::invalid_audio(format!(
                "source too short: {duration:.2}s (minimum {:.2}s)",
                self.min_duration_secs
            )));
        }
        Ok(())
    }
}

enum TranscodeFailure {
    /// Data failed a validation gate; no fallback applies.
    Invalid(DomainError),
    /// The decoder itself failed; the fallback path may still succeed.
    Decode(String),
}

/// Decode any supported container to mono samples at the source rate.
pub fn decode_file(path: &Path) -> Result<AudioBuffer, DomainError> {
    let file = std::fs::File::open(path).map_err(|error| {
        if error.kind() == std::io::ErrorKind::NotFound {
            DomainError::not_found(path.display().to_string())
        } else {
            DomainError::invalid_audio(format!("cannot open {}: {error}", path.display()))
        }
    })?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format_hint(path));

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|error| DomainError::invalid_audio(format!("unrecognized container: {error}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| DomainError::invalid_audio("no audio track found"))?;
    let codec_params = track.codec_params.clone();
    let track_id = track.id;
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| DomainError::invalid_audio("source sample rate unknown"))?;
    let channels = codec_params.channels.map_or(1, |c| c.count()).max(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|error| DomainError::invalid_audio(format!("codec init failed: {error}")))?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref error))
                if error.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(error) => {
                return Err(DomainError::invalid_audio(format!("packet read failed: {error}")))
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|error| DomainError::invalid_audio(format!("decode failed: {error}")))?;
        let spec = *decoded.spec();
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);

        if channels > 1 {
            for frame in buffer.samples().chunks(channels) {
                samples.push(frame.iter().sum::<f32>() / channels as f32);
            }
        } else {
            samples.extend_from_slice(buffer.samples());
        }
    }

    if samples.is_empty() {
        return Err(DomainError::invalid_audio("no audio samples decoded"));
    }
    Ok(AudioBuffer::new(sample_rate, samples))
}

/// Decode and resample to the canonical 16 kHz mono buffer.
pub fn decode_to_target(path: &Path) -> Result<AudioBuffer, DomainError> {
    let source = decode_file(path)?;
    let samples = resample_sinc(&source.samples, source.sample_rate_hz, TARGET_SAMPLE_RATE)?;
    Ok(AudioBuffer::new(TARGET_SAMPLE_RATE, samples))
}

/// High-quality sinc resampling for the canonical conversion path.
pub fn resample_sinc(
    samples: &[f32],
    from_rate_hz: u32,
    to_rate_hz: u32,
) -> Result<Vec<f32>, DomainError> {
    if from_rate_hz == to_rate_hz {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = f64::from(to_rate_hz) / f64::from(from_rate_hz);
    let chunk_size = 1_024;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|error| DomainError::invalid_audio(format!("resampler init failed: {error}")))?;

    let mut output = Vec::with_capacity((samples.len() as f64 * ratio) as usize + chunk_size);
    for chunk in samples.chunks(chunk_size) {
        let input = if chunk.len() < chunk_size {
            let mut padded = chunk.to_vec();
            padded.resize(chunk_size, 0.0);
            vec![padded]
        } else {
            vec![chunk.to_vec()]
        };
        let resampled = resampler
            .process(&input, None)
            .map_err(|error| DomainError::invalid_audio(format!("resample failed: {error}")))?;
        if let Some(channel) = resampled.first() {
            output.extend_from_slice(channel);
        }
    }
    Ok(output)
}

pub fn write_wav(path: &Path, samples: &[f32], sample_rate_hz: u32) -> Result<(), DomainError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|error| DomainError::invalid_audio(format!("cannot create wav: {error}")))?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(value)
            .map_err(|error| DomainError::invalid_audio(format!("wav write failed: {error}")))?;
    }
    writer
        .finalize()
        .map_err(|error| DomainError::invalid_audio(format!("wav finalize failed: {error}")))
}

fn wav_duration_secs(path: &Path) -> Result<f64, DomainError> {
    let reader = hound::WavReader::open(path)
        .map_err(|error| DomainError::invalid_audio(format!("converted wav unreadable: {error}")))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(DomainError::invalid_audio("converted wav has zero sample rate"));
    }
    Ok(f64::from(reader.duration()) / f64::from(spec.sample_rate))
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

/// Extension-based container hint; unknown extensions fall back to webm, the
/// format browsers upload by default.
fn format_hint(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("wav") => "wav",
        Some("mp3") => "mp3",
        Some("m4a") | Some("mp4") | Some("aac") => "m4a",
        Some("ogg") | Some("oga") => "ogg",
        Some("flac") => "flac",
        _ => "webm",
    }
}
