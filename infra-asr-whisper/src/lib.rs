//! whisper.cpp adapter for the transcription engine port.
//!
//! The context is held behind a mutex and recreated on [`reload`], which
//! gives every transcription a freshly initialized engine. Decode parameters
//! come from the caller's [`DecodeOptions`] and are rebuilt per call, so no
//! state leaks between requests.
//!
//! [`reload`]: TranscriptionEnginePort::reload

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters,
};

use speech_domain::{
    DecodeOptions, DomainError, LanguageTag, ModelInfo, RawSegment, RawTranscription,
    TranscribeTask, TranscriptionEnginePort,
};

#[derive(Debug, Clone)]
pub struct WhisperEngineConfig {
    pub model_path: String,
}

pub struct WhisperEngineAdapter {
    config: WhisperEngineConfig,
    runtime: Mutex<WhisperRuntime>,
}

struct WhisperRuntime {
    context: Option<WhisperContext>,
}

impl WhisperEngineAdapter {
    pub fn new(config: WhisperEngineConfig) -> Self {
        Self {
            config,
            runtime: Mutex::new(WhisperRuntime { context: None }),
        }
    }

    fn load_context(&self) -> Result<WhisperContext, DomainError> {
        tracing::debug!(model_path = %self.config.model_path, "loading whisper model");
        WhisperContext::new_with_params(&self.config.model_path, WhisperContextParameters::default())
            .map_err(|err| DomainError::model(format!("failed to load model: {err}")))
    }

    fn transcribe_with_runtime(
        &self,
        samples: &[f32],
        options: &DecodeOptions,
    ) -> Result<RawTranscription, DomainError> {
        let mut runtime = self
            .runtime
            .lock()
            .map_err(|_| DomainError::internal("whisper runtime lock poisoned"))?;

        if runtime.context.is_none() {
            runtime.context = Some(self.load_context()?);
        }
        let context = runtime
            .context
            .as_ref()
            .ok_or_else(|| DomainError::internal("whisper context unavailable"))?;

        let mut state = context
            .create_state()
            .map_err(|err| DomainError::model(format!("failed to create state: {err}")))?;

        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: options.beam_size as i32,
            patience: options.patience,
        });
        params.set_n_threads(options.threads as i32);
        let decode_language = resolve_decode_language(&options.language);
        params.set_language(decode_language.as_deref());
        params.set_translate(matches!(options.task, TranscribeTask::Translate));
        params.set_temperature(options.temperature);
        params.set_no_speech_thold(options.no_speech_threshold);
        params.set_entropy_thold(options.entropy_threshold);
        params.set_logprob_thold(options.logprob_threshold);
        params.set_suppress_blank(options.suppress_blank);
        params.set_no_context(!options.condition_on_previous_text);
        params.set_no_timestamps(false);
        params.set_token_timestamps(true);
        params.set_print_realtime(false);
        params.set_print_progress(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|err| DomainError::model(format!("full decode failed: {err}")))?;

        let mut segments = Vec::new();
        let mut text = String::new();
        for idx in 0..state.full_n_segments() {
            let Some(segment) = state.get_segment(idx) else {
                continue;
            };
            let segment_text = segment
                .to_str_lossy()
                .map(|cow| cow.to_string())
                .unwrap_or_default();

            let mut token_probs = Vec::new();
            let mut logprob_sum = 0.0f64;
            for token_idx in 0..segment.n_tokens().max(0) {
                let Some(token) = segment.get_token(token_idx) else {
                    continue;
                };
                token_probs.push(token.token_probability());
                logprob_sum += f64::from(token.token_data().plog);
            }
            let avg_logprob = if token_probs.is_empty() {
                0.0
            } else {
                logprob_sum / token_probs.len() as f64
            };

            if !text.is_empty() && !segment_text.is_empty() {
                text.push(' ');
            }
            text.push_str(segment_text.trim());

            let compression_ratio = repetition_ratio(&segment_text);
            segments.push(RawSegment {
                // Engine timestamps are in 10 ms units.
                start_secs: segment.start_timestamp() as f64 * 0.01,
                end_secs: segment.end_timestamp() as f64 * 0.01,
                text: segment_text,
                temperature: options.temperature,
                avg_logprob,
                // The binding does not expose the per-segment no-speech
                // probability, so the field stays at its neutral value.
                no_speech_prob: 0.0,
                compression_ratio,
                token_probs,
            });
        }

        Ok(RawTranscription {
            text,
            language: decode_language,
            segments,
        })
    }
}

#[async_trait]
impl TranscriptionEnginePort for WhisperEngineAdapter {
    /// Drop any live context and load a fresh one from disk.
    async fn reload(&self) -> Result<(), DomainError> {
        let fresh = self.load_context()?;
        let mut runtime = self
            .runtime
            .lock()
            .map_err(|_| DomainError::internal("whisper runtime lock poisoned"))?;
        runtime.context = Some(fresh);
        tracing::debug!("whisper engine reloaded");
        Ok(())
    }

    async fn transcribe_samples(
        &self,
        samples: &[f32],
        options: &DecodeOptions,
    ) -> Result<RawTranscription, DomainError> {
        self.transcribe_with_runtime(samples, options)
    }

    async fn transcribe_path(
        &self,
        path: &Path,
        options: &DecodeOptions,
    ) -> Result<RawTranscription, DomainError> {
        let samples = load_wav_samples(path)?;
        self.transcribe_with_runtime(&samples, options)
    }

    fn model_info(&self) -> ModelInfo {
        let model = Path::new(&self.config.model_path)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("unknown")
            .to_string();
        ModelInfo {
            model,
            device: "cpu".to_string(),
        }
    }
}

fn resolve_decode_language(language: &LanguageTag) -> Option<String> {
    match language {
        LanguageTag::Auto => None,
        LanguageTag::Code(code) => {
            let normalized = code.trim().to_ascii_lowercase();
            if normalized.is_empty() {
                None
            } else {
                Some(normalized)
            }
        }
    }
}

/// Canonical 16-bit or float WAV to f32 samples in [-1, 1].
pub fn load_wav_samples(path: &Path) -> Result<Vec<f32>, DomainError> {
    let mut reader = hound::WavReader::open(path).map_err(|err| match err {
        hound::Error::IoError(ref io) if io.kind() == std::io::ErrorKind::NotFound => {
            DomainError::not_found(path.display().to_string())
        }
        other => DomainError::invalid_audio(format!("cannot read wav: {other}")),
    })?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|sample| sample.map(|value| f32::from(value) / f32::from(i16::MAX)))
            .collect::<Result<_, _>>()
            .map_err(|err| DomainError::invalid_audio(format!("wav sample read failed: {err}")))?,
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|err| DomainError::invalid_audio(format!("wav sample read failed: {err}")))?,
    };

    if samples.is_empty() {
        return Err(DomainError::EmptyAudio);
    }

    if spec.channels > 1 {
        let channels = spec.channels as usize;
        return Ok(samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect());
    }
    Ok(samples)
}

/// Ratio of raw length to run-length-collapsed length; a crude proxy for the
/// repetitiveness diagnostic a decoder would report.
fn repetition_ratio(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let mut collapsed = 0usize;
    let mut previous: Option<char> = None;
    let mut run = 0usize;
    for ch in text.chars() {
        if previous == Some(ch) {
            run += 1;
            if run <= 2 {
                collapsed += 1;
            }
        } else {
            previous = Some(ch);
            run = 1;
            collapsed += 1;
        }
    }
    text.chars().count() as f64 / collapsed.max(1) as f64
}
