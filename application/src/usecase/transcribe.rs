//! Transcription orchestration: validate, normalize, pre-process, decode,
//! sanitize.
//!
//! Decoding is single-flight: one request holds the engine at a time, and
//! the engine is reloaded before every decode so no state from a previous
//! request can influence the result. All intermediate files live in the
//! service temp directory under drop guards; the caller's original file is
//! never touched.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use speech_domain::{
    DecodeOptions, DomainError, LanguageTag, TranscribeTask, TranscriptionEnginePort,
    TranscriptionResult,
};
use speech_infra_audio::normalizer::decode_to_target;
use speech_infra_audio::{
    AudioNormalizer, PreprocessOptions, Preprocessor, TempArtifact, timestamped_artifact_path,
};

use crate::dto::TranscribeCommand;
use crate::error::ApplicationError;
use crate::sanitize::sanitize_transcription;

#[derive(Debug, Clone)]
pub struct TranscriptionSettings {
    /// Default language when the command carries none.
    pub language: String,
    pub task: TranscribeTask,
    pub threads: usize,
    pub min_duration_secs: f64,
    /// Pre-processing stages, or `None` to feed normalized audio directly.
    pub preprocess: Option<PreprocessOptions>,
    pub temp_dir: PathBuf,
}

pub struct TranscriptionOrchestrator {
    engine: Arc<dyn TranscriptionEnginePort>,
    normalizer: AudioNormalizer,
    preprocessor: Option<Preprocessor>,
    settings: TranscriptionSettings,
    decode_lock: tokio::sync::Mutex<()>,
}

impl TranscriptionOrchestrator {
    pub fn new(engine: Arc<dyn TranscriptionEnginePort>, settings: TranscriptionSettings) -> Self {
        Self {
            engine,
            normalizer: AudioNormalizer::new(settings.min_duration_secs),
            preprocessor: settings.preprocess.map(Preprocessor::new),
            settings,
            decode_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn transcribe(
        &self,
        command: TranscribeCommand,
    ) -> Result<TranscriptionResult, ApplicationError> {
        let session_id = uuid::Uuid::new_v4();
        let started = Instant::now();
        tracing::info!(
            %session_id,
            audio_path = %command.audio_path.display(),
            "transcription requested"
        );

        self.validate_input(&command.audio_path)?;

        // Work on a private copy so the caller's file survives every
        // outcome, including format conversion (which consumes its input).
        let working_copy = self.stage_working_copy(&command.audio_path)?;
        let canonical_path = self.normalizer.normalize(working_copy.path())?;
        // Conversion produces a sibling file under a new name; guard it too.
        let _canonical = TempArtifact::new(canonical_path.clone());

        let buffer = decode_to_target(&canonical_path)?;
        let duration = buffer.duration_secs();
        if duration < self.settings.min_duration_secs {
            return Err(DomainError::too_short(duration, self.settings.min_duration_secs).into());
        }

        let buffer = match &self.preprocessor {
            Some(preprocessor) => preprocessor.process_buffer(buffer),
            None => buffer,
        };

        let language = LanguageTag::parse(
            command
                .language
                .as_deref()
                .unwrap_or(&self.settings.language),
        );
        let options =
            DecodeOptions::deterministic(language.clone(), self.settings.task, self.settings.threads);

        let raw = {
            let _guard = self.decode_lock.lock().await;
            self.engine.reload().await?;
            match self.engine.transcribe_samples(&buffer.samples, &options).await {
                Ok(raw) => raw,
                Err(error) => {
                    tracing::warn!(%session_id, %error, "sample decode failed, retrying from file");
                    self.engine.transcribe_path(&canonical_path, &options).await?
                }
            }
        };

        let (text, segments) = sanitize_transcription(&raw)?;
        let result = TranscriptionResult {
            word_count: text.split_whitespace().count(),
            language: raw
                .language
                .or_else(|| language.as_code().map(str::to_string))
                .unwrap_or_else(|| "auto".to_string()),
            text,
            segments,
            latency_secs: started.elapsed().as_secs_f64(),
            model: self.engine.model_info(),
        };

        tracing::info!(
            %session_id,
            latency_secs = result.latency_secs,
            word_count = result.word_count,
            segments = result.segments.len(),
            "transcription complete"
        );
        Ok(result)
    }

    fn validate_input(&self, path: &Path) -> Result<(), DomainError> {
        let metadata = std::fs::metadata(path)
            .map_err(|_| DomainError::not_found(path.display().to_string()))?;
        if metadata.len() == 0 {
            return Err(DomainError::EmptyAudio);
        }
        Ok(())
    }

    fn stage_working_copy(&self, original: &Path) -> Result<TempArtifact, DomainError> {
        std::fs::create_dir_all(&self.settings.temp_dir)
            .map_err(|error| DomainError::internal(format!("cannot create temp dir: {error}")))?;
        let staged = timestamped_artifact_path(&self.settings.temp_dir, Some(original));
        std::fs::copy(original, &staged)
            .map_err(|error| DomainError::internal(format!("cannot stage audio: {error}")))?;
        Ok(TempArtifact::new(staged))
    }
}
