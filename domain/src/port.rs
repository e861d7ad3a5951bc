use std::path::Path;

use async_trait::async_trait;

use crate::{
    DecodeOptions, DomainError, ModelInfo, RawTranscription, SynthesisOutput, SynthesisRequest,
    VoiceInfo,
};

/// Acoustic model boundary. The engine is stateful between calls unless
/// reloaded; callers that need a clean decoder must invoke `reload` first.
#[async_trait]
pub trait TranscriptionEnginePort: Send + Sync {
    /// Discard the current model handle and load a fresh one, dropping any
    /// device-local caches with it.
    async fn reload(&self) -> Result<(), DomainError>;

    /// Decode in-memory samples (16 kHz mono).
    async fn transcribe_samples(
        &self,
        samples: &[f32],
        options: &DecodeOptions,
    ) -> Result<RawTranscription, DomainError>;

    /// Decode directly from a canonical WAV file.
    async fn transcribe_path(
        &self,
        path: &Path,
        options: &DecodeOptions,
    ) -> Result<RawTranscription, DomainError>;

    fn model_info(&self) -> ModelInfo;
}

#[async_trait]
pub trait SpeechSynthesisPort: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest)
        -> Result<SynthesisOutput, DomainError>;

    async fn voices(&self) -> Result<Vec<VoiceInfo>, DomainError>;
}
