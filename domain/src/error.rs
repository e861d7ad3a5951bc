use thiserror::Error;

/// Error taxonomy shared by every port and adapter.
///
/// Validation kinds are data problems the caller can act on;
/// `ConversionUnavailable` is the one environment problem (missing decode
/// toolchain) and `Model`/`CorruptOutput` come from the acoustic engine.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("audio file not found: {path}")]
    AudioNotFound { path: String },

    #[error("audio file is empty")]
    EmptyAudio,

    #[error("audio too short: {seconds:.2}s (minimum {minimum:.2}s)")]
    AudioTooShort { seconds: f64, minimum: f64 },

    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    #[error("audio conversion unavailable: {0}")]
    ConversionUnavailable(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("corrupt transcription output: {0}")]
    CorruptOutput(String),

    #[error("synthesis error: {0}")]
    Synthesis(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::AudioNotFound { path: path.into() }
    }

    pub fn too_short(seconds: f64, minimum: f64) -> Self {
        Self::AudioTooShort { seconds, minimum }
    }

    pub fn invalid_audio(message: impl Into<String>) -> Self {
        Self::InvalidAudio(message.into())
    }

    pub fn conversion_unavailable(message: impl Into<String>) -> Self {
        Self::ConversionUnavailable(message.into())
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }

    pub fn corrupt_output(message: impl Into<String>) -> Self {
        Self::CorruptOutput(message.into())
    }

    pub fn synthesis(message: impl Into<String>) -> Self {
        Self::Synthesis(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
