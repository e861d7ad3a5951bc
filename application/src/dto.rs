use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One transcription request as received from the outer surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeCommand {
    pub audio_path: PathBuf,
    /// Language code or "auto"; absent means the configured default.
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizeCommand {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub slow: bool,
}
