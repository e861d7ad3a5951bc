use std::sync::Arc;

use speech_domain::{SpeechSynthesisPort, SynthesisOutput, SynthesisRequest, VoiceInfo};

use crate::dto::SynthesizeCommand;
use crate::error::ApplicationError;

#[derive(Debug, Clone)]
pub struct SynthesisDefaults {
    pub language: String,
    pub voice_id: Option<String>,
    pub rate_wpm: u32,
    pub volume: f32,
}

pub struct SynthesisUseCase {
    port: Arc<dyn SpeechSynthesisPort>,
    defaults: SynthesisDefaults,
}

impl SynthesisUseCase {
    pub fn new(port: Arc<dyn SpeechSynthesisPort>, defaults: SynthesisDefaults) -> Self {
        Self { port, defaults }
    }

    pub async fn synthesize(
        &self,
        command: SynthesizeCommand,
    ) -> Result<SynthesisOutput, ApplicationError> {
        if command.text.trim().is_empty() {
            return Err(ApplicationError::Validation(
                "text to synthesize is empty".to_string(),
            ));
        }

        let request = SynthesisRequest {
            text: command.text,
            language: command
                .language
                .unwrap_or_else(|| self.defaults.language.clone()),
            voice_id: command.voice_id.or_else(|| self.defaults.voice_id.clone()),
            rate_wpm: self.defaults.rate_wpm,
            volume: self.defaults.volume,
            slow: command.slow,
        };
        tracing::debug!(
            language = %request.language,
            text_length = request.text.chars().count(),
            "synthesis requested"
        );
        Ok(self.port.synthesize(request).await?)
    }

    pub async fn voices(&self) -> Result<Vec<VoiceInfo>, ApplicationError> {
        Ok(self.port.voices().await?)
    }
}
