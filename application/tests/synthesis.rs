use std::sync::Arc;

use async_trait::async_trait;

use speech_application::usecase::synthesize::SynthesisDefaults;
use speech_application::{ApplicationError, SynthesisUseCase, SynthesizeCommand};
use speech_domain::{
    DomainError, SpeechSynthesisPort, SynthesisMetadata, SynthesisOutput, SynthesisRequest,
    VoiceInfo,
};

struct EchoSynthesisPort;

#[async_trait]
impl SpeechSynthesisPort for EchoSynthesisPort {
    async fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> Result<SynthesisOutput, DomainError> {
        Ok(SynthesisOutput {
            audio: vec![0u8; 64],
            metadata: SynthesisMetadata {
                engine: "echo".to_string(),
                language: request.language,
                duration_secs: 1.0,
                latency_secs: 0.01,
                text_length: request.text.chars().count(),
                word_count: request.text.split_whitespace().count(),
            },
        })
    }

    async fn voices(&self) -> Result<Vec<VoiceInfo>, DomainError> {
        Ok(vec![VoiceInfo {
            id: "fr-1".to_string(),
            name: "French".to_string(),
            languages: vec!["fr".to_string()],
        }])
    }
}

fn usecase() -> SynthesisUseCase {
    SynthesisUseCase::new(
        Arc::new(EchoSynthesisPort),
        SynthesisDefaults {
            language: "fr".to_string(),
            voice_id: None,
            rate_wpm: 150,
            volume: 1.0,
        },
    )
}

#[tokio::test]
async fn empty_text_is_a_validation_error() {
    let error = usecase()
        .synthesize(SynthesizeCommand {
            text: "   ".to_string(),
            language: None,
            voice_id: None,
            slow: false,
        })
        .await
        .expect_err("blank text");
    assert!(matches!(error, ApplicationError::Validation(_)));
}

#[tokio::test]
async fn defaults_fill_missing_request_fields() {
    let output = usecase()
        .synthesize(SynthesizeCommand {
            text: "bonjour tout le monde".to_string(),
            language: None,
            voice_id: None,
            slow: false,
        })
        .await
        .expect("synthesis succeeds");

    assert_eq!(output.metadata.language, "fr");
    assert_eq!(output.metadata.word_count, 4);
    assert!(!output.audio.is_empty());
}

#[tokio::test]
async fn voice_listing_passes_through() {
    let voices = usecase().voices().await.expect("voices");
    assert_eq!(voices.len(), 1);
    assert_eq!(voices[0].id, "fr-1");
}
