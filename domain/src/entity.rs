use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LanguageTag {
    Auto,
    Code(String),
}

impl LanguageTag {
    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized.is_empty() || normalized == "auto" {
            Self::Auto
        } else {
            Self::Code(normalized)
        }
    }

    pub fn as_code(&self) -> Option<&str> {
        match self {
            Self::Auto => None,
            Self::Code(code) => Some(code),
        }
    }
}

/// Mono PCM samples at a known rate. Each call owns its own buffer; buffers
/// are never shared across concurrent requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioBuffer {
    pub sample_rate_hz: u32,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn new(sample_rate_hz: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate_hz,
            samples,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate_hz)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranscribeTask {
    Transcribe,
    Translate,
}

impl TranscribeTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcribe => "transcribe",
            Self::Translate => "translate",
        }
    }
}

/// Decoding configuration for a single transcription call.
///
/// A fresh value is constructed per call and never mutated afterwards; the
/// deterministic fields (temperature, conditioning, prompt) are pinned by
/// construction rather than left to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOptions {
    pub language: LanguageTag,
    pub task: TranscribeTask,
    pub temperature: f32,
    pub beam_size: usize,
    pub patience: f32,
    pub no_speech_threshold: f32,
    pub entropy_threshold: f32,
    pub logprob_threshold: f32,
    pub suppress_blank: bool,
    pub condition_on_previous_text: bool,
    pub initial_prompt: Option<String>,
    pub threads: usize,
}

impl DecodeOptions {
    /// Deterministic options: temperature 0.0, no history conditioning, no
    /// seed prompt, fixed decoder thresholds.
    pub fn deterministic(language: LanguageTag, task: TranscribeTask, threads: usize) -> Self {
        Self {
            language,
            task,
            temperature: 0.0,
            beam_size: 5,
            patience: 1.0,
            no_speech_threshold: 0.6,
            entropy_threshold: 2.4,
            logprob_threshold: -1.0,
            suppress_blank: true,
            condition_on_previous_text: false,
            initial_prompt: None,
            threads,
        }
    }
}

/// Untreated engine output, before sanitization.
#[derive(Debug, Clone, Default)]
pub struct RawTranscription {
    pub text: String,
    pub language: Option<String>,
    pub segments: Vec<RawSegment>,
}

#[derive(Debug, Clone)]
pub struct RawSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
    pub temperature: f32,
    pub avg_logprob: f64,
    pub no_speech_prob: f64,
    pub compression_ratio: f64,
    pub token_probs: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSegment {
    pub id: usize,
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
    pub temperature: f32,
    pub avg_logprob: f64,
    pub no_speech_prob: f64,
    pub compression_ratio: f64,
    pub token_probs: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model: String,
    pub device: String,
}

/// Sanitized transcription: token markup stripped, repetition corruption
/// repaired, all numeric fields finite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub language: String,
    pub segments: Vec<TranscriptionSegment>,
    pub latency_secs: f64,
    pub word_count: usize,
    pub model: ModelInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub language: String,
    pub voice_id: Option<String>,
    pub rate_wpm: u32,
    pub volume: f32,
    pub slow: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisMetadata {
    pub engine: String,
    pub language: String,
    pub duration_secs: f64,
    pub latency_secs: f64,
    pub text_length: usize,
    pub word_count: usize,
}

#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub audio: Vec<u8>,
    pub metadata: SynthesisMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub languages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tag_parses_auto_and_codes() {
        assert_eq!(LanguageTag::parse("auto"), LanguageTag::Auto);
        assert_eq!(LanguageTag::parse(""), LanguageTag::Auto);
        assert_eq!(LanguageTag::parse(" PT "), LanguageTag::Code("pt".into()));
        assert_eq!(LanguageTag::Code("fr".into()).as_code(), Some("fr"));
        assert_eq!(LanguageTag::Auto.as_code(), None);
    }

    #[test]
    fn audio_buffer_duration() {
        let buffer = AudioBuffer::new(16_000, vec![0.0; 8_000]);
        assert!((buffer.duration_secs() - 0.5).abs() < 1e-9);
        assert_eq!(AudioBuffer::new(0, Vec::new()).duration_secs(), 0.0);
    }

    #[test]
    fn transcription_result_serializes_all_diagnostics() {
        let result = TranscriptionResult {
            text: "bonjour".to_string(),
            language: "fr".to_string(),
            segments: vec![TranscriptionSegment {
                id: 0,
                start_secs: 0.0,
                end_secs: 1.2,
                text: "bonjour".to_string(),
                temperature: 0.0,
                avg_logprob: -0.3,
                no_speech_prob: 0.05,
                compression_ratio: 1.1,
                token_probs: vec![0.9],
            }],
            latency_secs: 0.4,
            word_count: 1,
            model: ModelInfo {
                model: "ggml-base".to_string(),
                device: "cpu".to_string(),
            },
        };

        let json = serde_json::to_value(&result).expect("serializes");
        assert_eq!(json["language"], "fr");
        assert_eq!(json["segments"][0]["avg_logprob"], -0.3);
        assert_eq!(json["model"]["model"], "ggml-base");
    }

    #[test]
    fn synthesis_request_round_trips_through_json() {
        let request = SynthesisRequest {
            text: "bonjour".to_string(),
            language: "fr".to_string(),
            voice_id: Some("fr-1".to_string()),
            rate_wpm: 150,
            volume: 1.0,
            slow: false,
        };
        let json = serde_json::to_string(&request).expect("serializes");
        let back: SynthesisRequest = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back.text, request.text);
        assert_eq!(back.voice_id, request.voice_id);
        assert_eq!(back.rate_wpm, request.rate_wpm);
    }

    #[test]
    fn deterministic_options_are_pinned() {
        let options =
            DecodeOptions::deterministic(LanguageTag::Code("pt".into()), TranscribeTask::Transcribe, 4);
        assert_eq!(options.temperature, 0.0);
        assert!(!options.condition_on_previous_text);
        assert!(options.initial_prompt.is_none());
        assert!(options.suppress_blank);
        assert_eq!(options.beam_size, 5);
    }
}
