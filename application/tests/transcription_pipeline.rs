use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use speech_application::{ApplicationError, TranscribeCommand, TranscriptionOrchestrator, TranscriptionSettings};
use speech_domain::{
    DecodeOptions, DomainError, ModelInfo, RawSegment, RawTranscription, TranscribeTask,
    TranscriptionEnginePort,
};
use speech_infra_audio::normalizer::write_wav;

struct MockEngine {
    reloads: AtomicUsize,
    sample_decodes: AtomicUsize,
    path_decodes: AtomicUsize,
    fail_samples: bool,
    fail_paths: bool,
    raw_text: String,
}

impl MockEngine {
    fn returning(raw_text: &str) -> Self {
        Self {
            reloads: AtomicUsize::new(0),
            sample_decodes: AtomicUsize::new(0),
            path_decodes: AtomicUsize::new(0),
            fail_samples: false,
            fail_paths: false,
            raw_text: raw_text.to_string(),
        }
    }

    fn failing_on_samples(raw_text: &str) -> Self {
        Self {
            fail_samples: true,
            ..Self::returning(raw_text)
        }
    }

    fn failing_everywhere() -> Self {
        Self {
            fail_samples: true,
            fail_paths: true,
            ..Self::returning("")
        }
    }

    fn raw(&self) -> RawTranscription {
        RawTranscription {
            text: self.raw_text.clone(),
            language: Some("fr".to_string()),
            segments: vec![RawSegment {
                start_secs: 0.0,
                end_secs: 1.0,
                text: self.raw_text.clone(),
                temperature: 0.0,
                avg_logprob: -0.25,
                no_speech_prob: 0.05,
                compression_ratio: 1.1,
                token_probs: vec![0.9, 0.8],
            }],
        }
    }
}

#[async_trait]
impl TranscriptionEnginePort for MockEngine {
    async fn reload(&self) -> Result<(), DomainError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn transcribe_samples(
        &self,
        _samples: &[f32],
        _options: &DecodeOptions,
    ) -> Result<RawTranscription, DomainError> {
        self.sample_decodes.fetch_add(1, Ordering::SeqCst);
        if self.fail_samples {
            return Err(DomainError::model("sample decode rejected"));
        }
        Ok(self.raw())
    }

    async fn transcribe_path(
        &self,
        _path: &Path,
        _options: &DecodeOptions,
    ) -> Result<RawTranscription, DomainError> {
        self.path_decodes.fetch_add(1, Ordering::SeqCst);
        if self.fail_paths {
            return Err(DomainError::model("file decode rejected"));
        }
        Ok(self.raw())
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model: "mock".to_string(),
            device: "cpu".to_string(),
        }
    }
}

fn settings(temp_dir: &Path) -> TranscriptionSettings {
    TranscriptionSettings {
        language: "fr".to_string(),
        task: TranscribeTask::Transcribe,
        threads: 2,
        min_duration_secs: 0.5,
        preprocess: None,
        temp_dir: temp_dir.to_path_buf(),
    }
}

fn write_tone(path: &Path, secs: f32) {
    let samples: Vec<f32> = (0..(16_000.0 * secs) as usize)
        .map(|i| 0.4 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 16_000.0).sin())
        .collect();
    write_wav(path, &samples, 16_000).expect("write fixture");
}

fn leftover_artifacts(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.flatten().count())
        .unwrap_or(0)
}

#[tokio::test]
async fn missing_file_is_rejected_before_the_engine_runs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let engine = Arc::new(MockEngine::returning("bonjour"));
    let orchestrator = TranscriptionOrchestrator::new(engine.clone(), settings(temp.path()));

    let error = orchestrator
        .transcribe(TranscribeCommand {
            audio_path: temp.path().join("missing.wav"),
            language: None,
        })
        .await
        .expect_err("missing file");

    assert!(matches!(
        error,
        ApplicationError::Domain(DomainError::AudioNotFound { .. })
    ));
    assert_eq!(engine.reloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_file_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("empty.wav");
    std::fs::write(&path, b"").expect("touch");

    let orchestrator = TranscriptionOrchestrator::new(
        Arc::new(MockEngine::returning("bonjour")),
        settings(temp.path()),
    );
    let error = orchestrator
        .transcribe(TranscribeCommand {
            audio_path: path,
            language: None,
        })
        .await
        .expect_err("empty file");
    assert!(matches!(
        error,
        ApplicationError::Domain(DomainError::EmptyAudio)
    ));
}

#[tokio::test]
async fn too_short_audio_is_rejected_after_decode() {
    let temp = tempfile::tempdir().expect("tempdir");
    let work = tempfile::tempdir().expect("workdir");
    let path = temp.path().join("clip.wav");
    write_tone(&path, 0.3);

    let engine = Arc::new(MockEngine::returning("bonjour"));
    let orchestrator = TranscriptionOrchestrator::new(engine.clone(), settings(work.path()));
    let error = orchestrator
        .transcribe(TranscribeCommand {
            audio_path: path.clone(),
            language: None,
        })
        .await
        .expect_err("short clip");

    assert!(matches!(
        error,
        ApplicationError::Domain(DomainError::AudioTooShort { .. })
    ));
    assert!(path.exists(), "caller's file must survive rejection");
    assert_eq!(leftover_artifacts(work.path()), 0, "temp artifacts cleaned");
}

#[tokio::test]
async fn successful_run_reloads_engine_and_sanitizes_output() {
    let temp = tempfile::tempdir().expect("tempdir");
    let work = tempfile::tempdir().expect("workdir");
    let path = temp.path().join("speech.wav");
    write_tone(&path, 1.0);

    let engine = Arc::new(MockEngine::returning("<|sot|>bonjour tout le monde<|eot|>"));
    let orchestrator = TranscriptionOrchestrator::new(engine.clone(), settings(work.path()));
    let result = orchestrator
        .transcribe(TranscribeCommand {
            audio_path: path.clone(),
            language: None,
        })
        .await
        .expect("transcription succeeds");

    assert_eq!(result.text, "bonjour tout le monde");
    assert_eq!(result.word_count, 4);
    assert_eq!(result.language, "fr");
    assert_eq!(result.model.model, "mock");
    assert_eq!(result.segments.len(), 1);
    assert!(result.latency_secs >= 0.0);

    assert_eq!(engine.reloads.load(Ordering::SeqCst), 1, "one reload per request");
    assert_eq!(engine.sample_decodes.load(Ordering::SeqCst), 1);
    assert_eq!(engine.path_decodes.load(Ordering::SeqCst), 0);
    assert!(path.exists(), "caller's file must survive success");
    assert_eq!(leftover_artifacts(work.path()), 0, "temp artifacts cleaned");
}

#[tokio::test]
async fn sample_decode_failure_falls_back_to_file_decode() {
    let temp = tempfile::tempdir().expect("tempdir");
    let work = tempfile::tempdir().expect("workdir");
    let path = temp.path().join("speech.wav");
    write_tone(&path, 1.0);

    let engine = Arc::new(MockEngine::failing_on_samples("bonjour"));
    let orchestrator = TranscriptionOrchestrator::new(engine.clone(), settings(work.path()));
    let result = orchestrator
        .transcribe(TranscribeCommand {
            audio_path: path,
            language: None,
        })
        .await
        .expect("fallback succeeds");

    assert_eq!(result.text, "bonjour");
    assert_eq!(engine.sample_decodes.load(Ordering::SeqCst), 1);
    assert_eq!(engine.path_decodes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn total_model_failure_propagates_and_cleans_artifacts() {
    let temp = tempfile::tempdir().expect("tempdir");
    let work = tempfile::tempdir().expect("workdir");
    let path = temp.path().join("speech.wav");
    write_tone(&path, 1.0);

    let engine = Arc::new(MockEngine::failing_everywhere());
    let orchestrator = TranscriptionOrchestrator::new(engine.clone(), settings(work.path()));
    let error = orchestrator
        .transcribe(TranscribeCommand {
            audio_path: path.clone(),
            language: None,
        })
        .await
        .expect_err("both decode paths fail");

    assert!(matches!(
        error,
        ApplicationError::Domain(DomainError::Model(_))
    ));
    assert_eq!(engine.sample_decodes.load(Ordering::SeqCst), 1);
    assert_eq!(engine.path_decodes.load(Ordering::SeqCst), 1);
    assert!(path.exists(), "caller's file must survive model failure");
    assert_eq!(leftover_artifacts(work.path()), 0, "temp artifacts cleaned");
}

#[tokio::test]
async fn corrupt_output_is_repaired_deterministically() {
    let temp = tempfile::tempdir().expect("tempdir");
    let work = tempfile::tempdir().expect("workdir");
    let path = temp.path().join("speech.wav");
    write_tone(&path, 1.0);

    let engine = Arc::new(MockEngine::returning("il est laaaaaaaa"));
    let orchestrator = TranscriptionOrchestrator::new(engine, settings(work.path()));

    let first = orchestrator
        .transcribe(TranscribeCommand {
            audio_path: path.clone(),
            language: None,
        })
        .await
        .expect("first run");
    let second = orchestrator
        .transcribe(TranscribeCommand {
            audio_path: path,
            language: None,
        })
        .await
        .expect("second run");

    assert_eq!(first.text, "il est laa");
    assert_eq!(first.text, second.text, "same input, same output");
    assert_eq!(first.segments[0].text, second.segments[0].text);
}

#[tokio::test]
async fn explicit_language_overrides_default() {
    let temp = tempfile::tempdir().expect("tempdir");
    let work = tempfile::tempdir().expect("workdir");
    let path = temp.path().join("speech.wav");
    write_tone(&path, 1.0);

    let engine = Arc::new(MockEngine::returning("hello"));
    let orchestrator = TranscriptionOrchestrator::new(engine, settings(work.path()));
    let result = orchestrator
        .transcribe(TranscribeCommand {
            audio_path: path,
            language: Some("en".to_string()),
        })
        .await
        .expect("transcription succeeds");
    // The engine-reported language takes precedence over the requested tag.
    assert_eq!(result.language, "fr");
}
