use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Error};

use speech_application::{
    SynthesisDefaults, SynthesisUseCase, TranscriptionOrchestrator, TranscriptionSettings,
};
use speech_configuration::AppConfig;
use speech_domain::{SpeechSynthesisPort, TranscribeTask, TranscriptionEnginePort};
use speech_infra_asr_whisper::{WhisperEngineAdapter, WhisperEngineConfig};
use speech_infra_audio::temp::service_temp_dir;
use speech_infra_audio::{sweep_stale_artifacts, PreprocessOptions};
use speech_infra_tts::{EspeakSynthesisAdapter, RestSynthesisAdapter, SynthesisEngineKind};

pub struct Application {
    pub config: AppConfig,
    pub transcription: Arc<TranscriptionOrchestrator>,
    pub synthesis: Arc<SynthesisUseCase>,
}

impl Application {
    pub fn new(config: AppConfig) -> Result<Self, Error> {
        tracing::info!(
            model_path = %config.service.asr.model_path,
            language = %config.service.asr.language,
            tts_engine = %config.service.tts.engine,
            "initializing speech service"
        );

        let temp_dir = service_temp_dir(&config.service.temp.subdir)
            .context("failed to create service temp directory")?;

        let engine: Arc<dyn TranscriptionEnginePort> =
            Arc::new(WhisperEngineAdapter::new(WhisperEngineConfig {
                model_path: config.service.asr.model_path.clone(),
            }));

        let preprocess = config.service.asr.preprocess_enabled.then(|| PreprocessOptions {
            noise_reduction: config.service.preprocess.noise_reduction,
            normalize: config.service.preprocess.normalize,
            vad: config.service.preprocess.vad_enabled,
        });

        let transcription = Arc::new(TranscriptionOrchestrator::new(
            engine,
            TranscriptionSettings {
                language: config.service.asr.language.clone(),
                task: parse_task(&config.service.asr.task)?,
                threads: config.service.asr.threads,
                min_duration_secs: config.service.audio.min_duration_secs,
                preprocess,
                temp_dir: temp_dir.clone(),
            },
        ));

        let port: Arc<dyn SpeechSynthesisPort> =
            match SynthesisEngineKind::from_name(&config.service.tts.engine)? {
                SynthesisEngineKind::Espeak => Arc::new(EspeakSynthesisAdapter::new()),
                SynthesisEngineKind::Rest => {
                    let endpoint = config
                        .service
                        .tts
                        .endpoint
                        .clone()
                        .context("tts.endpoint is required for the rest backend")?;
                    Arc::new(RestSynthesisAdapter::new(endpoint))
                }
            };
        let synthesis = Arc::new(SynthesisUseCase::new(
            port,
            SynthesisDefaults {
                language: config.service.tts.language.clone(),
                voice_id: config.service.tts.voice_id.clone(),
                rate_wpm: config.service.tts.rate_wpm,
                volume: config.service.tts.volume,
            },
        ));

        Ok(Self {
            config,
            transcription,
            synthesis,
        })
    }

    /// Periodic sweep of orphaned temp artifacts left by crashed processes.
    pub fn spawn_janitor(&self) -> tokio::task::JoinHandle<()> {
        let subdir = self.config.service.temp.subdir.clone();
        let ttl = Duration::from_secs(self.config.service.temp.ttl_secs);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(ttl);
            tick.tick().await; // first tick fires immediately
            loop {
                tick.tick().await;
                if let Ok(dir) = service_temp_dir(&subdir) {
                    let removed = sweep_stale_artifacts(&dir, ttl);
                    if removed > 0 {
                        tracing::info!(removed, "stale temp artifacts swept");
                    }
                }
            }
        })
    }
}

fn parse_task(task: &str) -> Result<TranscribeTask, Error> {
    match task.trim().to_ascii_lowercase().as_str() {
        "transcribe" => Ok(TranscribeTask::Transcribe),
        "translate" => Ok(TranscribeTask::Translate),
        other => bail!("unknown transcription task '{other}' (expected 'transcribe' or 'translate')"),
    }
}
