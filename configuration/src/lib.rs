use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub type AppConfig = SpeechConfig;

const ENV_PREFIX: &str = "SPEECH_SERVICE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub asr: AsrRuntimeConfig,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub temp: TempConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u32,
    #[serde(default = "default_min_duration_secs")]
    pub min_duration_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrRuntimeConfig {
    #[serde(default = "default_model_path")]
    pub model_path: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_task")]
    pub task: String,
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Run the signal pre-processing chain before decoding. Off by default:
    /// the chain is advisory and format normalization alone is required for
    /// correctness.
    #[serde(default)]
    pub preprocess_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    #[serde(default = "default_true")]
    pub noise_reduction: bool,
    #[serde(default = "default_true")]
    pub normalize: bool,
    #[serde(default = "default_true")]
    pub vad_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_engine")]
    pub engine: String,
    #[serde(default = "default_tts_language")]
    pub language: String,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default = "default_tts_rate")]
    pub rate_wpm: u32,
    #[serde(default = "default_tts_volume")]
    pub volume: f32,
    /// Endpoint for the `rest` backend.
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempConfig {
    #[serde(default = "default_temp_subdir")]
    pub subdir: String,
    #[serde(default = "default_temp_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            asr: AsrRuntimeConfig::default(),
            preprocess: PreprocessConfig::default(),
            tts: TtsConfig::default(),
            temp: TempConfig::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: default_sample_rate(),
            min_duration_secs: default_min_duration_secs(),
        }
    }
}

impl Default for AsrRuntimeConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            language: default_language(),
            task: default_task(),
            threads: default_threads(),
            preprocess_enabled: false,
        }
    }
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            noise_reduction: true,
            normalize: true,
            vad_enabled: true,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: default_tts_engine(),
            language: default_tts_language(),
            voice_id: None,
            rate_wpm: default_tts_rate(),
            volume: default_tts_volume(),
            endpoint: None,
        }
    }
}

impl Default for TempConfig {
    fn default() -> Self {
        Self {
            subdir: default_temp_subdir(),
            ttl_secs: default_temp_ttl_secs(),
        }
    }
}

/// Load configuration: defaults, overlaid by an optional JSON file named in
/// `SPEECH_SERVICE_CONFIG`, overlaid by individual environment overrides.
pub fn load_config() -> Result<SpeechConfig, ConfigError> {
    let mut config = match std::env::var(format!("{ENV_PREFIX}_CONFIG")) {
        Ok(path) => load_config_file(PathBuf::from(path))?,
        Err(_) => SpeechConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

fn load_config_file(path: PathBuf) -> Result<SpeechConfig, ConfigError> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })
}

fn apply_env_overrides(config: &mut SpeechConfig) {
    if let Ok(value) = std::env::var(format!("{ENV_PREFIX}_MODEL_PATH")) {
        config.service.asr.model_path = value;
    }
    if let Ok(value) = std::env::var(format!("{ENV_PREFIX}_LANGUAGE")) {
        config.service.asr.language = value;
    }
    if let Ok(value) = std::env::var(format!("{ENV_PREFIX}_TTS_ENGINE")) {
        config.service.tts.engine = value;
    }
    if let Ok(value) = std::env::var(format!("{ENV_PREFIX}_TTS_ENDPOINT")) {
        config.service.tts.endpoint = Some(value);
    }
    if let Ok(value) = std::env::var(format!("{ENV_PREFIX}_LOG_FILTER")) {
        config.logging.filter = value;
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the configured
/// filter so operators can raise verbosity without touching config.
pub fn setup_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.clone()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_min_duration_secs() -> f64 {
    0.5
}

fn default_model_path() -> String {
    "models/ggml-base.bin".to_string()
}

fn default_language() -> String {
    "auto".to_string()
}

fn default_task() -> String {
    "transcribe".to_string()
}

fn default_threads() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_tts_engine() -> String {
    "espeak".to_string()
}

fn default_tts_language() -> String {
    "fr".to_string()
}

fn default_tts_rate() -> u32 {
    150
}

fn default_tts_volume() -> f32 {
    1.0
}

fn default_temp_subdir() -> String {
    "speech_service".to_string()
}

fn default_temp_ttl_secs() -> u64 {
    120
}
