//! Speech-synthesis adapters: a local espeak-ng subprocess backend and a
//! remote REST backend.

use std::io::Cursor;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use speech_domain::{
    DomainError, SpeechSynthesisPort, SynthesisMetadata, SynthesisOutput, SynthesisRequest,
    VoiceInfo,
};

/// Which synthesis backend to wire in; unknown names fail at startup rather
/// than at first request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisEngineKind {
    Espeak,
    Rest,
}

impl SynthesisEngineKind {
    pub fn from_name(name: &str) -> Result<Self, DomainError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "espeak" | "espeak-ng" => Ok(Self::Espeak),
            "rest" => Ok(Self::Rest),
            other => Err(DomainError::synthesis(format!(
                "unknown synthesis engine '{other}' (expected 'espeak' or 'rest')"
            ))),
        }
    }
}

fn metadata_for(
    engine: &str,
    request: &SynthesisRequest,
    audio: &[u8],
    started: Instant,
) -> SynthesisMetadata {
    SynthesisMetadata {
        engine: engine.to_string(),
        language: request.language.clone(),
        duration_secs: wav_duration_from_bytes(audio).unwrap_or(0.0),
        latency_secs: started.elapsed().as_secs_f64(),
        text_length: request.text.chars().count(),
        word_count: request.text.split_whitespace().count(),
    }
}

fn wav_duration_from_bytes(bytes: &[u8]) -> Option<f64> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(f64::from(reader.duration()) / f64::from(spec.sample_rate))
}

/// Local synthesis through the `espeak-ng` binary.
pub struct EspeakSynthesisAdapter {
    rate_wpm_floor: u32,
}

impl EspeakSynthesisAdapter {
    pub fn new() -> Self {
        Self { rate_wpm_floor: 80 }
    }

    fn build_args(&self, request: &SynthesisRequest) -> Vec<String> {
        let voice = request
            .voice_id
            .clone()
            .unwrap_or_else(|| request.language.clone());
        // Slow speech halves the rate, floored so output stays intelligible.
        let rate = if request.slow {
            (request.rate_wpm / 2).max(self.rate_wpm_floor)
        } else {
            request.rate_wpm
        };
        let amplitude = (request.volume.clamp(0.0, 2.0) * 100.0) as u32;
        vec![
            "-v".to_string(),
            voice,
            "-s".to_string(),
            rate.to_string(),
            "-a".to_string(),
            amplitude.to_string(),
            "--stdout".to_string(),
        ]
    }
}

impl Default for EspeakSynthesisAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSynthesisPort for EspeakSynthesisAdapter {
    async fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> Result<SynthesisOutput, DomainError> {
        let started = Instant::now();
        let args = self.build_args(&request);

        let output = tokio::process::Command::new("espeak-ng")
            .args(&args)
            .arg(&request.text)
            .output()
            .await
            .map_err(|error| {
                if error.kind() == std::io::ErrorKind::NotFound {
                    DomainError::synthesis(
                        "espeak-ng not found in PATH; install it (apt-get install espeak-ng)",
                    )
                } else {
                    DomainError::synthesis(format!("failed to run espeak-ng: {error}"))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DomainError::synthesis(format!(
                "espeak-ng failed: {}",
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(DomainError::synthesis("espeak-ng produced no audio"));
        }

        let metadata = metadata_for("espeak", &request, &output.stdout, started);
        tracing::debug!(
            duration_secs = metadata.duration_secs,
            latency_secs = metadata.latency_secs,
            word_count = metadata.word_count,
            "speech synthesized"
        );
        Ok(SynthesisOutput {
            audio: output.stdout,
            metadata,
        })
    }

    async fn voices(&self) -> Result<Vec<VoiceInfo>, DomainError> {
        let output = tokio::process::Command::new("espeak-ng")
            .arg("--voices")
            .output()
            .await
            .map_err(|error| DomainError::synthesis(format!("failed to list voices: {error}")))?;
        if !output.status.success() {
            return Err(DomainError::synthesis("espeak-ng --voices failed"));
        }
        Ok(parse_espeak_voices(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse the tabular `espeak-ng --voices` listing.
fn parse_espeak_voices(listing: &str) -> Vec<VoiceInfo> {
    listing
        .lines()
        .skip(1) // header row
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            // Pty, Language, Age/Gender, VoiceName, File, ...
            if parts.len() < 4 {
                return None;
            }
            Some(VoiceInfo {
                id: parts[3].to_string(),
                name: parts[3].to_string(),
                languages: vec![parts[1].to_string()],
            })
        })
        .collect()
}

/// Remote synthesis against a WAV-returning HTTP service.
pub struct RestSynthesisAdapter {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct RestVoice {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    languages: Vec<String>,
}

impl RestSynthesisAdapter {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl SpeechSynthesisPort for RestSynthesisAdapter {
    async fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> Result<SynthesisOutput, DomainError> {
        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/synthesize", self.endpoint))
            .json(&json!({
                "text": request.text,
                "language": request.language,
                "voice_id": request.voice_id,
                "rate_wpm": request.rate_wpm,
                "volume": request.volume,
                "slow": request.slow,
            }))
            .send()
            .await
            .map_err(|error| DomainError::synthesis(format!("synthesis request failed: {error}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(DomainError::synthesis(format!(
                "synthesis service returned {status}: {}",
                detail.trim()
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|error| DomainError::synthesis(format!("synthesis body read failed: {error}")))?
            .to_vec();
        if audio.is_empty() {
            return Err(DomainError::synthesis("synthesis service returned no audio"));
        }

        let metadata = metadata_for("rest", &request, &audio, started);
        Ok(SynthesisOutput { audio, metadata })
    }

    async fn voices(&self) -> Result<Vec<VoiceInfo>, DomainError> {
        let response = self
            .client
            .get(format!("{}/voices", self.endpoint))
            .send()
            .await
            .map_err(|error| DomainError::synthesis(format!("voice listing failed: {error}")))?;
        if !response.status().is_success() {
            return Err(DomainError::synthesis(format!(
                "voice listing returned {}",
                response.status()
            )));
        }
        let voices: Vec<RestVoice> = response
            .json()
            .await
            .map_err(|error| DomainError::synthesis(format!("voice listing malformed: {error}")))?;
        Ok(voices
            .into_iter()
            .map(|voice| VoiceInfo {
                name: if voice.name.is_empty() {
                    voice.id.clone()
                } else {
                    voice.name
                },
                id: voice.id,
                languages: voice.languages,
            })
            .collect())
    }
}
