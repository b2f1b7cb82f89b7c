//! Narrated audio for a finished analysis.
//!
//! Gemini's speech models return raw 16-bit little-endian mono PCM at
//! 24 kHz as base64 `inlineData`; [`write_wav`] wraps it in a WAV header.

use async_trait::async_trait;
use base64::Engine as _;
use digest_core::{CoreError, TtsError, TtsOptions};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const PROVIDER: &str = "gemini-tts";

pub const SAMPLE_RATE: u32 = 24_000;
pub const BITS_PER_SAMPLE: u16 = 16;
pub const CHANNELS: u16 = 1;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const VOICES: &[&str] = &["Sadaltager", "Aoede", "Charon", "Fenrir", "Kore", "Puck"];

pub fn available_voices() -> &'static [&'static str] {
    VOICES
}

/// `"{tone}: {text}"`, or the bare text when no tone is given.
pub fn speech_prompt(text: &str, tone: Option<&str>) -> String {
    match tone.map(str::trim).filter(|t| !t.is_empty()) {
        Some(tone) => format!("{}: {}", tone, text),
        None => text.to_string(),
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Raw PCM samples for `text`.
    async fn synthesize(&self, text: &str, options: &TtsOptions) -> Result<Vec<u8>, CoreError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    pub contents: Vec<SpeechContent>,
    pub generation_config: SpeechGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SpeechContent {
    #[serde(default)]
    pub parts: Vec<SpeechPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechGenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SpeechResponse {
    #[serde(default)]
    pub candidates: Vec<SpeechCandidate>,
}

#[derive(Debug, Deserialize)]
pub struct SpeechCandidate {
    pub content: Option<SpeechContent>,
}

impl SpeechRequest {
    pub fn new(text: &str, options: &TtsOptions) -> Self {
        Self {
            contents: vec![SpeechContent {
                parts: vec![SpeechPart {
                    text: Some(speech_prompt(text, options.tone_instructions.as_deref())),
                    inline_data: None,
                }],
            }],
            generation_config: SpeechGenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: options.voice.clone(),
                        },
                    },
                },
            },
        }
    }
}

/// Decode the first inline audio part of a response.
pub fn extract_audio(response: SpeechResponse) -> Result<Vec<u8>, TtsError> {
    let data = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.inline_data)
        .ok_or(TtsError::NoAudio)?;

    debug!("Received {} ({} base64 chars)", data.mime_type, data.data.len());
    let pcm = base64::engine::general_purpose::STANDARD
        .decode(data.data.as_bytes())
        .map_err(|e| TtsError::InvalidAudio {
            reason: e.to_string(),
        })?;

    if pcm.is_empty() {
        return Err(TtsError::NoAudio);
    }
    Ok(pcm)
}

pub struct GeminiTts {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiTts {
    pub fn new(api_key: String) -> Result<Self, CoreError> {
        if api_key.trim().is_empty() {
            return Err(TtsError::InvalidApiKey {
                provider: PROVIDER.to_string(),
            }
            .into());
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiTts {
    async fn synthesize(&self, text: &str, options: &TtsOptions) -> Result<Vec<u8>, CoreError> {
        if !VOICES.contains(&options.voice.as_str()) {
            return Err(TtsError::UnknownVoice {
                voice: options.voice.clone(),
            }
            .into());
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, options.model);
        let body = SpeechRequest::new(text, options);

        info!(
            "Generating speech with voice {} using {} ({} chars)",
            options.voice,
            options.model,
            text.chars().count()
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(TtsError::InvalidApiKey {
                provider: PROVIDER.to_string(),
            }
            .into());
        }
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(TtsError::SynthesisFailed {
                status_code: status.as_u16(),
                details,
            }
            .into());
        }

        let parsed: SpeechResponse = response.json().await?;
        Ok(extract_audio(parsed)?)
    }
}

/// Write 16-bit little-endian mono PCM as a 24 kHz WAV file.
pub fn write_wav(path: &Path, pcm: &[u8]) -> Result<(), TtsError> {
    let spec = hound::WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };
    let encoding = |e: hound::Error| TtsError::Encoding {
        reason: e.to_string(),
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(encoding)?;
    // A trailing odd byte is not a whole sample
    for chunk in pcm.chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))
            .map_err(encoding)?;
    }
    writer.finalize().map_err(encoding)?;

    info!("Audio saved to {}", path.display());
    Ok(())
}

/// Synthesize `text` and store it at `path`. The WAV file is written on the
/// blocking pool.
pub async fn narrate_to_file(
    synthesizer: &dyn SpeechSynthesizer,
    text: &str,
    options: &TtsOptions,
    path: &Path,
) -> Result<(), CoreError> {
    let pcm = synthesizer.synthesize(text, options).await?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_wav(&path, &pcm))
        .await
        .map_err(|e| CoreError::Internal {
            message: format!("WAV writer task failed: {}", e),
        })??;
    Ok(())
}
