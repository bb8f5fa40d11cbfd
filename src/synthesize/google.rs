//! Google Cloud Text-to-Speech REST client.

use crate::audio::{decode_wav, AudioBuffer};
use crate::error::{DubError, Result};
use crate::synthesize::{Synthesizer, Voice};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const TTS_API_BASE: &str = "https://texttospeech.googleapis.com";

/// Slightly faster than normal, translations tend to run longer than the source.
pub const DEFAULT_SPEAKING_RATE: f32 = 1.1;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 500;

pub struct GoogleSynthesizer {
    client: Client,
    api_key: String,
    base_url: String,
    speaking_rate: f32,
    sample_rate: Option<u32>,
}

impl GoogleSynthesizer {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: TTS_API_BASE.to_string(),
            speaking_rate: DEFAULT_SPEAKING_RATE,
            sample_rate: None,
        }
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_speaking_rate(mut self, rate: f32) -> Self {
        self.speaking_rate = rate;
        self
    }

    /// Ask for clips at this rate so they splice without resampling.
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    fn build_request<'a>(&self, text: &'a str, voice: &'a Voice) -> SynthesizeRequest<'a> {
        SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: voice.language_code(),
                name: voice.name(),
            },
            audio_config: AudioConfig {
                audio_encoding: "LINEAR16",
                speaking_rate: self.speaking_rate,
                sample_rate_hertz: self.sample_rate,
            },
        }
    }

    async fn call_api(&self, request: &SynthesizeRequest<'_>) -> Result<SynthesizeResponse> {
        let url = format!("{}/v1/text:synthesize?key={}", self.base_url, self.api_key);
        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        debug!("Text-to-Speech response status: {}", status);
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                DubError::Synthesis(format!("Malformed Text-to-Speech response: {e}"))
            });
        }

        let detail = serde_json::from_str::<ApiErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);

        Err(DubError::Synthesis(format!(
            "Text-to-Speech API error ({}): {}",
            status, detail
        )))
    }

    async fn synthesize_with_retry(&self, request: &SynthesizeRequest<'_>) -> Result<SynthesizeResponse> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("Retry attempt {} after {}ms delay", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.call_api(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    // Bad voice, bad key or quota: retrying will not help
                    if e.to_string().contains("API error (4") {
                        return Err(e);
                    }
                    warn!("Synthesis attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DubError::Synthesis("Unknown error".to_string())))
    }
}

#[async_trait]
impl Synthesizer for GoogleSynthesizer {
    async fn synthesize(&self, text: &str, voice: &Voice) -> Result<AudioBuffer> {
        if text.trim().is_empty() {
            return Err(DubError::Synthesis("Cannot synthesize empty text".to_string()));
        }

        let request = self.build_request(text, voice);
        let response = self.synthesize_with_retry(&request).await.map_err(|e| match e {
            DubError::Synthesis(_) => e,
            other => DubError::Synthesis(other.to_string()),
        })?;

        let bytes = STANDARD
            .decode(response.audio_content.as_bytes())
            .map_err(|e| DubError::Synthesis(format!("Invalid audio payload: {e}")))?;
        let clip = decode_wav(&bytes)
            .map_err(|e| DubError::Synthesis(format!("Undecodable audio payload: {e}")))?;

        debug!("Synthesized {} ms with {}", clip.len_ms(), voice);
        Ok(clip)
    }

    fn name(&self) -> &'static str {
        "Google Text-to-Speech"
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Serialize, Debug)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate_hertz: Option<u32>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Deserialize, Debug)]
struct ApiErrorDetail {
    message: String,
}
