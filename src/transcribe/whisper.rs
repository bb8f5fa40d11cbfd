use crate::audio::AudioChunk;
use crate::error::{DubError, Result};
use crate::transcribe::{Segment, Transcriber, Transcript, Word};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

/// OpenAI API base URL.
const OPENAI_API_BASE: &str = "https://api.openai.com";

/// Maximum file size for Whisper API (25 MB).
const MAX_FILE_SIZE: usize = 25 * 1024 * 1024;

/// Maximum retries for API calls.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 1000;

/// OpenAI Whisper API client producing word-level timestamps.
pub struct WhisperClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    language: Option<String>,
    prompt: Option<String>,
}

impl WhisperClient {
    /// Create a new Whisper client with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_API_BASE.to_string(),
            language: None,
            prompt: None,
        }
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the source language (ISO 639-1 code).
    pub fn with_language(mut self, language: String) -> Self {
        self.language = Some(language);
        self
    }

    /// Set a prompt for vocabulary hints (max 224 tokens).
    pub fn with_prompt(mut self, prompt: String) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Build the multipart form for the API request.
    async fn build_form(&self, audio_path: &Path) -> Result<Form> {
        let file_bytes = fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        let file_part = Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str("audio/wav")?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", "whisper-1")
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .text("timestamp_granularities[]", "word");

        if let Some(ref lang) = self.language {
            form = form.text("language", lang.clone());
        }

        if let Some(ref prompt) = self.prompt {
            form = form.text("prompt", prompt.clone());
        }

        Ok(form)
    }

    /// Make the API request (form is consumed, so no retries at this level).
    async fn call_api(&self, form: Form) -> Result<WhisperResponse> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        debug!("Whisper API response status: {}", status);

        if status.is_success() {
            let body = response.text().await?;
            let parsed: WhisperResponse = serde_json::from_str(&body)?;
            return Ok(parsed);
        }

        let error_body = response.text().await.unwrap_or_default();

        if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
            return Err(DubError::Transcription(format!(
                "Whisper API error ({}): {} ({})",
                status, api_error.error.message, api_error.error.r#type
            )));
        }

        Err(DubError::Transcription(format!(
            "Whisper API error ({}): {}",
            status, error_body
        )))
    }

    /// Transcribe with retry logic - rebuilds form on each attempt.
    async fn transcribe_with_retry(&self, chunk: &AudioChunk) -> Result<WhisperResponse> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("Retry attempt {} after {}ms delay", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let form = self.build_form(&chunk.path).await?;

            match self.call_api(form).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    // Don't retry on client errors
                    if e.to_string().contains("API error (4") {
                        return Err(e);
                    }
                    warn!("Attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DubError::Transcription("Unknown error".to_string())))
    }

    /// Convert the Whisper response to track-relative segments with their words.
    fn parse_response(&self, response: WhisperResponse, chunk: &AudioChunk) -> Transcript {
        let offset = chunk.region.start.as_secs_f64();
        let api_segments = response.segments.unwrap_or_default();
        let mut words = response.words.unwrap_or_default().into_iter().peekable();

        let mut segments = Vec::with_capacity(api_segments.len());
        let last = api_segments.len().saturating_sub(1);

        for (i, seg) in api_segments.into_iter().enumerate() {
            // Words are assigned by midpoint; the last segment takes the rest.
            let mut seg_words = Vec::new();
            while let Some(w) = words.peek() {
                let midpoint = (w.start + w.end) / 2.0;
                if i != last && midpoint > seg.end {
                    break;
                }
                if let Some(w) = words.next() {
                    seg_words.push(Word::new(w.word.trim(), w.start, w.end));
                }
            }

            let text = seg.text.trim().to_string();
            restore_punctuation(&text, &mut seg_words);

            segments.push(
                Segment {
                    text,
                    start: seg.start,
                    end: seg.end,
                    words: seg_words,
                }
                .shifted(offset),
            );
        }

        let leftover = words.count();
        if leftover > 0 {
            warn!(
                "Chunk {}: {} words had no enclosing segment and were dropped",
                chunk.index, leftover
            );
        }

        Transcript {
            segments,
            language: response.language,
        }
    }
}

/// Re-attach punctuation and leading hyphens from the segment text.
///
/// The API returns bare words ("world") while the segment text keeps the
/// punctuation ("world."), which sentence detection relies on.
pub(crate) fn restore_punctuation(segment_text: &str, words: &mut [Word]) {
    let mut cursor = 0;

    for word in words.iter_mut() {
        if word.text.is_empty() {
            continue;
        }
        let Some(found) = segment_text[cursor..].find(word.text.as_str()) else {
            continue;
        };

        let start = cursor + found;
        let mut end = start + word.text.len();
        end += segment_text[end..]
            .chars()
            .take_while(|c| !c.is_whitespace() && !c.is_alphanumeric() && *c != '-')
            .map(char::len_utf8)
            .sum::<usize>();

        let lead = if segment_text[..start].ends_with('-') {
            1
        } else {
            0
        };

        word.text = segment_text[start - lead..end].to_string();
        cursor = end;
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, chunk: &AudioChunk) -> Result<Transcript> {
        debug!(
            "Transcribing chunk {} with Whisper: {:?}",
            chunk.index, chunk.path
        );

        let metadata = fs::metadata(&chunk.path).await.map_err(|e| {
            DubError::Transcription(format!("Cannot read {}: {e}", chunk.path.display()))
        })?;
        if metadata.len() as usize > MAX_FILE_SIZE {
            return Err(DubError::Transcription(format!(
                "File too large for Whisper API: {} bytes (max {} bytes)",
                metadata.len(),
                MAX_FILE_SIZE
            )));
        }

        let response = self.transcribe_with_retry(chunk).await.map_err(|e| match e {
            DubError::Transcription(_) => e,
            other => DubError::Transcription(other.to_string()),
        })?;
        let transcript = self.parse_response(response, chunk);

        debug!(
            "Whisper returned {} segments for chunk {}",
            transcript.segments.len(),
            chunk.index
        );

        Ok(transcript)
    }

    fn name(&self) -> &'static str {
        "OpenAI Whisper"
    }

    fn max_file_size(&self) -> usize {
        MAX_FILE_SIZE
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
    #[serde(default)]
    words: Option<Vec<WhisperWord>>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct WhisperWord {
    word: String,
    start: f64,
    end: f64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    r#type: String,
}
