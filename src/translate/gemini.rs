//! Gemini-based translation using the Generative AI API.

use crate::error::{DubError, Result};
use crate::translate::Translator;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Translator using Google Gemini API.
pub struct GeminiTranslator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiTranslator {
    /// Create a new Gemini translator with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: "gemini-2.0-flash".to_string(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    /// Set a different model (e.g., "gemini-1.5-pro").
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the numbered translation prompt.
    fn build_prompt(&self, texts: &[String], source: &str, target: &str) -> String {
        let numbered_texts: String = texts
            .iter()
            .enumerate()
            .map(|(i, t)| format!("[{}] {}", i + 1, t))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Translate each of the following numbered sentences from {} to {}.
The sentences will be spoken by a voice actor, so keep them natural and about the same length.
Return ONLY the translations in the same numbered format, one per number, and never merge or split sentences.

Sentences to translate:
{numbered_texts}"#,
            language_code_to_name(source),
            language_code_to_name(target),
        )
    }

    /// Parse a numbered batch response. Every number must be present.
    fn parse_batch_response(&self, response: &str, count: usize) -> Result<Vec<String>> {
        let mut results = Vec::with_capacity(count);
        let mut cursor = 0;

        for i in 1..=count {
            let pattern = format!("[{}]", i);
            let next_pattern = format!("[{}]", i + 1);

            let Some(found) = response[cursor..].find(&pattern) else {
                return Err(DubError::Translation(format!(
                    "Gemini response is missing translation {} of {}",
                    i, count
                )));
            };

            let text_start = cursor + found + pattern.len();
            let text_end = response[text_start..]
                .find(&next_pattern)
                .map(|p| text_start + p)
                .unwrap_or(response.len());

            results.push(response[text_start..text_end].trim().to_string());
            cursor = text_end;
        }

        if response[cursor..].contains(&format!("[{}]", count + 1)) {
            return Err(DubError::Translation(format!(
                "Gemini returned more than {} translations",
                count
            )));
        }

        Ok(results)
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize, Debug)]
struct GeminiResponseContent {
    parts: Option<Vec<GeminiResponsePart>>,
}

#[derive(Deserialize, Debug)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

#[async_trait]
impl Translator for GeminiTranslator {
    async fn translate_batch(&self, texts: &[String], source: &str, target: &str) -> Result<Vec<String>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Translating {} sentence(s) {} -> {} with Gemini", texts.len(), source, target);

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: self.build_prompt(texts, source, target),
                }],
            }],
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DubError::Translation(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DubError::Translation(format!("Failed to read Gemini response: {}", e)))?;

        if !status.is_success() {
            return Err(DubError::Translation(format!(
                "Gemini API error ({}): {}",
                status, body
            )));
        }

        let gemini_response: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            DubError::Translation(format!("Failed to parse Gemini response: {}", e))
        })?;

        if let Some(error) = gemini_response.error {
            return Err(DubError::Translation(format!(
                "Gemini error: {}",
                error.message
            )));
        }

        let translated_text = gemini_response
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .and_then(|p| p.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| DubError::Translation("Gemini returned no candidates".to_string()))?;

        self.parse_batch_response(&translated_text, texts.len())
    }

    fn name(&self) -> &'static str {
        "Gemini"
    }
}

/// Convert language code to human-readable name for better prompting.
fn language_code_to_name(code: &str) -> &'static str {
    let lowercase = code.to_lowercase();
    match lowercase.as_str() {
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        "hi" => "Hindi",
        "ca" => "Catalan",
        "nl" => "Dutch",
        "pl" => "Polish",
        "uk" => "Ukrainian",
        "sv" => "Swedish",
        "da" => "Danish",
        "fi" => "Finnish",
        "el" => "Greek",
        "ro" => "Romanian",
        "hr" => "Croatian",
        "lt" => "Lithuanian",
        "mk" => "Macedonian",
        _ => "the target language",
    }
}
