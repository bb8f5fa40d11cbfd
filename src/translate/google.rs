//! Google Cloud Translation (v2 REST) client, used as the fallback provider.

use crate::error::{DubError, Result};
use crate::translate::Translator;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const GOOGLE_TRANSLATE_BASE: &str = "https://translation.googleapis.com";

pub struct GoogleTranslator {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GoogleTranslator {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GOOGLE_TRANSLATE_BASE.to_string(),
        }
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a [String],
    source: &'a str,
    target: &'a str,
    format: &'static str,
}

#[derive(Deserialize, Debug)]
struct TranslateResponse {
    data: Option<TranslateData>,
    error: Option<TranslateError>,
}

#[derive(Deserialize, Debug)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

#[derive(Deserialize, Debug)]
struct TranslateError {
    message: String,
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate_batch(&self, texts: &[String], source: &str, target: &str) -> Result<Vec<String>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Translating {} sentence(s) {} -> {} with Google Translate", texts.len(), source, target);

        let url = format!("{}/language/translate/v2?key={}", self.base_url, self.api_key);
        let request = TranslateRequest {
            q: texts,
            source,
            target,
            format: "text",
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DubError::Translation(format!("Google Translate request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            DubError::Translation(format!("Failed to read Google Translate response: {}", e))
        })?;

        let parsed: Option<TranslateResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let detail = parsed
                .and_then(|r| r.error)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(DubError::Translation(format!(
                "Google Translate API error ({}): {}",
                status, detail
            )));
        }

        let data = parsed.and_then(|r| r.data).ok_or_else(|| {
            DubError::Translation("Malformed Google Translate response".to_string())
        })?;

        Ok(data
            .translations
            .into_iter()
            .map(|t| t.translated_text)
            .collect())
    }

    fn name(&self) -> &'static str {
        "Google Translate"
    }
}
