use crate::error::{DubError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default dubbing voice (Google Cloud Text-to-Speech voice name).
pub const DEFAULT_VOICE: &str = "es-US-Neural2-B";

/// Default source language of the original audio.
pub const DEFAULT_SOURCE_LANGUAGE: &str = "english";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OpenAI key, used for Whisper transcription.
    pub openai_api_key: Option<String>,
    /// Gemini key, used for the primary translation provider.
    pub gemini_api_key: Option<String>,
    /// Google Cloud key, used for speech synthesis and fallback translation.
    pub google_api_key: Option<String>,
    pub default_voice: String,
    pub default_source_language: String,
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            gemini_api_key: None,
            google_api_key: None,
            default_voice: DEFAULT_VOICE.to_string(),
            default_source_language: DEFAULT_SOURCE_LANGUAGE.to_string(),
            concurrency: 4,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_config) = toml::from_str::<Config>(&contents) {
                    config = file_config;
                }
            }
        }

        // Override with environment variables
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            config.gemini_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            config.google_api_key = Some(key);
        }
        if let Ok(voice) = std::env::var("AUTODUB_VOICE") {
            config.default_voice = voice;
        }
        if let Ok(language) = std::env::var("AUTODUB_SOURCE_LANGUAGE") {
            config.default_source_language = language;
        }
        if let Ok(concurrency) = std::env::var("AUTODUB_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                config.concurrency = c;
            }
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.openai_api_key.is_none() {
            return Err(DubError::Config(
                "OPENAI_API_KEY not set. Export it with: export OPENAI_API_KEY=sk-...".to_string(),
            ));
        }

        if self.google_api_key.is_none() {
            return Err(DubError::Config(
                "GOOGLE_API_KEY not set. It is required for speech synthesis; create one at https://console.cloud.google.com/apis/credentials"
                    .to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(DubError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("autodub").join("config.toml"))
    }
}
