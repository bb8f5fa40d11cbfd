pub mod google;

pub use google::GoogleSynthesizer;

use crate::audio::AudioBuffer;
use crate::error::{DubError, Result};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

/// Voices offered by the interactive wizard, by target language.
pub const VOICE_PRESETS: &[(&str, &str)] = &[
    ("English", "en-US-Neural2-J"),
    ("Spanish", "es-US-Neural2-B"),
    ("German", "de-DE-Neural2-D"),
    ("Italian", "it-IT-Neural2-C"),
    ("French", "fr-FR-Neural2-D"),
    ("Russian", "ru-RU-Wavenet-D"),
    ("Hindi", "hi-IN-Neural2-B"),
    ("Japanese", "ja-JP-Neural2-B"),
    ("Korean", "ko-KR-Neural2-A"),
    ("Chinese", "cmn-CN-Wavenet-A"),
];

/// A speech synthesis voice such as `es-US-Neural2-B`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    name: String,
    language_code: String,
}

impl Voice {
    /// Full voice name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// BCP-47 locale of the voice (`es-US`).
    pub fn language_code(&self) -> &str {
        &self.language_code
    }

    /// ISO 639-1 code to translate into (`es`).
    pub fn translation_language(&self) -> &str {
        let primary = self
            .language_code
            .split('-')
            .next()
            .unwrap_or(&self.language_code);
        match primary {
            "cmn" | "yue" => "zh",
            other => other,
        }
    }
}

impl FromStr for Voice {
    type Err = DubError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        let parts: Vec<&str> = name.split('-').collect();
        let valid = parts.len() >= 3
            && parts[..2]
                .iter()
                .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphabetic()));

        if !valid {
            return Err(DubError::Config(format!(
                "Invalid voice name '{}', expected something like es-US-Neural2-B",
                s
            )));
        }

        Ok(Self {
            name: name.to_string(),
            language_code: format!("{}-{}", parts[0], parts[1]),
        })
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Speak `text` with `voice`, returning the decoded clip.
    async fn synthesize(&self, text: &str, voice: &Voice) -> Result<AudioBuffer>;
    fn name(&self) -> &'static str;
}
