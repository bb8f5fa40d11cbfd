//! Source languages supported by the sentence segmenter.

use crate::error::{DubError, Result};
use serde::{Deserialize, Serialize};

/// A language the linguistic analyzer knows how to count syllables for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    German,
    French,
    Italian,
    Catalan,
    Chinese,
    Croatian,
    Danish,
    Dutch,
    Finnish,
    Greek,
    Japanese,
    Korean,
    Lithuanian,
    Macedonian,
    Polish,
    Portuguese,
    Romanian,
    Russian,
    Spanish,
    Swedish,
    Ukrainian,
}

/// Every supported language, in display order.
pub const SUPPORTED_LANGUAGES: [Language; 22] = [
    Language::English,
    Language::German,
    Language::French,
    Language::Italian,
    Language::Catalan,
    Language::Chinese,
    Language::Croatian,
    Language::Danish,
    Language::Dutch,
    Language::Finnish,
    Language::Greek,
    Language::Japanese,
    Language::Korean,
    Language::Lithuanian,
    Language::Macedonian,
    Language::Polish,
    Language::Portuguese,
    Language::Romanian,
    Language::Russian,
    Language::Spanish,
    Language::Swedish,
    Language::Ukrainian,
];

impl Language {
    /// ISO 639-1 code, as expected by the transcription and translation APIs.
    pub fn iso_code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::German => "de",
            Language::French => "fr",
            Language::Italian => "it",
            Language::Catalan => "ca",
            Language::Chinese => "zh",
            Language::Croatian => "hr",
            Language::Danish => "da",
            Language::Dutch => "nl",
            Language::Finnish => "fi",
            Language::Greek => "el",
            Language::Japanese => "ja",
            Language::Korean => "ko",
            Language::Lithuanian => "lt",
            Language::Macedonian => "mk",
            Language::Polish => "pl",
            Language::Portuguese => "pt",
            Language::Romanian => "ro",
            Language::Russian => "ru",
            Language::Spanish => "es",
            Language::Swedish => "sv",
            Language::Ukrainian => "uk",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::German => "german",
            Language::French => "french",
            Language::Italian => "italian",
            Language::Catalan => "catalan",
            Language::Chinese => "chinese",
            Language::Croatian => "croatian",
            Language::Danish => "danish",
            Language::Dutch => "dutch",
            Language::Finnish => "finnish",
            Language::Greek => "greek",
            Language::Japanese => "japanese",
            Language::Korean => "korean",
            Language::Lithuanian => "lithuanian",
            Language::Macedonian => "macedonian",
            Language::Polish => "polish",
            Language::Portuguese => "portuguese",
            Language::Romanian => "romanian",
            Language::Russian => "russian",
            Language::Spanish => "spanish",
            Language::Swedish => "swedish",
            Language::Ukrainian => "ukrainian",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Language {
    type Err = DubError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_lowercase();
        SUPPORTED_LANGUAGES
            .iter()
            .copied()
            .find(|lang| lang.name() == needle || lang.iso_code() == needle)
            .ok_or_else(|| {
                DubError::UnsupportedLanguage(format!(
                    "'{}' is not supported. Supported languages: {}",
                    s,
                    SUPPORTED_LANGUAGES
                        .iter()
                        .map(|l| l.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}
