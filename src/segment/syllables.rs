//! Rule-based syllable counting.
//!
//! Alphabetic scripts count groups of consecutive vowels using a per-language
//! vowel inventory. Han characters, kana and Hangul blocks count one syllable
//! each. Tokens without letters count zero.

use regex::Regex;

use crate::error::{DubError, Result};
use crate::language::Language;

/// Linguistic analyzer used by the segmenter for its speaking-rate heuristics.
pub trait SyllableCounter: Send + Sync {
    /// Syllables in a single token (punctuation is ignored).
    fn count(&self, token: &str) -> usize;

    /// Syllables in free text. Defaults to whitespace tokenization.
    fn count_text(&self, text: &str) -> usize {
        text.split_whitespace().map(|t| self.count(t)).sum()
    }
}

pub struct SyllableAnalyzer {
    language: Language,
    vowels: &'static str,
    silent_final_e: bool,
    word_re: Regex,
}

impl SyllableAnalyzer {
    /// Build the analyzer for `language`.
    pub fn new(language: Language) -> Result<Self> {
        let word_re = Regex::new(r"[\p{L}\p{M}]+(?:['’][\p{L}\p{M}]+)*")
            .map_err(|e| DubError::Config(format!("Invalid word pattern: {e}")))?;

        Ok(Self {
            language,
            vowels: vowel_inventory(language),
            silent_final_e: matches!(language, Language::English | Language::French),
            word_re,
        })
    }

    /// Build the analyzer from a language name or ISO code.
    pub fn for_language(name: &str) -> Result<Self> {
        Self::new(name.parse()?)
    }

    pub fn language(&self) -> Language {
        self.language
    }

    fn count_word(&self, word: &str) -> usize {
        let lower = word.to_lowercase();
        let mut count = 0;
        let mut in_vowel_group = false;
        let mut has_letters = false;

        for c in lower.chars() {
            if is_syllabic_block(c) {
                count += 1;
                in_vowel_group = false;
                continue;
            }
            if !c.is_alphabetic() {
                in_vowel_group = false;
                continue;
            }
            has_letters = true;
            let is_vowel = self.vowels.contains(c);
            if is_vowel && !in_vowel_group {
                count += 1;
            }
            in_vowel_group = is_vowel;
        }

        if self.silent_final_e && count > 1 && ends_with_silent_e(&lower) {
            count -= 1;
        }

        if count == 0 && has_letters {
            1
        } else {
            count
        }
    }
}

impl SyllableCounter for SyllableAnalyzer {
    fn count(&self, token: &str) -> usize {
        self.word_re
            .find_iter(token)
            .map(|m| self.count_word(m.as_str()))
            .sum()
    }

    fn count_text(&self, text: &str) -> usize {
        self.count(text)
    }
}

fn ends_with_silent_e(word: &str) -> bool {
    let chars: Vec<char> = word.chars().collect();
    match chars.as_slice() {
        // consonant + "le" is its own syllable ("table"), vowel + "le" is not ("whale")
        [.., before, 'l', 'e'] => "aeiouy".contains(*before),
        [.., prev, 'e'] => !"aeiouy".contains(*prev),
        _ => false,
    }
}

/// Characters that are one syllable on their own: Han, kana (except small kana), Hangul.
fn is_syllabic_block(c: char) -> bool {
    const SMALL_KANA: &str = "ぁぃぅぇぉゃゅょゎっァィゥェォャュョヮッヵヶ";
    match c {
        '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' => true,
        '\u{3041}'..='\u{3096}' | '\u{30A1}'..='\u{30FA}' => !SMALL_KANA.contains(c),
        '\u{AC00}'..='\u{D7A3}' => true,
        _ => false,
    }
}

fn vowel_inventory(language: Language) -> &'static str {
    match language {
        Language::English => "aeiouy",
        Language::German => "aeiouyäöü",
        Language::French => "aeiouyàâæéèêëîïôœùûü",
        Language::Italian => "aeiouàèéìíòóùú",
        Language::Catalan => "aeiouàèéíïòóúü",
        Language::Spanish => "aeiouáéíóúü",
        Language::Portuguese => "aeiouáàâãéêíóôõú",
        Language::Romanian => "aeiouăâî",
        Language::Dutch => "aeiouyëïéè",
        Language::Danish => "aeiouyæøå",
        Language::Swedish => "aeiouyåäö",
        Language::Finnish => "aeiouyäö",
        Language::Lithuanian => "aeiouyąęėįųū",
        Language::Polish => "aeiouyąęó",
        Language::Croatian => "aeiou",
        Language::Greek => "αεηιουωάέήίόύώϊϋΐΰ",
        Language::Russian => "аеёиоуыэюя",
        Language::Ukrainian => "аеєиіїоуюя",
        Language::Macedonian => "аеиоу",
        // Latin-script fallback for romanized words inside CJK text
        Language::Chinese | Language::Japanese | Language::Korean => "aeiouy",
    }
}
