pub mod abbreviations;
pub mod syllables;

pub use syllables::{SyllableAnalyzer, SyllableCounter};

use crate::transcribe::{Segment, Word};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A reconstructed sentence with its estimated timing in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl Sentence {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Thresholds for the speaking-rate heuristics, in syllables per second.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Characters that close a sentence when they end a token.
    pub terminators: Vec<char>,
    /// Below this rate a word's start timestamp likely includes leading silence.
    pub min_speaking_rate: f64,
    /// A segment's last word spoken slower than this closes the sentence.
    pub pause_word_rate: f64,
    /// A segment spoken slower than this closes the sentence at its last word.
    pub pause_segment_rate: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            terminators: vec!['.'],
            min_speaking_rate: 3.0,
            pause_word_rate: 1.0,
            pause_segment_rate: 2.0,
        }
    }
}

enum State {
    SentenceClosed,
    Accumulating { text: String, start: f64, end: f64 },
}

/// Rebuilds sentences from word-timestamped segments.
pub struct Segmenter {
    counter: Box<dyn SyllableCounter>,
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(counter: Box<dyn SyllableCounter>) -> Self {
        Self {
            counter,
            config: SegmenterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SegmenterConfig) -> Self {
        self.config = config;
        self
    }

    /// Convert segments into sentences ordered by start time.
    ///
    /// A sentence closes on a terminator, or at the last word of a segment
    /// when the word or the segment is spoken slowly enough to suggest a
    /// pause. A sentence that would close with zero length keeps
    /// accumulating instead. Text left over after the last segment becomes a
    /// final sentence.
    pub fn segment(&self, segments: &[Segment]) -> Vec<Sentence> {
        let mut sentences: Vec<Sentence> = Vec::new();
        let mut state = State::SentenceClosed;
        let mut prev_end = 0.0_f64;

        for segment in segments {
            if is_all_uppercase(&segment.text) {
                debug!("Skipping non-speech segment: {}", segment.text);
                continue;
            }

            let segment_rate = speaking_rate(
                self.counter.count_text(&segment.text),
                segment.duration(),
            );
            let last_word = segment.words.iter().rposition(|w| has_word_chars(&w.text));

            for (i, word) in segment.words.iter().enumerate() {
                if !has_word_chars(&word.text) {
                    continue;
                }

                let token = abbreviations::normalize(&word.text);
                let syllables = self.counter.count(&token);

                let (mut text, start) = match std::mem::replace(&mut state, State::SentenceClosed) {
                    State::Accumulating { text, start, .. } => (text, start),
                    State::SentenceClosed => (String::new(), self.estimate_start(word, syllables, prev_end)),
                };
                push_token(&mut text, &token);

                let terminated = token.ends_with(self.config.terminators.as_slice());
                let paused = Some(i) == last_word && self.is_pause(word, syllables, segment_rate);

                let end = word.end.max(start);
                // a zero-length sentence is carried into the next one, so starts strictly increase
                if (terminated || paused) && end > start {
                    debug!("Sentence [{:.2}-{:.2}]: {}", start, end, text);
                    sentences.push(Sentence { text, start, end });
                    prev_end = end;
                } else {
                    state = State::Accumulating {
                        text,
                        start,
                        end: word.end,
                    };
                }
            }
        }

        if let State::Accumulating { text, start, end } = state {
            debug!("Flushing unterminated sentence: {}", text);
            sentences.push(Sentence {
                text,
                start,
                end: end.max(start),
            });
        }

        sentences
    }

    /// Start of a sentence opened by `word`.
    ///
    /// Whisper often folds leading silence into the first word, so a word
    /// spoken too slowly is assumed to start `syllables / min_rate` seconds
    /// before its end.
    fn estimate_start(&self, word: &Word, syllables: usize, prev_end: f64) -> f64 {
        let rate = speaking_rate(syllables, word.duration());
        let estimate = if rate < self.config.min_speaking_rate {
            word.end - syllables as f64 / self.config.min_speaking_rate
        } else {
            word.start
        };
        estimate.max(prev_end).max(0.0)
    }

    fn is_pause(&self, word: &Word, syllables: usize, segment_rate: f64) -> bool {
        speaking_rate(syllables, word.duration()) < self.config.pause_word_rate
            || segment_rate < self.config.pause_segment_rate
    }
}

/// Syllables per second; zero-length spans count as infinitely fast.
fn speaking_rate(syllables: usize, duration: f64) -> f64 {
    if duration > 0.0 {
        syllables as f64 / duration
    } else {
        f64::INFINITY
    }
}

fn has_word_chars(token: &str) -> bool {
    token.chars().any(|c| c.is_alphanumeric() || c == '_')
}

/// Whisper labels non-speech audio with uppercase text like "[MUSIC]".
fn is_all_uppercase(text: &str) -> bool {
    text.chars().any(char::is_uppercase) && !text.chars().any(char::is_lowercase)
}

fn push_token(text: &mut String, token: &str) {
    if !text.is_empty() && !token.starts_with('-') {
        text.push(' ');
    }
    text.push_str(token);
}
