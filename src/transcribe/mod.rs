pub mod orchestrator;
pub mod whisper;

pub use orchestrator::{TranscriptionOrchestrator, TranscriptionStats};
pub use whisper::WhisperClient;

use crate::audio::AudioChunk;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A recognized word with its timing in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl Word {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A transcription unit: finer than a sentence, with no guarantee its
/// boundaries line up with sentence ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub words: Vec<Word>,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    fn shifted(mut self, offset: f64) -> Self {
        self.start += offset;
        self.end += offset;
        for word in &mut self.words {
            word.start += offset;
            word.end += offset;
        }
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<Segment>,
    pub language: Option<String>,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one chunk. Timestamps are relative to the whole track.
    async fn transcribe(&self, chunk: &AudioChunk) -> Result<Transcript>;
    fn name(&self) -> &'static str;
    fn max_file_size(&self) -> usize;
}
