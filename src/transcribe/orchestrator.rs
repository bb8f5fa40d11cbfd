use crate::audio::AudioChunk;
use crate::error::{DubError, Result};
use crate::transcribe::{Segment, Transcriber, Transcript};
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Result of processing a single chunk.
#[derive(Debug)]
struct ChunkResult {
    index: usize,
    outcome: Result<Transcript>,
    duration_ms: u64,
}

/// Statistics from the transcription process.
#[derive(Debug, Clone)]
pub struct TranscriptionStats {
    pub total_chunks: usize,
    pub total_time: Duration,
    pub avg_chunk_time: Duration,
}

/// Orchestrates concurrent transcription of audio chunks.
pub struct TranscriptionOrchestrator {
    transcriber: Arc<dyn Transcriber>,
    concurrency: usize,
    show_progress: bool,
}

impl TranscriptionOrchestrator {
    /// Create a new orchestrator with the given transcriber.
    pub fn new(transcriber: Box<dyn Transcriber>, concurrency: usize) -> Self {
        Self {
            transcriber: Arc::from(transcriber),
            concurrency: concurrency.max(1),
            show_progress: true,
        }
    }

    /// Enable or disable progress bar display.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Transcribe all chunks concurrently and stitch them back in chunk order.
    ///
    /// Any failing chunk fails the whole transcription.
    pub async fn process_chunks(
        &self,
        chunks: Vec<AudioChunk>,
    ) -> Result<(Transcript, TranscriptionStats)> {
        let total_chunks = chunks.len();
        let start_time = Instant::now();

        if chunks.is_empty() {
            return Ok((
                Transcript::default(),
                TranscriptionStats {
                    total_chunks: 0,
                    total_time: Duration::ZERO,
                    avg_chunk_time: Duration::ZERO,
                },
            ));
        }

        info!(
            "Processing {} chunks with {} concurrent requests using {}",
            total_chunks,
            self.concurrency,
            self.transcriber.name()
        );

        let progress_bar = if self.show_progress {
            let pb = ProgressBar::new(total_chunks as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut futures = FuturesUnordered::new();

        for chunk in chunks {
            let sem = semaphore.clone();
            let transcriber = self.transcriber.clone();
            let pb = progress_bar.clone();

            futures.push(async move {
                let chunk_start = Instant::now();
                let index = chunk.index;

                let outcome = match sem.acquire().await {
                    Ok(_permit) => {
                        debug!("Starting transcription of chunk {}", index);
                        transcriber.transcribe(&chunk).await
                    }
                    Err(_) => Err(DubError::Transcription("Worker pool closed".to_string())),
                };
                let duration_ms = chunk_start.elapsed().as_millis() as u64;

                if let Some(ref pb) = pb {
                    pb.inc(1);
                }

                ChunkResult {
                    index,
                    outcome,
                    duration_ms,
                }
            });
        }

        let mut results: Vec<ChunkResult> = Vec::with_capacity(total_chunks);
        while let Some(result) = futures.next().await {
            results.push(result);
        }

        if let Some(pb) = progress_bar {
            pb.finish_with_message("Transcription complete");
        }

        results.sort_by_key(|r| r.index);

        let mut segments: Vec<Segment> = Vec::new();
        let mut language = None;
        let mut errors = Vec::new();
        let mut total_chunk_time_ms: u64 = 0;

        for result in results {
            total_chunk_time_ms += result.duration_ms;
            match result.outcome {
                Ok(transcript) => {
                    if language.is_none() {
                        language = transcript.language;
                    }
                    segments.extend(transcript.segments);
                }
                Err(e) => {
                    warn!("Chunk {} failed: {}", result.index, e);
                    errors.push(format!("chunk {}: {}", result.index, e));
                }
            }
        }

        if !errors.is_empty() {
            return Err(DubError::Transcription(format!(
                "{} of {} chunks failed. Errors: {}",
                errors.len(),
                total_chunks,
                errors.join("; ")
            )));
        }

        let stats = TranscriptionStats {
            total_chunks,
            total_time: start_time.elapsed(),
            avg_chunk_time: Duration::from_millis(total_chunk_time_ms / total_chunks as u64),
        };

        info!(
            "Transcription complete: {} segments from {} chunks in {:.2}s",
            segments.len(),
            total_chunks,
            stats.total_time.as_secs_f64()
        );

        Ok((Transcript { segments, language }, stats))
    }
}
