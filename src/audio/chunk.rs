use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{DubError, Result};

use super::extract::{extract_audio_segment, ASR_SAMPLE_RATE};
use super::{AudioChunk, TimeRegion};

/// Configuration for splitting the transcription audio into API-sized pieces.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum chunk duration.
    pub max_duration: Duration,

    /// Maximum chunk file size in bytes (Whisper API: 25MB).
    pub max_file_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::whisper()
    }
}

impl ChunkConfig {
    /// Configuration for the OpenAI Whisper API.
    pub fn whisper() -> Self {
        Self {
            max_duration: Duration::from_secs(10 * 60),
            max_file_size: 25 * 1024 * 1024,
        }
    }

    /// Longest chunk that satisfies both the duration and file size limits.
    pub fn effective_duration(&self) -> Duration {
        let mut duration = self.max_duration;
        while duration > Duration::from_secs(1) && estimate_wav_size(duration) > self.max_file_size
        {
            duration = duration.mul_f64(0.9);
        }
        duration
    }
}

/// Plan fixed-duration chunks covering the whole track.
pub fn plan_chunks(total_duration: Duration, config: &ChunkConfig) -> Vec<TimeRegion> {
    let chunk_duration = config.effective_duration();
    let mut chunks = Vec::new();
    let mut current = Duration::ZERO;

    while current < total_duration {
        let end = (current + chunk_duration).min(total_duration);
        chunks.push(TimeRegion {
            start: current,
            end,
        });
        current = end;
    }

    chunks
}

/// Create audio chunk files from planned regions.
///
/// A single region spanning the whole source reuses the source file.
pub async fn create_chunks(
    source_audio: &Path,
    regions: &[TimeRegion],
    output_dir: &Path,
) -> Result<Vec<AudioChunk>> {
    if !source_audio.exists() {
        return Err(DubError::FileNotFound(source_audio.display().to_string()));
    }

    if regions.len() == 1 && regions[0].start.is_zero() {
        return Ok(vec![AudioChunk {
            region: regions[0].clone(),
            path: source_audio.to_path_buf(),
            index: 0,
        }]);
    }

    std::fs::create_dir_all(output_dir).map_err(|e| {
        DubError::Container(format!("Failed to create output directory: {e}"))
    })?;

    info!(
        "Creating {} audio chunks in {}",
        regions.len(),
        output_dir.display()
    );

    let mut chunks = Vec::with_capacity(regions.len());

    for (index, region) in regions.iter().enumerate() {
        let chunk_path = output_dir.join(format!("chunk_{:04}.wav", index));

        debug!(
            "Creating chunk {}: {:?} to {:?}",
            index, region.start, region.end
        );

        extract_audio_segment(source_audio, &chunk_path, region.start, region.end).await?;

        chunks.push(AudioChunk {
            region: region.clone(),
            path: chunk_path,
            index,
        });
    }

    Ok(chunks)
}

/// Estimate file size for a transcription chunk (16-bit mono 16kHz).
pub fn estimate_wav_size(duration: Duration) -> usize {
    const BYTES_PER_SAMPLE: usize = 2;
    const WAV_HEADER_SIZE: usize = 44;

    let samples = (duration.as_secs_f64() * ASR_SAMPLE_RATE as f64) as usize;
    WAV_HEADER_SIZE + samples * BYTES_PER_SAMPLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_config_whisper() {
        let config = ChunkConfig::whisper();
        assert_eq!(config.max_file_size, 25 * 1024 * 1024);
        assert!(estimate_wav_size(config.effective_duration()) <= config.max_file_size);
    }

    #[test]
    fn test_effective_duration_shrinks_for_small_files() {
        let config = ChunkConfig {
            max_duration: Duration::from_secs(600),
            max_file_size: 1024 * 1024,
        };
        let duration = config.effective_duration();
        assert!(duration < Duration::from_secs(600));
        assert!(estimate_wav_size(duration) <= config.max_file_size);
    }

    #[test]
    fn test_plan_chunks_covers_track() {
        let config = ChunkConfig {
            max_duration: Duration::from_secs(30),
            ..Default::default()
        };
        let chunks = plan_chunks(Duration::from_secs(100), &config);

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].start, Duration::ZERO);
        assert_eq!(chunks[0].end, Duration::from_secs(30));
        assert_eq!(chunks[3].start, Duration::from_secs(90));
        assert_eq!(chunks[3].end, Duration::from_secs(100));
    }

    #[test]
    fn test_plan_chunks_short_track_single_chunk() {
        let chunks = plan_chunks(Duration::from_secs(45), &ChunkConfig::whisper());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].duration(), Duration::from_secs(45));
    }

    #[test]
    fn test_plan_chunks_empty_track() {
        assert!(plan_chunks(Duration::ZERO, &ChunkConfig::whisper()).is_empty());
    }

    #[test]
    fn test_estimate_wav_size() {
        let size = estimate_wav_size(Duration::from_secs(60));
        assert_eq!(size, 44 + 60 * 16000 * 2);
    }

    #[tokio::test]
    async fn test_single_chunk_reuses_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("audio.wav");
        std::fs::write(&source, b"RIFF").unwrap();
        let regions = vec![TimeRegion {
            start: Duration::ZERO,
            end: Duration::from_secs(10),
        }];

        let chunks = create_chunks(&source, &regions, dir.path()).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].path, source);
    }
}
