pub mod buffer;
pub mod chunk;
pub mod extract;
pub mod wav;

pub use buffer::{db_to_gain, AudioBuffer};
pub use chunk::{create_chunks, estimate_wav_size, plan_chunks, ChunkConfig};
pub use extract::{
    check_ffmpeg, check_ffprobe, extract_audio, extract_audio_segment, extract_pcm_track,
    get_media_duration, has_video_stream, replace_audio_track,
};
pub use wav::{decode_wav, encode_wav, export_wav, read_wav};

use std::path::PathBuf;
use std::time::Duration;

/// Metadata about an audio file.
#[derive(Debug, Clone)]
pub struct AudioMetadata {
    pub duration: Duration,
    pub sample_rate: u32,
    pub channels: u16,
}

/// A span of time within a track.
#[derive(Debug, Clone)]
pub struct TimeRegion {
    pub start: Duration,
    pub end: Duration,
}

impl TimeRegion {
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// A chunk of audio ready for transcription.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub region: TimeRegion,
    pub path: PathBuf,
    pub index: usize,
}

impl AudioChunk {
    pub fn duration(&self) -> Duration {
        self.region.duration()
    }
}
