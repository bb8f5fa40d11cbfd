use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::error::{DubError, Result};

use super::AudioMetadata;

/// Sample rate used for the transcription copy of the audio track.
pub const ASR_SAMPLE_RATE: u32 = 16000;

/// Check if FFmpeg is installed and accessible.
pub fn check_ffmpeg() -> Result<()> {
    let output = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map_err(|e| {
            DubError::Container(format!(
                "FFmpeg not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(DubError::Container("FFmpeg check failed".to_string()));
    }

    debug!("FFmpeg is available");
    Ok(())
}

/// Check if FFprobe is installed and accessible.
pub fn check_ffprobe() -> Result<()> {
    let output = Command::new("ffprobe")
        .arg("-version")
        .output()
        .map_err(|e| {
            DubError::Container(format!(
                "FFprobe not found. Please install FFmpeg (includes FFprobe). Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(DubError::Container("FFprobe check failed".to_string()));
    }

    debug!("FFprobe is available");
    Ok(())
}

/// Get the container duration using FFprobe.
pub fn get_media_duration(input: &Path) -> Result<Duration> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input)
        .output()
        .map_err(|e| DubError::Container(format!("Failed to run FFprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DubError::Container(format!("FFprobe failed: {stderr}")));
    }

    let duration_str = String::from_utf8_lossy(&output.stdout);
    let duration_secs: f64 = duration_str.trim().parse().map_err(|e| {
        DubError::Container(format!(
            "Failed to parse duration '{}': {e}",
            duration_str.trim()
        ))
    })?;

    Ok(Duration::from_secs_f64(duration_secs))
}

/// Whether the input carries at least one video stream.
pub fn has_video_stream(input: &Path) -> Result<bool> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v",
            "-show_entries",
            "stream=codec_type",
            "-of",
            "csv=p=0",
        ])
        .arg(input)
        .output()
        .map_err(|e| DubError::Container(format!("Failed to run FFprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DubError::Container(format!("FFprobe failed: {stderr}")));
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .any(|l| l.trim() == "video"))
}

async fn run_ffmpeg(cmd: &mut TokioCommand, what: &str) -> Result<()> {
    let output = cmd
        .output()
        .await
        .map_err(|e| DubError::Container(format!("Failed to run FFmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        return Err(DubError::Container(format!(
            "FFmpeg {} failed: {}",
            what,
            tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
        )));
    }
    Ok(())
}

fn require_input(input: &Path) -> Result<()> {
    if !input.exists() {
        return Err(DubError::FileNotFound(input.display().to_string()));
    }
    Ok(())
}

/// Extract audio from a video/audio file and convert to WAV format.
///
/// The output is mono 16-bit PCM at 16kHz, which keeps uploads to the
/// transcription API small.
pub async fn extract_audio(input: &Path, output: &Path) -> Result<AudioMetadata> {
    require_input(input)?;

    info!("Extracting transcription audio from {}", input.display());

    let duration = get_media_duration(input)?;
    debug!("Input duration: {:?}", duration);

    run_ffmpeg(
        TokioCommand::new("ffmpeg")
            .args(["-y", "-i"])
            .arg(input)
            .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
            .arg(output),
        "audio extraction",
    )
    .await?;

    if !output.exists() {
        return Err(DubError::Container(
            "Output file was not created".to_string(),
        ));
    }

    Ok(AudioMetadata {
        duration,
        sample_rate: ASR_SAMPLE_RATE,
        channels: 1,
    })
}

/// Extract the audio track as 16-bit PCM WAV, keeping its sample rate and channels.
///
/// This is the track the dub is composed onto.
pub async fn extract_pcm_track(input: &Path, output: &Path) -> Result<()> {
    require_input(input)?;

    info!("Extracting original audio track from {}", input.display());

    run_ffmpeg(
        TokioCommand::new("ffmpeg")
            .args(["-y", "-i"])
            .arg(input)
            .args(["-vn", "-acodec", "pcm_s16le"])
            .arg(output),
        "track extraction",
    )
    .await?;

    if !output.exists() {
        return Err(DubError::Container(
            "Output file was not created".to_string(),
        ));
    }
    Ok(())
}

/// Extract a segment of audio between start and end times.
pub async fn extract_audio_segment(
    input: &Path,
    output: &Path,
    start: Duration,
    end: Duration,
) -> Result<()> {
    require_input(input)?;

    let duration = end.saturating_sub(start);
    if duration.is_zero() {
        return Err(DubError::Container("Segment duration is zero".to_string()));
    }

    let start_secs = format!("{:.3}", start.as_secs_f64());
    let duration_secs = format!("{:.3}", duration.as_secs_f64());

    debug!(
        "Extracting segment: start={}, duration={}",
        start_secs, duration_secs
    );

    run_ffmpeg(
        TokioCommand::new("ffmpeg")
            .args(["-y", "-ss"])
            .arg(&start_secs)
            .args(["-t"])
            .arg(&duration_secs)
            .args(["-i"])
            .arg(input)
            .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
            .arg(output),
        "segment extraction",
    )
    .await
}

/// Replace the audio of `video` with the WAV at `audio`, writing `output`.
///
/// The video stream is copied untouched and the new audio is encoded as AAC.
/// Audio longer than the video is cut at the video's end; shorter audio
/// leaves the rest of the video silent.
pub async fn replace_audio_track(video: &Path, audio: &Path, output: &Path) -> Result<()> {
    require_input(video)?;
    require_input(audio)?;

    let video_duration = get_media_duration(video)?;
    let audio_duration = get_media_duration(audio)?;

    if audio_duration < video_duration {
        warn!(
            "Dubbed audio ({:.1}s) is shorter than the video ({:.1}s); the remaining video will have no sound",
            audio_duration.as_secs_f64(),
            video_duration.as_secs_f64()
        );
    } else if audio_duration > video_duration {
        warn!(
            "Dubbed audio ({:.1}s) is longer than the video ({:.1}s); the extra audio will be cut off",
            audio_duration.as_secs_f64(),
            video_duration.as_secs_f64()
        );
    }

    info!("Attaching dubbed audio to {}", video.display());

    run_ffmpeg(
        TokioCommand::new("ffmpeg")
            .args(["-y", "-i"])
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args([
                "-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", "aac", "-t",
            ])
            .arg(format!("{:.3}", video_duration.as_secs_f64()))
            .arg(output),
        "audio replacement",
    )
    .await?;

    info!("Dubbed video saved as {}", output.display());
    Ok(())
}
