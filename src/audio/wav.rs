use std::io::{Cursor, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::{debug, info};

use crate::error::{DubError, Result};

use super::AudioBuffer;

/// Read a WAV file into memory.
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(DubError::FileNotFound(path.display().to_string()));
    }
    let reader = WavReader::open(path)?;
    let buffer = read_samples(reader)?;
    debug!(
        "Loaded {}: {} Hz, {} ch, {} ms",
        path.display(),
        buffer.sample_rate(),
        buffer.channels(),
        buffer.len_ms()
    );
    Ok(buffer)
}

/// Decode an in-memory WAV payload.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    read_samples(reader)
}

fn read_samples<R: Read>(reader: WavReader<R>) -> Result<AudioBuffer> {
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate, spec.channels))
}

fn pcm16_spec(buffer: &AudioBuffer) -> WavSpec {
    WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Write a buffer as 16-bit PCM WAV.
pub fn export_wav(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    let mut writer = WavWriter::create(path, pcm16_spec(buffer))?;
    for &sample in buffer.samples() {
        writer.write_sample(to_i16(sample))?;
    }
    writer.finalize()?;

    info!(
        "Wrote {} ({:.1}s)",
        path.display(),
        buffer.duration().as_secs_f64()
    );
    Ok(())
}

/// Encode a buffer as an in-memory 16-bit PCM WAV payload.
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, pcm16_spec(buffer))?;
        for &sample in buffer.samples() {
            writer.write_sample(to_i16(sample))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
