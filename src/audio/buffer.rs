//! In-memory PCM buffer with millisecond addressing.
//!
//! Samples are interleaved `f32` in `[-1.0, 1.0]`. All time arguments are
//! milliseconds and are clamped to the buffer bounds, so slicing past the end
//! yields a shorter (possibly empty) buffer instead of an error.

use std::time::Duration;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{DubError, Result};

/// Frames fed to the resampler per call.
const RESAMPLE_CHUNK: usize = 1024;

/// Convert a decibel change into a linear amplitude factor.
pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Wrap interleaved samples. A trailing partial frame is dropped.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self {
            samples,
            sample_rate: sample_rate.max(1),
            channels,
        }
    }

    pub fn empty(sample_rate: u32, channels: u16) -> Self {
        Self::new(Vec::new(), sample_rate, channels)
    }

    pub fn silent(duration_ms: u64, sample_rate: u32, channels: u16) -> Self {
        let frames = ms_to_frames(duration_ms, sample_rate);
        Self::new(
            vec![0.0; frames * channels.max(1) as usize],
            sample_rate,
            channels,
        )
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length in whole milliseconds (rounded to nearest).
    pub fn len_ms(&self) -> u64 {
        let rate = self.sample_rate as u64;
        (self.frames() as u64 * 1000 + rate / 2) / rate
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    fn same_format(&self, other: &AudioBuffer) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }

    /// Sample index range covering `[start_ms, end_ms)`, clamped to the buffer.
    fn sample_range(&self, start_ms: u64, end_ms: u64) -> std::ops::Range<usize> {
        let frames = self.frames();
        let start = ms_to_frames(start_ms, self.sample_rate).min(frames);
        let end = ms_to_frames(end_ms, self.sample_rate).clamp(start, frames);
        let ch = self.channels as usize;
        start * ch..end * ch
    }

    /// Copy of `[start_ms, end_ms)`.
    pub fn slice(&self, start_ms: u64, end_ms: u64) -> AudioBuffer {
        let range = self.sample_range(start_ms, end_ms);
        AudioBuffer::new(
            self.samples[range].to_vec(),
            self.sample_rate,
            self.channels,
        )
    }

    /// Append `other`, which must share this buffer's sample rate and channel count.
    pub fn append(&mut self, other: &AudioBuffer) -> Result<()> {
        if !self.same_format(other) {
            return Err(DubError::Composition(format!(
                "Cannot append {} Hz/{} ch audio to {} Hz/{} ch buffer",
                other.sample_rate, other.channels, self.sample_rate, self.channels
            )));
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }

    pub fn apply_gain(&mut self, db: f32) {
        let end = self.len_ms() + 1;
        self.apply_gain_range(0, end, db);
    }

    pub fn apply_gain_range(&mut self, start_ms: u64, end_ms: u64, db: f32) {
        let gain = db_to_gain(db);
        let range = self.sample_range(start_ms, end_ms);
        for s in &mut self.samples[range] {
            *s *= gain;
        }
    }

    /// Linear ramp from silence to full level over `duration_ms`, starting at `start_ms`.
    pub fn fade_in_range(&mut self, start_ms: u64, duration_ms: u64) {
        let range = self.sample_range(start_ms, start_ms.saturating_add(duration_ms));
        let ch = self.channels as usize;
        let frames = range.len() / ch;
        if frames == 0 {
            return;
        }
        for (i, frame) in self.samples[range].chunks_exact_mut(ch).enumerate() {
            let gain = i as f32 / frames as f32;
            frame.iter_mut().for_each(|s| *s *= gain);
        }
    }

    /// Linear ramp from full level to silence over the `duration_ms` ending at `end_ms`.
    pub fn fade_out_range(&mut self, end_ms: u64, duration_ms: u64) {
        let range = self.sample_range(end_ms.saturating_sub(duration_ms), end_ms);
        let ch = self.channels as usize;
        let frames = range.len() / ch;
        if frames == 0 {
            return;
        }
        for (i, frame) in self.samples[range].chunks_exact_mut(ch).enumerate() {
            let gain = 1.0 - (i + 1) as f32 / frames as f32;
            frame.iter_mut().for_each(|s| *s *= gain);
        }
    }

    /// Mix `other` into this buffer starting at `position_ms`.
    ///
    /// The mix is additive and never extends the buffer: whatever part of
    /// `other` falls past the end is dropped.
    pub fn overlay(&mut self, other: &AudioBuffer, position_ms: u64) -> Result<()> {
        if !self.same_format(other) {
            return Err(DubError::Composition(format!(
                "Cannot overlay {} Hz/{} ch audio onto {} Hz/{} ch buffer",
                other.sample_rate, other.channels, self.sample_rate, self.channels
            )));
        }
        let range = self.sample_range(position_ms, u64::MAX);
        for (dst, src) in self.samples[range].iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }
        Ok(())
    }

    /// Convert to the given sample rate and channel count.
    ///
    /// Channels are averaged down or duplicated up. Resampling is
    /// band-limited sinc interpolation and keeps the duration.
    pub fn conform_to(&self, sample_rate: u32, channels: u16) -> Result<AudioBuffer> {
        let channels = channels.max(1);
        if self.sample_rate == sample_rate && self.channels == channels {
            return Ok(self.clone());
        }

        let remixed = remix_channels(&self.samples, self.channels, channels);
        let resampled = resample(&remixed, channels, self.sample_rate, sample_rate)?;
        Ok(AudioBuffer::new(resampled, sample_rate, channels))
    }

    /// Root-mean-square level over all samples.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_squares / self.samples.len() as f64).sqrt() as f32
    }
}

fn ms_to_frames(ms: u64, sample_rate: u32) -> usize {
    let frames = ms as u128 * sample_rate as u128 / 1000;
    frames.min(usize::MAX as u128) as usize
}

fn remix_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    if from == to {
        return samples.to_vec();
    }
    let from = from as usize;
    let to = to as usize;
    samples
        .chunks_exact(from)
        .flat_map(|frame| {
            let mono = frame.iter().sum::<f32>() / from as f32;
            std::iter::repeat(mono).take(to)
        })
        .collect()
}

/// Append per-channel output blocks. Returns whether anything was added.
fn append_planar(output: &mut [Vec<f32>], produced: Vec<Vec<f32>>) -> bool {
    let grew = produced.first().is_some_and(|c| !c.is_empty());
    for (channel, block) in output.iter_mut().zip(produced) {
        channel.extend(block);
    }
    grew
}

fn resample_error(e: impl std::fmt::Display) -> DubError {
    DubError::Composition(format!("Resampling failed: {e}"))
}

/// Sinc resampling of interleaved audio to exactly `len * to / from` frames.
fn resample(samples: &[f32], channels: u16, from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ch = channels as usize;
    let in_frames = samples.len() / ch;
    let ratio = to_rate as f64 / from_rate as f64;
    let out_frames = (in_frames as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, ch).map_err(resample_error)?;
    let delay = resampler.output_delay();

    let planar: Vec<Vec<f32>> = (0..ch)
        .map(|c| samples.iter().skip(c).step_by(ch).copied().collect())
        .collect();
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(out_frames + delay); ch];
    let mut pos = 0;
    while pos < in_frames {
        let needed = resampler.input_frames_next();
        let end = (pos + needed).min(in_frames);
        let block: Vec<&[f32]> = planar.iter().map(|c| &c[pos..end]).collect();
        let produced = if end - pos == needed {
            resampler.process(&block, None)
        } else {
            resampler.process_partial(Some(block.as_slice()), None)
        }
        .map_err(resample_error)?;
        append_planar(&mut output, produced);
        pos = end;
    }

    // flush the filter tail
    while output[0].len() < out_frames + delay {
        let produced = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(resample_error)?;
        if !append_planar(&mut output, produced) {
            break;
        }
    }

    let mut interleaved = Vec::with_capacity(out_frames * ch);
    for frame in delay..delay + out_frames {
        for channel in &output {
            interleaved.push(channel.get(frame).copied().unwrap_or(0.0));
        }
    }
    Ok(interleaved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(ms: u64, level: f32) -> AudioBuffer {
        let mut buf = AudioBuffer::silent(ms, 1000, 1);
        let len = buf.samples.len();
        buf.samples = vec![level; len];
        buf
    }

    #[test]
    fn test_len_ms() {
        assert_eq!(AudioBuffer::silent(1500, 16000, 1).len_ms(), 1500);
        assert_eq!(AudioBuffer::silent(1500, 44100, 2).len_ms(), 1500);
        assert_eq!(AudioBuffer::empty(16000, 1).len_ms(), 0);
    }

    #[test]
    fn test_new_drops_partial_frame() {
        let buf = AudioBuffer::new(vec![0.1, 0.2, 0.3], 8000, 2);
        assert_eq!(buf.frames(), 1);
    }

    #[test]
    fn test_slice_clamps_to_bounds() {
        let buf = constant(1000, 0.5);
        assert_eq!(buf.slice(200, 700).len_ms(), 500);
        assert_eq!(buf.slice(800, 5000).len_ms(), 200);
        assert!(buf.slice(2000, 3000).is_empty());
    }

    #[test]
    fn test_append_requires_same_format() {
        let mut buf = AudioBuffer::silent(100, 16000, 1);
        assert!(buf.append(&AudioBuffer::silent(100, 16000, 1)).is_ok());
        assert_eq!(buf.len_ms(), 200);
        assert!(buf.append(&AudioBuffer::silent(100, 8000, 1)).is_err());
    }

    #[test]
    fn test_gain_minus_ten_db() {
        let mut buf = constant(100, 1.0);
        buf.apply_gain(-10.0);
        assert!((buf.samples()[0] - 0.316_227_8).abs() < 1e-4);
    }

    #[test]
    fn test_gain_range_only_touches_range() {
        let mut buf = constant(1000, 1.0);
        buf.apply_gain_range(100, 200, -20.0);
        assert_eq!(buf.samples()[99], 1.0);
        assert!((buf.samples()[150] - 0.1).abs() < 1e-4);
        assert_eq!(buf.samples()[200], 1.0);
    }

    #[test]
    fn test_fade_in_starts_silent() {
        let mut buf = constant(1000, 1.0);
        buf.fade_in_range(500, 100);
        assert_eq!(buf.samples()[499], 1.0);
        assert_eq!(buf.samples()[500], 0.0);
        assert!(buf.samples()[550] > 0.4 && buf.samples()[550] < 0.6);
        assert_eq!(buf.samples()[600], 1.0);
    }

    #[test]
    fn test_fade_out_ends_silent() {
        let mut buf = constant(1000, 1.0);
        buf.fade_out_range(500, 100);
        assert_eq!(buf.samples()[399], 1.0);
        assert!(buf.samples()[400] > 0.95);
        assert_eq!(buf.samples()[499], 0.0);
        assert_eq!(buf.samples()[500], 1.0);
    }

    #[test]
    fn test_overlay_is_additive_and_keeps_length() {
        let mut base = constant(1000, 0.25);
        let clip = constant(500, 0.5);
        base.overlay(&clip, 800).unwrap();

        assert_eq!(base.len_ms(), 1000);
        assert_eq!(base.samples()[799], 0.25);
        assert_eq!(base.samples()[800], 0.75);
        assert_eq!(base.samples()[999], 0.75);
    }

    #[test]
    fn test_conform_resamples_and_remixes() {
        let stereo = AudioBuffer::new(vec![0.2, 0.4].repeat(16000), 16000, 2);
        let mono = stereo.conform_to(8000, 1).unwrap();
        assert_eq!(mono.channels(), 1);
        assert_eq!(mono.sample_rate(), 8000);
        assert_eq!(mono.len_ms(), 1000);
        assert!((mono.samples()[4000] - 0.3).abs() < 1e-2);

        let back = mono.conform_to(24000, 2).unwrap();
        assert_eq!(back.len_ms(), 1000);
        assert_eq!(back.channels(), 2);
    }

    fn sine(freq: f32, ms: u64, rate: u32) -> AudioBuffer {
        let frames = (ms * rate as u64 / 1000) as usize;
        let samples = (0..frames)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect();
        AudioBuffer::new(samples, rate, 1)
    }

    #[test]
    fn test_downsampling_filters_above_nyquist() {
        // 10 kHz cannot be represented at 16 kHz and must not fold back
        let tone = sine(10_000.0, 500, 24_000);
        let out = tone.conform_to(16_000, 1).unwrap();

        assert_eq!(out.len_ms(), 500);
        assert!(tone.rms() > 0.3);
        assert!(out.slice(50, 450).rms() < 0.02, "aliased rms {}", out.slice(50, 450).rms());
    }

    #[test]
    fn test_resampling_keeps_in_band_tone() {
        let tone = sine(1_000.0, 500, 24_000);
        let out = tone.conform_to(16_000, 1).unwrap();

        let ratio = out.slice(50, 450).rms() / tone.slice(50, 450).rms();
        assert!((ratio - 1.0).abs() < 0.05, "level ratio {}", ratio);
    }

    #[test]
    fn test_conform_same_format_is_identity() {
        let tone = sine(440.0, 100, 24_000);
        assert_eq!(tone.conform_to(24_000, 1).unwrap(), tone);
    }

    #[test]
    fn test_rms() {
        assert_eq!(AudioBuffer::silent(100, 1000, 1).rms(), 0.0);
        assert!((constant(100, 0.5).rms() - 0.5).abs() < 1e-6);
    }
}
