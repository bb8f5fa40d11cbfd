//! Dub timeline composition.
//!
//! Two tracks are built from the synthesized clips, strictly in sentence
//! order:
//!
//! - the dub-only track, where each clip is preceded by enough silence to
//!   end no earlier than the original sentence did;
//! - the ducked track, a copy of the original where each clip's window is
//!   lowered, the surrounding audio is faded out and back in, and the clip
//!   is mixed on top. Its length never changes.

use crate::audio::AudioBuffer;
use crate::error::{DubError, Result};
use crate::segment::Sentence;
use crate::synthesize::{Synthesizer, Voice};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CompositorConfig {
    /// Gain applied to the original audio under each clip.
    pub duck_gain_db: f32,
    pub max_fade_ms: u64,
    pub min_fade_ms: u64,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            duck_gain_db: -10.0,
            max_fade_ms: 500,
            min_fade_ms: 1,
        }
    }
}

/// The two finished output tracks.
#[derive(Debug, Clone)]
pub struct DubTracks {
    pub dub_only: AudioBuffer,
    pub ducked: AudioBuffer,
}

#[derive(Debug, Clone, Default)]
pub struct CompositionStats {
    pub sentences: usize,
    /// Sentences whose dub ended after the original sentence end.
    pub overruns: usize,
    /// Largest distance between a dub end and its original sentence end.
    pub max_overrun_ms: u64,
}

/// Running state of a composition: both tracks and the end of the last clip.
pub struct DubTimeline {
    config: CompositorConfig,
    dub_only: AudioBuffer,
    ducked: AudioBuffer,
    prev_end_ms: u64,
    stats: CompositionStats,
}

impl DubTimeline {
    /// Start from the original track; the dub-only track starts empty.
    pub fn new(original: AudioBuffer, config: CompositorConfig) -> Self {
        Self {
            config,
            dub_only: AudioBuffer::empty(original.sample_rate(), original.channels()),
            ducked: original,
            prev_end_ms: 0,
            stats: CompositionStats::default(),
        }
    }

    /// Place the clip for `sentence` on both tracks.
    ///
    /// `next` is the following sentence, if any; the last sentence fades
    /// back in towards the end of the track.
    pub fn place(&mut self, sentence: &Sentence, next: Option<&Sentence>, clip: &AudioBuffer) -> Result<()> {
        let clip = clip.conform_to(self.ducked.sample_rate(), self.ducked.channels())?;
        let track_ms = self.ducked.len_ms();
        let clip_ms = clip.len_ms();

        let start_ms = seconds_to_ms(sentence.start)?;
        let end_ms = start_ms + clip_ms;
        let next_start_ms = match next {
            Some(next) => seconds_to_ms(next.start)?,
            None => track_ms,
        };

        let (fade_out_ms, fade_in_ms) = self.fade_lengths(start_ms, end_ms, next_start_ms);
        debug!(
            "Placing {} ms clip at {} ms (fade out {} ms, fade in {} ms)",
            clip_ms, start_ms, fade_out_ms, fade_in_ms
        );

        if start_ms > 0 {
            self.ducked.fade_out_range(start_ms, fade_out_ms);
        }
        self.ducked
            .apply_gain_range(start_ms, end_ms, self.config.duck_gain_db);
        if end_ms < track_ms {
            self.ducked.fade_in_range(end_ms, fade_in_ms);
        }
        self.ducked.overlay(&clip, start_ms)?;
        self.prev_end_ms = end_ms;

        self.append_dub(sentence, &clip)
    }

    /// Pad the dub-only track so the clip ends at the original sentence end.
    ///
    /// A clip longer than the remaining span is appended unpadded, which
    /// delays every later sentence; that overrun is recorded.
    fn append_dub(&mut self, sentence: &Sentence, clip: &AudioBuffer) -> Result<()> {
        let original_end_ms = seconds_to_ms(sentence.end)?;
        let dub_end_ms = self.dub_only.len_ms() + clip.len_ms();

        if dub_end_ms < original_end_ms {
            let padding = AudioBuffer::silent(
                original_end_ms - dub_end_ms,
                self.dub_only.sample_rate(),
                self.dub_only.channels(),
            );
            self.dub_only.append(&padding)?;
        } else if dub_end_ms > original_end_ms {
            let overrun = dub_end_ms - original_end_ms;
            warn!(
                "Dub for \"{}\" ends {} ms after the original sentence",
                sentence.text, overrun
            );
            self.stats.overruns += 1;
            self.stats.max_overrun_ms = self.stats.max_overrun_ms.max(overrun);
        }

        self.stats.sentences += 1;
        self.dub_only.append(clip)
    }

    /// Fades are bounded by the gap to the previous clip and to the next sentence.
    fn fade_lengths(&self, start_ms: u64, end_ms: u64, next_start_ms: u64) -> (u64, u64) {
        let clamp = |gap: u64| gap.clamp(self.config.min_fade_ms, self.config.max_fade_ms);
        (
            clamp(start_ms.saturating_sub(self.prev_end_ms)),
            clamp(next_start_ms.saturating_sub(end_ms)),
        )
    }

    pub fn stats(&self) -> &CompositionStats {
        &self.stats
    }

    pub fn finish(self) -> (DubTracks, CompositionStats) {
        (
            DubTracks {
                dub_only: self.dub_only,
                ducked: self.ducked,
            },
            self.stats,
        )
    }
}

fn seconds_to_ms(seconds: f64) -> Result<u64> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(DubError::Composition(format!(
            "Invalid sentence time: {seconds}"
        )));
    }
    Ok((seconds * 1000.0).trunc() as u64)
}

/// Synthesizes every translation and places it on a [`DubTimeline`].
pub struct Compositor {
    synthesizer: Arc<dyn Synthesizer>,
    voice: Voice,
    config: CompositorConfig,
    concurrency: usize,
    show_progress: bool,
}

impl Compositor {
    pub fn new(synthesizer: Box<dyn Synthesizer>, voice: Voice) -> Self {
        Self {
            synthesizer: Arc::from(synthesizer),
            voice,
            config: CompositorConfig::default(),
            concurrency: 1,
            show_progress: true,
        }
    }

    pub fn with_config(mut self, config: CompositorConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of synthesis requests in flight at once. Clips are still
    /// placed in sentence order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Build both tracks. Any synthesis failure aborts the whole composition.
    pub async fn compose(
        &self,
        sentences: &[Sentence],
        translations: &[String],
        original: AudioBuffer,
    ) -> Result<(DubTracks, CompositionStats)> {
        if sentences.len() != translations.len() {
            return Err(DubError::Composition(format!(
                "{} sentences but {} translations",
                sentences.len(),
                translations.len()
            )));
        }

        let original_ms = original.len_ms();
        let mut timeline = DubTimeline::new(original, self.config.clone());

        info!(
            "Composing {} sentences with {} ({})",
            sentences.len(),
            self.synthesizer.name(),
            self.voice
        );

        let progress_bar = if self.show_progress {
            let pb = ProgressBar::new(sentences.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} sentences ({eta}) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let mut clips = stream::iter(translations.iter().enumerate())
            .map(|(index, text)| {
                let synthesizer = self.synthesizer.clone();
                let voice = &self.voice;
                async move {
                    let clip = synthesizer.synthesize(text, voice).await.map_err(|e| match e {
                        DubError::Synthesis(msg) => {
                            DubError::Synthesis(format!("sentence {}: {}", index, msg))
                        }
                        other => DubError::Synthesis(format!("sentence {}: {}", index, other)),
                    })?;
                    Ok::<_, DubError>((index, clip))
                }
            })
            .buffered(self.concurrency);

        while let Some(result) = clips.next().await {
            let (index, clip) = result?;
            timeline.place(&sentences[index], sentences.get(index + 1), &clip)?;
            if let Some(ref pb) = progress_bar {
                let overruns = timeline.stats().overruns;
                if overruns > 0 {
                    pb.set_message(format!("{} overrun(s)", overruns));
                }
                pb.inc(1);
            }
        }

        if let Some(pb) = progress_bar {
            pb.finish_with_message("Composition complete");
        }

        let (tracks, stats) = timeline.finish();
        if tracks.ducked.len_ms() != original_ms {
            return Err(DubError::Composition(format!(
                "Ducked track is {} ms, expected {} ms",
                tracks.ducked.len_ms(),
                original_ms
            )));
        }

        Ok((tracks, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    const RATE: u32 = 1000;

    fn constant(ms: u64, level: f32) -> AudioBuffer {
        AudioBuffer::new(vec![level; ms as usize], RATE, 1)
    }

    fn sentence(start: f64, end: f64) -> Sentence {
        Sentence {
            text: "text".to_string(),
            start,
            end,
        }
    }

    /// Clip length in ms is parsed from the text; "fail" fails.
    struct ToneSynthesizer;

    #[async_trait]
    impl Synthesizer for ToneSynthesizer {
        async fn synthesize(&self, text: &str, _voice: &Voice) -> Result<AudioBuffer> {
            let ms: u64 = text
                .parse()
                .map_err(|_| DubError::Synthesis("quota exceeded".to_string()))?;
            Ok(constant(ms, 0.1))
        }

        fn name(&self) -> &'static str {
            "Tone"
        }
    }

    fn compositor() -> Compositor {
        let voice: Voice = "es-US-Neural2-B".parse().unwrap();
        Compositor::new(Box::new(ToneSynthesizer), voice)
            .with_concurrency(2)
            .with_progress(false)
    }

    #[test]
    fn test_two_sentence_scenario() {
        let mut timeline = DubTimeline::new(constant(10_000, 0.5), CompositorConfig::default());
        let s1 = sentence(1.0, 3.0);
        let s2 = sentence(4.0, 6.0);

        timeline.place(&s1, Some(&s2), &constant(1500, 0.1)).unwrap();
        assert_eq!(timeline.dub_only.len_ms(), 3000);
        timeline.place(&s2, None, &constant(2500, 0.1)).unwrap();

        let (tracks, stats) = timeline.finish();
        // 1500 pad + 1500 clip + 500 pad + 2500 clip
        assert_eq!(tracks.dub_only.len_ms(), 6000);
        assert_eq!(tracks.ducked.len_ms(), 10_000);
        assert_eq!(stats.sentences, 2);
        assert_eq!(stats.overruns, 0);
    }

    #[test]
    fn test_window_is_ducked() {
        let original = constant(10_000, 0.5);
        let mut timeline = DubTimeline::new(original.clone(), CompositorConfig::default());
        timeline
            .place(&sentence(2.0, 4.0), None, &constant(2000, 0.0))
            .unwrap();

        let (tracks, _) = timeline.finish();
        let ducked = tracks.ducked.slice(2000, 4000).rms();
        let before = original.slice(2000, 4000).rms();
        assert!(ducked < before);
        assert!((ducked - 0.5 * 0.316_227_8).abs() < 1e-3);
    }

    #[test]
    fn test_clip_is_mixed_not_replaced() {
        let mut timeline = DubTimeline::new(constant(5000, 0.5), CompositorConfig::default());
        timeline
            .place(&sentence(1.0, 2.0), None, &constant(1000, 0.2))
            .unwrap();

        let (tracks, _) = timeline.finish();
        let expected = 0.5 * 0.316_227_8 + 0.2;
        assert!((tracks.ducked.samples()[1500] - expected).abs() < 1e-4);
    }

    #[test]
    fn test_start_at_zero_has_no_fade_out() {
        let mut timeline = DubTimeline::new(constant(5000, 1.0), CompositorConfig::default());
        timeline
            .place(&sentence(0.0, 1.0), None, &constant(1000, 0.0))
            .unwrap();

        let samples = timeline.ducked.samples().to_vec();
        assert!((samples[0] - 0.316_227_8).abs() < 1e-4);
        assert!((samples[999] - 0.316_227_8).abs() < 1e-4);
        // the tail fades in from silence over 500 ms
        assert_eq!(samples[1000], 0.0);
        assert!(samples[1250] > 0.4 && samples[1250] < 0.6);
        assert_eq!(samples[1500], 1.0);
        assert_eq!(samples[4999], 1.0);
    }

    #[test]
    fn test_end_at_track_length_has_no_fade_in() {
        let mut timeline = DubTimeline::new(constant(10_000, 1.0), CompositorConfig::default());
        timeline
            .place(&sentence(8.0, 10.0), None, &constant(2000, 0.0))
            .unwrap();

        let samples = timeline.ducked.samples().to_vec();
        assert_eq!(samples[7499], 1.0);
        assert!(samples[7500] > 0.99);
        assert_eq!(samples[7999], 0.0);
        assert!((samples[8000] - 0.316_227_8).abs() < 1e-4);
        assert!((samples[9999] - 0.316_227_8).abs() < 1e-4);
        assert_eq!(timeline.ducked.len_ms(), 10_000);
    }

    #[test]
    fn test_fades_bounded_by_gaps() {
        let mut timeline = DubTimeline::new(constant(10_000, 1.0), CompositorConfig::default());
        assert_eq!(timeline.fade_lengths(1000, 2000, 2200), (500, 200));

        timeline.prev_end_ms = 900;
        assert_eq!(timeline.fade_lengths(1000, 2000, 5000), (100, 500));

        // touching or overlapping neighbours still get a 1 ms fade
        timeline.prev_end_ms = 1200;
        assert_eq!(timeline.fade_lengths(1000, 2000, 1800), (1, 1));
    }

    #[test]
    fn test_exact_fit_needs_no_padding() {
        let mut timeline = DubTimeline::new(constant(5000, 0.5), CompositorConfig::default());
        timeline
            .place(&sentence(0.0, 2.0), None, &constant(2000, 0.1))
            .unwrap();
        assert_eq!(timeline.dub_only.len_ms(), 2000);
    }

    #[test]
    fn test_long_dub_is_recorded_as_overrun() {
        let mut timeline = DubTimeline::new(constant(10_000, 0.5), CompositorConfig::default());
        timeline
            .place(&sentence(1.0, 2.0), Some(&sentence(3.0, 4.0)), &constant(2500, 0.1))
            .unwrap();
        assert_eq!(timeline.stats().overruns, 1);
        assert_eq!(timeline.stats().sentences, 1);
        timeline
            .place(&sentence(3.0, 4.0), None, &constant(500, 0.1))
            .unwrap();

        let (tracks, stats) = timeline.finish();
        // no padding before the first clip, the second is padded back to 4000
        assert_eq!(tracks.dub_only.len_ms(), 4000);
        assert_eq!(stats.overruns, 1);
        assert_eq!(stats.max_overrun_ms, 500);
    }

    #[test]
    fn test_clip_format_is_conformed() {
        let mut timeline = DubTimeline::new(constant(5000, 0.5), CompositorConfig::default());
        let clip = AudioBuffer::new(vec![0.1; 4000], 2000, 2);
        timeline.place(&sentence(1.0, 3.0), None, &clip).unwrap();

        assert_eq!(timeline.dub_only.len_ms(), 3000);
        assert_eq!(timeline.dub_only.sample_rate(), RATE);
        assert_eq!(timeline.ducked.len_ms(), 5000);
    }

    #[test]
    fn test_sentence_times_truncate_to_ms() {
        assert_eq!(seconds_to_ms(1.0009).unwrap(), 1000);
        assert_eq!(seconds_to_ms(2.9999).unwrap(), 2999);
        assert_eq!(seconds_to_ms(0.0).unwrap(), 0);
        assert!(seconds_to_ms(f64::NAN).is_err());
    }

    #[test]
    fn test_rejects_negative_time() {
        let mut timeline = DubTimeline::new(constant(5000, 0.5), CompositorConfig::default());
        let result = timeline.place(&sentence(-1.0, 1.0), None, &constant(100, 0.1));
        assert!(matches!(result, Err(DubError::Composition(_))));
    }

    #[tokio::test]
    async fn test_compose_scenario() {
        let sentences = vec![sentence(1.0, 3.0), sentence(4.0, 6.0)];
        let translations = vec!["1500".to_string(), "2500".to_string()];

        let (tracks, stats) = compositor()
            .compose(&sentences, &translations, constant(10_000, 0.5))
            .await
            .unwrap();

        assert_eq!(tracks.dub_only.len_ms(), 6000);
        assert_eq!(tracks.ducked.len_ms(), 10_000);
        assert_eq!(stats.sentences, 2);
    }

    #[tokio::test]
    async fn test_compose_fails_on_synthesis_error() {
        let sentences = vec![sentence(1.0, 2.0), sentence(3.0, 4.0), sentence(5.0, 6.0)];
        let translations = vec!["500".to_string(), "fail".to_string(), "500".to_string()];

        match compositor()
            .compose(&sentences, &translations, constant(10_000, 0.5))
            .await
        {
            Err(DubError::Synthesis(msg)) => assert!(msg.contains("sentence 1")),
            other => panic!("Expected synthesis error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_compose_rejects_count_mismatch() {
        let result = compositor()
            .compose(&[sentence(1.0, 2.0)], &[], constant(5000, 0.5))
            .await;
        assert!(matches!(result, Err(DubError::Composition(_))));
    }

    #[tokio::test]
    async fn test_compose_empty() {
        let (tracks, stats) = compositor()
            .compose(&[], &[], constant(5000, 0.5))
            .await
            .unwrap();
        assert!(tracks.dub_only.is_empty());
        assert_eq!(tracks.ducked, constant(5000, 0.5));
        assert_eq!(stats.sentences, 0);
    }
}
