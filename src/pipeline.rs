use crate::audio::{
    check_ffmpeg, check_ffprobe, create_chunks, export_wav, extract_audio, extract_pcm_track,
    has_video_stream, plan_chunks, read_wav, replace_audio_track, ChunkConfig,
};
use crate::compose::{Compositor, CompositorConfig};
use crate::config::Config;
use crate::error::{DubError, Result};
use crate::language::Language;
use crate::segment::{Segmenter, Sentence, SyllableAnalyzer};
use crate::synthesize::google::DEFAULT_SPEAKING_RATE;
use crate::synthesize::{GoogleSynthesizer, Voice};
use crate::transcribe::{TranscriptionOrchestrator, WhisperClient};
use crate::translate::TranslationBatcher;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Configuration for one dubbing run.
#[derive(Debug, Clone)]
pub struct DubConfig {
    /// Language spoken in the input.
    pub source_language: Language,
    /// Voice the translation is spoken with; also decides the target language.
    pub voice: Voice,
    /// Number of concurrent API requests per stage.
    pub concurrency: usize,
    /// Text-to-Speech speaking rate, 1.0 is normal speed.
    pub speaking_rate: f32,
    pub compositor: CompositorConfig,
    /// Show progress bars.
    pub show_progress: bool,
}

impl DubConfig {
    pub fn new(source_language: Language, voice: Voice) -> Self {
        Self {
            source_language,
            voice,
            concurrency: 4,
            speaking_rate: DEFAULT_SPEAKING_RATE,
            compositor: CompositorConfig::default(),
            show_progress: true,
        }
    }
}

/// Where to write the results. At least one output must be set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DubOutputs {
    /// The input video with its audio replaced by the ducked track.
    pub video: Option<PathBuf>,
    /// Translated speech only, paced to the original sentences.
    pub dub_track: Option<PathBuf>,
    /// Original audio lowered under the translated speech.
    pub ducked_track: Option<PathBuf>,
}

impl DubOutputs {
    /// Default output paths next to `input`.
    ///
    /// `movie.mp4` gives `movie_dubbed.mp4`, `movie_dub.wav` and
    /// `movie_ducked.wav`. The video is only produced when `with_video` is set.
    pub fn beside(input: &Path, with_video: bool) -> Self {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let extension = input
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let sibling = |name: String| input.with_file_name(name);

        Self {
            video: with_video.then(|| sibling(format!("{stem}_dubbed.{extension}"))),
            dub_track: Some(sibling(format!("{stem}_dub.wav"))),
            ducked_track: Some(sibling(format!("{stem}_ducked.wav"))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.dub_track.is_none() && self.ducked_track.is_none()
    }

    /// Paths that will be written, in a stable order.
    pub fn paths(&self) -> Vec<&Path> {
        [&self.video, &self.dub_track, &self.ducked_track]
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
            .collect()
    }
}

/// Statistics from a dubbing run.
#[derive(Debug, Clone, Default)]
pub struct DubStats {
    pub total_time: Duration,
    pub extraction_time: Duration,
    pub transcription_time: Duration,
    pub translation_time: Duration,
    pub composition_time: Duration,
    /// Duration of the input audio.
    pub audio_duration: Duration,
    pub chunks_processed: usize,
    pub segments: usize,
    pub sentences: usize,
    /// Sentences whose dub ran past the original sentence end.
    pub overruns: usize,
    pub max_overrun_ms: u64,
    pub translation_providers: Vec<&'static str>,
    pub voice: String,
}

#[derive(Debug)]
pub struct DubResult {
    pub outputs: DubOutputs,
    pub sentences: Vec<Sentence>,
    pub translations: Vec<String>,
    pub stats: DubStats,
    /// Language reported by the transcriber, if it differs from the configured one.
    pub detected_language: Option<String>,
}

/// Owns the scratch directory; everything in it is removed when the run ends.
struct TempCleanupGuard {
    temp_dir: Option<TempDir>,
    cancelled: Arc<AtomicBool>,
}

impl TempCleanupGuard {
    fn new(cancelled: Arc<AtomicBool>) -> Result<Self> {
        let temp_dir = TempDir::new().map_err(|e| {
            DubError::Io(std::io::Error::other(format!(
                "Failed to create temp directory: {}",
                e
            )))
        })?;
        debug!("Using temp directory: {:?}", temp_dir.path());
        Ok(Self {
            temp_dir: Some(temp_dir),
            cancelled,
        })
    }

    fn path(&self) -> &Path {
        match self.temp_dir {
            Some(ref dir) => dir.path(),
            None => Path::new("."),
        }
    }
}

impl Drop for TempCleanupGuard {
    fn drop(&mut self) {
        if let Some(temp_dir) = self.temp_dir.take() {
            let path = temp_dir.path().to_path_buf();
            if self.cancelled.load(Ordering::Relaxed) {
                warn!("Pipeline cancelled, cleaning up temp files: {:?}", path);
            } else {
                debug!("Cleaning up temp directory: {:?}", path);
            }
        }
    }
}

fn check_cancelled(cancelled: &AtomicBool) -> Result<()> {
    if cancelled.load(Ordering::Relaxed) {
        return Err(DubError::Cancelled);
    }
    Ok(())
}

fn stage_spinner(multi_progress: Option<&MultiProgress>, message: &'static str) -> Option<ProgressBar> {
    multi_progress.map(|mp| {
        let pb = mp.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    })
}

/// Move a finished artifact to its final location.
fn persist(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    // rename does not work across filesystems
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    info!("Wrote {}", to.display());
    Ok(())
}

fn required_key<'a>(key: &'a Option<String>, name: &str) -> Result<&'a str> {
    key.as_deref()
        .ok_or_else(|| DubError::Config(format!("{name} not set. Set the {name} environment variable.")))
}

/// Dub a video (or audio file) into the language of `dub_config.voice`.
///
/// This is the main entry point. It:
/// 1. Extracts the audio for transcription and for composition
/// 2. Transcribes it with word timestamps
/// 3. Rebuilds sentences
/// 4. Translates them
/// 5. Synthesizes and composes the dub-only and ducked tracks
/// 6. Writes the tracks and, if requested, the re-muxed video
///
/// Nothing is written to the output paths unless every stage succeeds.
pub async fn dub_video(
    input: &Path,
    outputs: &DubOutputs,
    config: &Config,
    dub_config: DubConfig,
) -> Result<DubResult> {
    let cancelled = Arc::new(AtomicBool::new(false));
    dub_video_with_cancel(input, outputs, config, dub_config, cancelled).await
}

/// Dub a video with cancellation support.
pub async fn dub_video_with_cancel(
    input: &Path,
    outputs: &DubOutputs,
    config: &Config,
    dub_config: DubConfig,
    cancelled: Arc<AtomicBool>,
) -> Result<DubResult> {
    let start_time = Instant::now();

    if !input.exists() {
        return Err(DubError::FileNotFound(input.display().to_string()));
    }
    if outputs.is_empty() {
        return Err(DubError::Config("No output requested".to_string()));
    }
    config.validate()?;

    // Fail on an unusable language before any API is called
    let analyzer = SyllableAnalyzer::new(dub_config.source_language)?;
    let source = dub_config.source_language.iso_code();
    let target = dub_config.voice.translation_language().to_string();
    let batcher = TranslationBatcher::from_config(config)?.with_concurrency(dub_config.concurrency);

    check_ffmpeg()?;
    check_ffprobe()?;
    if outputs.video.is_some() && !has_video_stream(input)? {
        return Err(DubError::Container(format!(
            "{} has no video stream to attach the dub to",
            input.display()
        )));
    }

    let guard = TempCleanupGuard::new(cancelled.clone())?;
    let temp_path = guard.path();

    let multi_progress = dub_config.show_progress.then(MultiProgress::new);

    check_cancelled(&cancelled)?;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 1: Audio Extraction
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 1/6: Extracting audio from {:?}", input);
    let extraction_start = Instant::now();
    let pb = stage_spinner(multi_progress.as_ref(), "Extracting audio...");

    let asr_path = temp_path.join("asr.wav");
    let audio_metadata = extract_audio(input, &asr_path).await?;
    let track_path = temp_path.join("original.wav");
    extract_pcm_track(input, &track_path).await?;

    if let Some(pb) = pb {
        pb.finish_with_message(format!(
            "✓ Audio extracted ({:.1}s)",
            audio_metadata.duration.as_secs_f64()
        ));
    }
    let extraction_time = extraction_start.elapsed();

    check_cancelled(&cancelled)?;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 2: Transcription
    // ═══════════════════════════════════════════════════════════════════════
    info!(
        "Stage 2/6: Transcribing (concurrency: {})",
        dub_config.concurrency
    );
    let transcription_start = Instant::now();

    let regions = plan_chunks(audio_metadata.duration, &ChunkConfig::whisper());
    let chunks = create_chunks(&asr_path, &regions, &temp_path.join("chunks")).await?;
    info!("Created {} audio chunks", chunks.len());

    let transcriber = WhisperClient::new(required_key(&config.openai_api_key, "OPENAI_API_KEY")?.to_string())
        .with_language(source.to_string());
    let orchestrator = TranscriptionOrchestrator::new(Box::new(transcriber), dub_config.concurrency)
        .with_progress(dub_config.show_progress);
    let (transcript, transcription_stats) = orchestrator.process_chunks(chunks).await?;
    let transcription_time = transcription_start.elapsed();

    check_cancelled(&cancelled)?;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 3: Sentence Segmentation
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 3/6: Rebuilding sentences");
    let segment_count = transcript.segments.len();
    let sentences = Segmenter::new(Box::new(analyzer)).segment(&transcript.segments);
    info!(
        "{} sentences from {} segments",
        sentences.len(),
        segment_count
    );
    if sentences.is_empty() {
        warn!("No speech found; the dub track will be empty");
    }

    check_cancelled(&cancelled)?;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 4: Translation
    // ═══════════════════════════════════════════════════════════════════════
    info!(
        "Stage 4/6: Translating {} -> {} with {}",
        source,
        target,
        batcher.provider_names().join(", ")
    );
    let translation_start = Instant::now();
    let pb = stage_spinner(multi_progress.as_ref(), "Translating sentences...");

    let texts: Vec<String> = sentences.iter().map(|s| s.text.clone()).collect();
    let translations = batcher.translate(&texts, source, &target).await?;

    if let Some(pb) = pb {
        pb.finish_with_message(format!("✓ Translated {} sentences", translations.len()));
    }
    let translation_time = translation_start.elapsed();

    check_cancelled(&cancelled)?;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 5: Synthesis and Composition
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 5/6: Synthesizing and composing with voice {}", dub_config.voice);
    let composition_start = Instant::now();

    let original = read_wav(&track_path)?;
    let synthesizer = GoogleSynthesizer::new(required_key(&config.google_api_key, "GOOGLE_API_KEY")?.to_string())
        .with_speaking_rate(dub_config.speaking_rate)
        .with_sample_rate(original.sample_rate());
    let compositor = Compositor::new(Box::new(synthesizer), dub_config.voice.clone())
        .with_config(dub_config.compositor.clone())
        .with_concurrency(dub_config.concurrency)
        .with_progress(dub_config.show_progress);
    let (tracks, composition_stats) = compositor.compose(&sentences, &translations, original).await?;
    let composition_time = composition_start.elapsed();

    if composition_stats.overruns > 0 {
        warn!(
            "{} of {} dubbed sentences run past their original end (up to {} ms)",
            composition_stats.overruns, composition_stats.sentences, composition_stats.max_overrun_ms
        );
    }

    check_cancelled(&cancelled)?;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 6: Export
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 6/6: Writing outputs");
    let pb = stage_spinner(multi_progress.as_ref(), "Writing outputs...");

    let dub_tmp = temp_path.join("dub.wav");
    let ducked_tmp = temp_path.join("ducked.wav");
    export_wav(&tracks.dub_only, &dub_tmp)?;
    export_wav(&tracks.ducked, &ducked_tmp)?;

    let video_tmp = match outputs.video {
        Some(ref video) => {
            let extension = video.extension().and_then(|e| e.to_str()).unwrap_or("mp4");
            let path = temp_path.join(format!("dubbed.{extension}"));
            replace_audio_track(input, &ducked_tmp, &path).await?;
            Some(path)
        }
        None => None,
    };
    drop(tracks);

    check_cancelled(&cancelled)?;

    if let (Some(tmp), Some(to)) = (video_tmp, &outputs.video) {
        persist(&tmp, to)?;
    }
    if let Some(ref to) = outputs.dub_track {
        persist(&dub_tmp, to)?;
    }
    if let Some(ref to) = outputs.ducked_track {
        persist(&ducked_tmp, to)?;
    }

    if let Some(pb) = pb {
        pb.finish_with_message(format!("✓ Wrote {} file(s)", outputs.paths().len()));
    }

    let detected_language = transcript
        .language
        .filter(|lang| {
            let lang = lang.to_lowercase();
            lang != dub_config.source_language.name() && lang != source
        });

    let stats = DubStats {
        total_time: start_time.elapsed(),
        extraction_time,
        transcription_time,
        translation_time,
        composition_time,
        audio_duration: audio_metadata.duration,
        chunks_processed: transcription_stats.total_chunks,
        segments: segment_count,
        sentences: sentences.len(),
        overruns: composition_stats.overruns,
        max_overrun_ms: composition_stats.max_overrun_ms,
        translation_providers: batcher.provider_names(),
        voice: dub_config.voice.to_string(),
    };

    Ok(DubResult {
        outputs: outputs.clone(),
        sentences,
        translations,
        stats,
        detected_language,
    })
}

/// Print a summary of the dubbing results.
pub fn print_summary(result: &DubResult) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                         Dubbing Complete                      ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    for path in result.outputs.paths() {
        println!("  Output:     {}", path.display());
    }
    println!("  Sentences:  {}", result.stats.sentences);
    println!("  Voice:      {}", result.stats.voice);
    let translator = match result.stats.translation_providers.as_slice() {
        [primary, fallback] => format!("{primary} (fallback: {fallback})"),
        providers => providers.join(", "),
    };
    println!("  Translator: {}", translator);
    println!(
        "  Duration:   {:.1}s audio",
        result.stats.audio_duration.as_secs_f64()
    );
    println!();
    println!("  Timing:");
    println!(
        "    Extract:     {:.2}s",
        result.stats.extraction_time.as_secs_f64()
    );
    println!(
        "    Transcribe:  {:.2}s ({} chunks, {} segments)",
        result.stats.transcription_time.as_secs_f64(),
        result.stats.chunks_processed,
        result.stats.segments
    );
    println!(
        "    Translate:   {:.2}s",
        result.stats.translation_time.as_secs_f64()
    );
    println!(
        "    Compose:     {:.2}s",
        result.stats.composition_time.as_secs_f64()
    );
    println!(
        "    Total:       {:.2}s",
        result.stats.total_time.as_secs_f64()
    );
    if result.stats.overruns > 0 {
        println!();
        println!(
            "  Note: {} sentence(s) ran longer than the original, by up to {} ms",
            result.stats.overruns, result.stats.max_overrun_ms
        );
    }
    if let Some(ref lang) = result.detected_language {
        println!();
        println!("  Note: Detected language '{}' differs from specified", lang);
    }
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
