use anyhow::{Context, Result};
use autodub::audio::has_video_stream;
use autodub::interactive::run_interactive_wizard;
use autodub::{dub_video_with_cancel, print_summary, Config, DubConfig, DubOutputs, Language, Voice};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "autodub")]
#[command(version, about = "Automatic video dubbing using AI")]
#[command(
    long_about = "Dub a video into another language: transcribe with OpenAI Whisper, translate with Gemini or Google Translate, and speak the translation with Google Text-to-Speech, keeping each sentence in sync with the original speaker."
)]
struct Cli {
    /// Input video/audio file (omit to start the interactive wizard)
    input: Option<PathBuf>,

    /// Text-to-Speech voice, e.g. es-US-Neural2-B. Decides the target language.
    #[arg(long)]
    voice: Option<String>,

    /// Language spoken in the input (name or ISO code)
    #[arg(short = 'l', long)]
    source_language: Option<String>,

    /// Output video (defaults to <input>_dubbed.<ext> for video inputs)
    #[arg(short, long)]
    output_video: Option<PathBuf>,

    /// Dub-only track (defaults to <input>_dub.wav)
    #[arg(long)]
    dub_track: Option<PathBuf>,

    /// Ducked mix of original and dub (defaults to <input>_ducked.wav)
    #[arg(long)]
    ducked_track: Option<PathBuf>,

    /// Number of concurrent API requests
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Text-to-Speech speaking rate (1.0 is normal speed)
    #[arg(long)]
    speaking_rate: Option<f32>,

    /// Gain applied to the original audio under the dub, in dB
    #[arg(long, allow_hyphen_values = true)]
    duck_gain: Option<f32>,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,

    /// Run the interactive wizard
    #[arg(short, long)]
    interactive: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// Default outputs next to the input, overridden by any explicit flag.
fn derive_outputs(input: &Path, has_video: bool, cli: &Cli) -> DubOutputs {
    let mut outputs = DubOutputs::beside(input, has_video);
    if let Some(ref path) = cli.output_video {
        outputs.video = Some(path.clone());
    }
    if let Some(ref path) = cli.dub_track {
        outputs.dub_track = Some(path.clone());
    }
    if let Some(ref path) = cli.ducked_track {
        outputs.ducked_track = Some(path.clone());
    }
    outputs
}

fn install_ctrlc_handler() -> Arc<AtomicBool> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("\nCancelling after the current stage... (press Ctrl+C again to abort)");
    }) {
        warn!("Could not install Ctrl+C handler: {}", e);
    }
    cancelled
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let (input, outputs, config, mut dub_config) = if cli.interactive || cli.input.is_none() {
        let result = run_interactive_wizard()?;
        (result.input, result.outputs, result.config, result.dub_config)
    } else {
        let input = cli.input.clone().unwrap_or_default();

        // Validate input file exists
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }

        let config = Config::load().context("Failed to load configuration")?;

        let language: Language = cli
            .source_language
            .as_deref()
            .unwrap_or(&config.default_source_language)
            .parse()
            .context("Invalid source language")?;
        let voice: Voice = cli
            .voice
            .as_deref()
            .unwrap_or(&config.default_voice)
            .parse()
            .context("Invalid voice")?;

        let has_video = has_video_stream(&input).unwrap_or(false);
        let outputs = derive_outputs(&input, has_video, &cli);

        let mut dub_config = DubConfig::new(language, voice);
        dub_config.concurrency = config.concurrency;
        (input, outputs, config, dub_config)
    };

    if let Some(concurrency) = cli.concurrency {
        dub_config.concurrency = concurrency;
    }
    if let Some(rate) = cli.speaking_rate {
        if !(0.25..=4.0).contains(&rate) {
            anyhow::bail!("Speaking rate must be between 0.25 and 4.0, got {}", rate);
        }
        dub_config.speaking_rate = rate;
    }
    if let Some(gain) = cli.duck_gain {
        dub_config.compositor.duck_gain_db = gain;
    }
    dub_config.show_progress = !cli.no_progress;

    info!("Input:    {}", input.display());
    for path in outputs.paths() {
        info!("Output:   {}", path.display());
    }
    info!("Language: {}", dub_config.source_language);
    info!("Voice:    {}", dub_config.voice);

    let cancelled = install_ctrlc_handler();
    let result = dub_video_with_cancel(&input, &outputs, &config, dub_config, cancelled)
        .await
        .context("Dubbing failed")?;

    print_summary(&result);

    Ok(())
}
