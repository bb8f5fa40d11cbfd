use crate::config::Config;
use crate::language::{Language, SUPPORTED_LANGUAGES};
use crate::pipeline::{DubConfig, DubOutputs};
use crate::synthesize::{Voice, VOICE_PRESETS};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::fs;
use std::path::{Path, PathBuf};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "webm"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "m4a", "ogg", "aac"];

pub struct InteractiveResult {
    pub input: PathBuf,
    pub outputs: DubOutputs,
    pub config: Config,
    pub dub_config: DubConfig,
}

pub fn run_interactive_wizard() -> anyhow::Result<InteractiveResult> {
    print_header();

    // Step 1: Check/Setup API keys
    let config = setup_api_keys()?;

    // Step 2: Select source file
    let input = select_source_file()?;

    // Step 3: Select source language
    let language = select_language(&config)?;

    // Step 4: Select voice (and with it the target language)
    let voice = select_voice(&config)?;

    let outputs = DubOutputs::beside(&input, is_video(&input));

    // Step 5: Confirm
    print_summary(&input, &outputs, language, &voice);

    if !Confirm::new()
        .with_prompt("Proceed with these settings?")
        .default(true)
        .interact()?
    {
        anyhow::bail!("Cancelled by user");
    }

    println!();

    let mut dub_config = DubConfig::new(language, voice);
    dub_config.concurrency = config.concurrency;

    Ok(InteractiveResult {
        input,
        outputs,
        config,
        dub_config,
    })
}

fn print_header() {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║            autodub - AI Video Dubbing             ║").cyan()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════════════════╝").cyan()
    );
    println!();
}

fn setup_api_keys() -> anyhow::Result<Config> {
    let mut config = Config::load().unwrap_or_default();
    let mut changed = false;

    changed |= ask_key(
        &mut config.openai_api_key,
        "OpenAI",
        "https://platform.openai.com/api-keys",
        true,
    )?;
    changed |= ask_key(
        &mut config.google_api_key,
        "Google Cloud",
        "https://console.cloud.google.com/apis/credentials",
        true,
    )?;
    changed |= ask_key(
        &mut config.gemini_api_key,
        "Gemini",
        "https://aistudio.google.com/apikey",
        false,
    )?;

    if changed
        && Confirm::new()
            .with_prompt("Save API keys to config file?")
            .default(true)
            .interact()?
    {
        save_config(&config)?;
        println!("{} API keys saved to config\n", style("✓").green());
    }

    Ok(config)
}

/// Prompt for a missing key. Returns whether the key was entered.
fn ask_key(slot: &mut Option<String>, service: &str, url: &str, required: bool) -> anyhow::Result<bool> {
    if slot.is_some() {
        println!("{} {} API key configured", style("✓").green(), service);
        return Ok(false);
    }

    println!("{} {} API key not found", style("!").yellow(), service);
    println!("  Get one at: {}\n", url);

    let prompt = if required {
        format!("Enter your {} API key", service)
    } else {
        format!("Enter your {} API key (leave empty to skip)", service)
    };
    let api_key: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(!required)
        .interact_text()?;

    let api_key = api_key.trim();
    if api_key.is_empty() {
        if required {
            anyhow::bail!("{} API key is required", service);
        }
        return Ok(false);
    }

    *slot = Some(api_key.to_string());
    Ok(true)
}

fn save_config(config: &Config) -> anyhow::Result<()> {
    if let Some(config_path) = Config::config_file_path() {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml_content = toml::to_string_pretty(config)?;
        fs::write(config_path, toml_content)?;
    }
    Ok(())
}

fn is_video(path: &Path) -> bool {
    has_extension(path, VIDEO_EXTENSIONS)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn select_source_file() -> anyhow::Result<PathBuf> {
    println!("\n{}", style("Select source file:").bold());

    let files = scan_media_files(".")?;

    if files.is_empty() {
        println!("  No media files found in current directory.\n");
        return ask_path();
    }

    let mut items: Vec<String> = files
        .iter()
        .map(|f| {
            let size = fs::metadata(f)
                .map(|m| format_size(m.len()))
                .unwrap_or_else(|_| "?".to_string());
            format!("{} ({})", f.display(), size)
        })
        .collect();
    items.push("Enter custom path...".to_string());

    let selection = Select::new()
        .with_prompt("Choose a file")
        .items(&items)
        .default(0)
        .interact()?;

    if selection == files.len() {
        ask_path()
    } else {
        Ok(files[selection].clone())
    }
}

fn ask_path() -> anyhow::Result<PathBuf> {
    let path: String = Input::new()
        .with_prompt("Enter file path")
        .interact_text()?;
    let path = PathBuf::from(path.trim());
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    Ok(path)
}

fn scan_media_files(dir: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file()
            && (has_extension(&path, VIDEO_EXTENSIONS) || has_extension(&path, AUDIO_EXTENSIONS))
        {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn select_language(config: &Config) -> anyhow::Result<Language> {
    let default = config
        .default_source_language
        .parse::<Language>()
        .ok()
        .and_then(|lang| SUPPORTED_LANGUAGES.iter().position(|l| *l == lang))
        .unwrap_or(0);

    let items: Vec<String> = SUPPORTED_LANGUAGES
        .iter()
        .map(|lang| format!("{} ({})", capitalize(lang.name()), lang.iso_code()))
        .collect();

    let selection = Select::new()
        .with_prompt("Select source language")
        .items(&items)
        .default(default)
        .interact()?;

    Ok(SUPPORTED_LANGUAGES[selection])
}

fn select_voice(config: &Config) -> anyhow::Result<Voice> {
    let default = VOICE_PRESETS
        .iter()
        .position(|(_, name)| *name == config.default_voice)
        .unwrap_or(0);

    let mut items: Vec<String> = VOICE_PRESETS
        .iter()
        .map(|(language, name)| format!("{} - {}", language, name))
        .collect();
    items.push("Other (enter voice name)...".to_string());

    let selection = Select::new()
        .with_prompt("Select dubbing voice")
        .items(&items)
        .default(default)
        .interact()?;

    let name = if selection == VOICE_PRESETS.len() {
        let name: String = Input::new()
            .with_prompt("Enter voice name (e.g., 'pt-BR-Neural2-B')")
            .interact_text()?;
        name
    } else {
        VOICE_PRESETS[selection].1.to_string()
    };

    Ok(name.parse()?)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn print_summary(input: &Path, outputs: &DubOutputs, language: Language, voice: &Voice) {
    println!("\n{}", style("═══ Summary ═══").bold());
    println!("  Input:     {}", style(input.display()).cyan());
    for path in outputs.paths() {
        println!("  Output:    {}", style(path.display()).cyan());
    }
    println!("  Language:  {}", capitalize(language.name()));
    println!(
        "  Dub into:  {} with {}",
        voice.translation_language(),
        style(voice).cyan()
    );
    println!();
}
