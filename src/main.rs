mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use cli::Cli;
use melex::audio::decode::decode_audio;
use melex::audio::stft::{stft, StftConfig};
use melex::diagnostics::dump_spectrogram;
use melex::pitch::extract_pitch_from;
use melex::{compile_notes, note_name, pairwise_transient_detection, write_midi};
use melex::{Note, PitchStrategy, TuningAdjustment};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let mut cfg = config::Config::default();
    if let Some(path) = cli.config.clone().or_else(config::find_config) {
        if let Some(loaded) = config::load_config(&path) {
            log::info!("Loaded config from {}", path.display());
            cfg = loaded;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    // Merge: config values apply only when CLI is at its default
    if cli.strategy == "bana" { cli.strategy = cfg.pitch.strategy.clone(); }
    if cli.window == 4096 { cli.window = cfg.pitch.window_size; }
    if cli.fft_size == 4096 { cli.fft_size = cfg.pitch.fft_size; }
    if cli.hop == 2048 { cli.hop = cfg.pitch.hop; }
    if cli.hps_overtones == 3 { cli.hps_overtones = cfg.pitch.hps_overtones; }

    let mut transient = cfg.transient;
    if cli.channels != 64 { transient.detection.num_channels = cli.channels; }
    if cli.min_freq != 80.0 { transient.detection.min_freq = cli.min_freq; }
    if cli.max_freq != 4000.0 { transient.detection.max_freq = cli.max_freq; }
    if cli.analysis_rate.is_some() { transient.analysis_rate = cli.analysis_rate; }
    if cli.keep_trailing_pair { transient.picking.drop_trailing_pair = false; }

    let mut note_config = cfg.notes;
    if let Some(mode) = &cli.tuning_adjustment {
        note_config.tuning_adjustment = parse_tuning_adjustment(mode)?;
    }

    let input = cli.input.as_ref().context("Input audio file is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    let strategy = PitchStrategy::from_name(&cli.strategy, cli.hps_overtones)?;
    let stft_config = StftConfig {
        window_size: cli.window,
        fft_size: cli.fft_size,
        hop: cli.hop,
    };
    stft_config.validate()?;

    log::info!("melex - monophonic melody extraction");
    log::info!("Input: {}", input.display());
    log::info!(
        "Strategy: {} (window {}, fft {}, hop {})",
        strategy.name(),
        stft_config.window_size,
        stft_config.fft_size,
        stft_config.hop
    );

    let pb = ProgressBar::new(4);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    // 1. Decode audio
    pb.set_message("decoding");
    let audio = decode_audio(input)?;
    pb.inc(1);

    // 2. Note boundaries
    pb.set_message("transients");
    let transients = pairwise_transient_detection(&audio, &transient)
        .context("Transient detection failed")?;
    pb.inc(1);

    // 3. Pitch track
    pb.set_message("pitch");
    let spectrogram = stft(&audio.samples, audio.sample_rate, &stft_config)?;
    if let Some(prefix) = &cli.dump_spectrogram {
        dump_spectrogram(&spectrogram, prefix)?;
    }
    let track = extract_pitch_from(&spectrogram, audio.sample_rate, &stft_config, &strategy)
        .context("Pitch extraction failed")?;
    pb.inc(1);

    // 4. Notes
    pb.set_message("notes");
    let notes = compile_notes(&transients, &track, &note_config)?;
    pb.inc(1);
    pb.finish_with_message("done");

    match &cli.output {
        Some(path) => {
            let json = serde_json::to_string_pretty(&notes)?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote {} notes to {}", notes.len(), path.display());
        }
        None => print_table(&notes),
    }
    if let Some(path) = &cli.midi {
        write_midi(&notes, audio.sample_rate, path, &cfg.midi)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(())
}

fn parse_tuning_adjustment(name: &str) -> Result<TuningAdjustment> {
    match name.to_ascii_lowercase().as_str() {
        "off" => Ok(TuningAdjustment::Off),
        "thresholded" => Ok(TuningAdjustment::Thresholded),
        "always" => Ok(TuningAdjustment::Always),
        other => anyhow::bail!("Unknown tuning adjustment '{}' (off, thresholded, always)", other),
    }
}

fn print_table(notes: &[Note]) {
    println!("{:>9} {:>9} {:>10} {:>5}", "onset", "offset", "freq (Hz)", "note");
    for note in notes {
        let name = note.midi.map(note_name).unwrap_or_else(|| "-".into());
        println!(
            "{:>9.3} {:>9.3} {:>10.2} {:>5}",
            note.onset_time, note.offset_time, note.frequency, name
        );
    }
}
