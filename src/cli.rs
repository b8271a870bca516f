use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "melex", about = "Extract the melody of a monophonic recording as notes")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG, AAC)
    pub input: Option<PathBuf>,

    /// Write notes as JSON here instead of printing a table
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pitch strategy: hps, bana or bana_music
    #[arg(short, long, default_value = "bana")]
    pub strategy: String,

    /// STFT window length in samples
    #[arg(long, default_value_t = 4096)]
    pub window: usize,

    /// FFT length in samples (zero-padded, at least the window length)
    #[arg(long, default_value_t = 4096)]
    pub fft_size: usize,

    /// STFT hop in samples
    #[arg(long, default_value_t = 2048)]
    pub hop: usize,

    /// Overtones multiplied by the hps strategy
    #[arg(long, default_value_t = 3)]
    pub hps_overtones: usize,

    /// Gammatone channels used for note boundaries
    #[arg(long, default_value_t = 64)]
    pub channels: usize,

    /// Lowest gammatone centre frequency in Hz
    #[arg(long, default_value_t = 80.0)]
    pub min_freq: f32,

    /// Highest gammatone centre frequency in Hz
    #[arg(long, default_value_t = 4000.0)]
    pub max_freq: f32,

    /// Resample to this rate before boundary detection
    #[arg(long)]
    pub analysis_rate: Option<u32>,

    /// Keep the final onset/offset pair instead of discarding it
    #[arg(long)]
    pub keep_trailing_pair: bool,

    /// Also write the notes as a Standard MIDI File
    #[arg(long, value_name = "PATH")]
    pub midi: Option<PathBuf>,

    /// Tuning correction before rounding to MIDI: off, thresholded or always
    #[arg(long)]
    pub tuning_adjustment: Option<String>,

    /// Dump the magnitude spectrogram to PREFIX.bin and PREFIX.json
    #[arg(long, value_name = "PREFIX")]
    pub dump_spectrogram: Option<PathBuf>,

    /// Config file (defaults to ./melex.toml or the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
