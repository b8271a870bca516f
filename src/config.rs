use serde::Deserialize;
use std::path::{Path, PathBuf};

use melex::{MidiConfig, NoteConfig, TransientConfig};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transient: TransientConfig,
    #[serde(default)]
    pub pitch: PitchConfig,
    #[serde(default)]
    pub notes: NoteConfig,
    #[serde(default)]
    pub midi: MidiConfig,
}

#[derive(Debug, Deserialize)]
pub struct PitchConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_hop")]
    pub hop: usize,
    #[serde(default = "default_hps_overtones")]
    pub hps_overtones: usize,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            window_size: default_window_size(),
            fft_size: default_fft_size(),
            hop: default_hop(),
            hps_overtones: default_hps_overtones(),
        }
    }
}

fn default_strategy() -> String { "bana".into() }
fn default_window_size() -> usize { 4096 }
fn default_fft_size() -> usize { 4096 }
fn default_hop() -> usize { 2048 }
fn default_hps_overtones() -> usize { 3 }

/// First existing config file: `./melex.toml`, then the per-user locations.
pub fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("melex.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("melex").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("melex").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::debug!("{}: {}", path.display(), e);
            None
        }
    }
}
