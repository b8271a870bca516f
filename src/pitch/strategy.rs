use std::fmt;
use std::sync::Arc;

use super::bana::{find_candidates, BanaParams, SMOOTH_HZ};
use super::hps::hps_detect;
use super::selection::select_candidates;
use crate::audio::stft::Spectrogram;
use crate::error::{MelexError, Result};

/// Window and sizing metadata handed to every strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrategyContext {
    pub sample_rate: u32,
    pub window_size: usize,
    pub fft_size: usize,
    pub hop: usize,
}

/// User pitch detector: fills one value per window (`NaN` for no pitch) and
/// returns 0 on success.
pub type PitchCallback = dyn Fn(&Spectrogram, &StrategyContext, &mut [f32]) -> i32 + Send + Sync;

#[derive(Clone)]
pub enum PitchStrategy {
    Hps { overtones: usize },
    BanaGeneral,
    BanaMusic,
    Custom(Arc<PitchCallback>),
}

impl fmt::Debug for PitchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hps { overtones } => f.debug_struct("Hps").field("overtones", overtones).finish(),
            Self::BanaGeneral => f.write_str("BanaGeneral"),
            Self::BanaMusic => f.write_str("BanaMusic"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl PitchStrategy {
    /// Resolve a strategy by name: `hps`, `bana` (or `pitch`), `bana_music` (or `music`).
    pub fn from_name(name: &str, hps_overtones: usize) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "hps" => Ok(Self::Hps {
                overtones: hps_overtones,
            }),
            "bana" | "pitch" => Ok(Self::BanaGeneral),
            "bana_music" | "music" => Ok(Self::BanaMusic),
            other => Err(MelexError::invalid(format!(
                "unknown pitch strategy '{}' (expected hps, bana or bana_music)",
                other
            ))),
        }
    }

    pub fn custom<F>(callback: F) -> Self
    where
        F: Fn(&Spectrogram, &StrategyContext, &mut [f32]) -> i32 + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(callback))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hps { .. } => "hps",
            Self::BanaGeneral => "bana",
            Self::BanaMusic => "bana_music",
            Self::Custom(_) => "custom",
        }
    }

    /// Fill `pitches` with one fundamental per spectrogram window.
    pub fn detect(
        &self,
        spectrogram: &Spectrogram,
        context: &StrategyContext,
        pitches: &mut [f32],
    ) -> Result<()> {
        if pitches.len() != spectrogram.num_windows() {
            return Err(MelexError::invalid(format!(
                "pitch buffer holds {} values for {} windows",
                pitches.len(),
                spectrogram.num_windows()
            )));
        }

        match self {
            Self::Hps { overtones } => hps_detect(spectrogram, *overtones, pitches),
            Self::BanaGeneral | Self::BanaMusic => {
                let smooth = spectrogram.bins_for_hz(SMOOTH_HZ);
                let params = if matches!(self, Self::BanaMusic) {
                    BanaParams::music(smooth)
                } else {
                    BanaParams::general(smooth)
                };
                bana_detect(spectrogram, &params, pitches)
            }
            Self::Custom(callback) => match callback(spectrogram, context, pitches) {
                0 => Ok(()),
                status => Err(MelexError::processing("custom pitch strategy", status)),
            },
        }
    }
}

fn bana_detect(spectrogram: &Spectrogram, params: &BanaParams, pitches: &mut [f32]) -> Result<()> {
    let upper = params.f0_max * params.harmonics as f32;
    let limited = spectrogram.band_limited(params.f0_min, upper);
    let mut candidates = find_candidates(&limited, params)?;
    let selected = select_candidates(&mut candidates);
    pitches.copy_from_slice(&selected);
    Ok(())
}
