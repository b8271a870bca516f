//! Per-window fundamental frequency estimation.

pub mod bana;
pub mod candidates;
pub mod hps;
pub mod peaks;
pub mod selection;
pub mod strategy;

use serde::Serialize;

use crate::audio::stft::{stft, Spectrogram, StftConfig};
use crate::audio::AudioBuffer;
use crate::error::Result;

pub use bana::{find_candidates, BanaParams};
pub use candidates::{Candidate, NestedCandidates};
pub use selection::select_candidates;
pub use strategy::{PitchCallback, PitchStrategy, StrategyContext};

/// One pitch value per STFT window; `NaN` where no pitch was found.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PitchTrack {
    pub pitches: Vec<f32>,
    pub hop: usize,
    pub window_size: usize,
    pub sample_rate: u32,
}

impl PitchTrack {
    /// Sample index at the centre of window `index`.
    pub fn window_center(&self, index: usize) -> usize {
        index * self.hop + self.window_size / 2
    }

    pub fn len(&self) -> usize {
        self.pitches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }
}

/// Run the STFT over `audio` and estimate one pitch per window.
pub fn extract_pitch(
    audio: &AudioBuffer,
    config: &StftConfig,
    strategy: &PitchStrategy,
) -> Result<PitchTrack> {
    let spectrogram = stft(&audio.samples, audio.sample_rate, config)?;
    extract_pitch_from(&spectrogram, audio.sample_rate, config, strategy)
}

/// Same as [`extract_pitch`] for a spectrogram that is already computed.
pub fn extract_pitch_from(
    spectrogram: &Spectrogram,
    sample_rate: u32,
    config: &StftConfig,
    strategy: &PitchStrategy,
) -> Result<PitchTrack> {
    let context = StrategyContext {
        sample_rate,
        window_size: config.window_size,
        fft_size: config.fft_size,
        hop: config.hop,
    };

    let mut pitches = crate::error::zeroed(spectrogram.num_windows())?;
    strategy.detect(spectrogram, &context, &mut pitches)?;

    let voiced = pitches.iter().filter(|p| !p.is_nan()).count();
    log::info!(
        "Pitch ({}): {}/{} windows voiced",
        strategy.name(),
        voiced,
        pitches.len()
    );

    Ok(PitchTrack {
        pitches,
        hop: config.hop,
        window_size: config.window_size,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(freq: f32, rate: u32, seconds: f32) -> AudioBuffer {
        let n = (rate as f32 * seconds) as usize;
        let samples = (0..n)
            .map(|i| {
                let t = i as f32 / rate as f32;
                (1..=4)
                    .map(|h| 0.4 / h as f32 * (2.0 * PI * freq * h as f32 * t).sin())
                    .sum()
            })
            .collect();
        AudioBuffer::new(samples, rate)
    }

    #[test]
    fn hps_tracks_a_harmonic_tone() {
        let audio = tone(220.0, 8000, 1.0);
        let config = StftConfig {
            window_size: 2048,
            fft_size: 4096,
            hop: 1024,
        };
        let track = extract_pitch(&audio, &config, &PitchStrategy::Hps { overtones: 2 }).unwrap();
        assert_eq!(track.len(), config.num_windows(audio.samples.len()));
        let width = 8000.0 / 4096.0;
        for p in &track.pitches {
            assert!((p - 220.0).abs() <= 2.0 * width, "{}", p);
        }
    }

    #[test]
    fn bana_tracks_a_harmonic_tone() {
        let audio = tone(196.0, 8000, 1.0);
        let config = StftConfig {
            window_size: 2048,
            fft_size: 4096,
            hop: 1024,
        };
        let track = extract_pitch(&audio, &config, &PitchStrategy::BanaGeneral).unwrap();
        let width = 8000.0 / 4096.0;
        let voiced: Vec<f32> = track.pitches.iter().copied().filter(|p| !p.is_nan()).collect();
        assert!(!voiced.is_empty());
        for p in voiced {
            assert!((p - 196.0).abs() <= 2.0 * width, "{}", p);
        }
    }

    #[test]
    fn window_centres_follow_hop() {
        let track = PitchTrack {
            pitches: vec![f32::NAN; 3],
            hop: 100,
            window_size: 400,
            sample_rate: 8000,
        };
        assert_eq!(track.window_center(0), 200);
        assert_eq!(track.window_center(2), 400);
    }
}
