//! Note boundary detection: gammatone filterbank, correntropy pooling and
//! alternating peak picking.

pub mod correntropy;
pub mod detection;
pub mod gammatone;
pub mod picking;
pub mod sigma;

use serde::Deserialize;
use std::borrow::Cow;

use crate::audio::resample::resample_buffer;
use crate::audio::AudioBuffer;
use crate::error::Result;

pub use detection::{compute_detection_function, DetectionConfig, DetectionFunction};
pub use picking::{detect_transients, detect_transients_with, PickingConfig};

/// Everything the boundary pipeline needs.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TransientConfig {
    #[serde(flatten)]
    pub detection: DetectionConfig,
    #[serde(flatten)]
    pub picking: PickingConfig,
    /// Run the filterbank at this rate instead of the input rate.
    pub analysis_rate: Option<u32>,
}

/// Silence added around the analysed audio so notes touching either end of
/// the buffer still show a boundary. At least a tenth of a second, and long
/// enough for the scan's closing pair.
fn context_padding(sample_rate: u32, corr_win_size: usize, interval: usize) -> usize {
    (sample_rate as usize / 10).max(2 * corr_win_size + 16 * interval)
}

/// Onset/offset sample indices of `audio`, alternating and strictly increasing.
///
/// The audio is analysed between two stretches of silence. The final pair the
/// scan closes over the trailing silence is the one `drop_trailing_pair`
/// removes; when it is kept, its indices lie past the end of `audio`.
pub fn pairwise_transient_detection(
    audio: &AudioBuffer,
    config: &TransientConfig,
) -> Result<Vec<usize>> {
    audio.validate()?;

    let analysed = match config.analysis_rate {
        Some(rate) if rate != audio.sample_rate => {
            let mut resampled = resample_buffer(audio, rate)?;
            // sinc ringing can overshoot full scale slightly
            for s in resampled.samples.iter_mut() {
                *s = s.clamp(-1.0, 1.0);
            }
            Cow::Owned(resampled)
        }
        _ => Cow::Borrowed(audio),
    };

    let sizes = config.detection.resolve(analysed.sample_rate)?;
    let pad = context_padding(analysed.sample_rate, sizes.correntropy_win_size, sizes.interval);
    let mut padded = crate::error::zeroed(analysed.samples.len() + 2 * pad)?;
    padded[pad..pad + analysed.samples.len()].copy_from_slice(&analysed.samples);

    let det = compute_detection_function(&padded, analysed.sample_rate, &config.detection)?;
    let picks = detect_transients_with(&det.values, &config.picking)?;

    let scale = audio.sample_rate as f64 / analysed.sample_rate as f64;
    let mut transients: Vec<usize> = Vec::with_capacity(picks.len());
    for idx in picks {
        let unpadded = (idx * det.interval).saturating_sub(pad);
        let mut sample = (unpadded as f64 * scale).round() as usize;
        if let Some(&prev) = transients.last() {
            sample = sample.max(prev + 1);
        }
        transients.push(sample);
    }

    log::info!(
        "Detected {} notes from {} transients",
        transients.len() / 2,
        transients.len()
    );
    Ok(transients)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_reads_flat_toml() {
        let cfg: TransientConfig = toml::from_str(
            r#"
            num_channels = 32
            max_freq = 3000.0
            filter_mode = "reference"
            drop_trailing_pair = false
            local_window = 5
            analysis_rate = 11025
            "#,
        )
        .unwrap();
        assert_eq!(cfg.detection.num_channels, 32);
        assert_eq!(cfg.detection.max_freq, 3000.0);
        assert_eq!(cfg.detection.min_freq, 80.0);
        assert_eq!(cfg.detection.filter_mode, gammatone::FilterMode::Reference);
        assert!(!cfg.picking.drop_trailing_pair);
        assert_eq!(cfg.picking.local_window, 5);
        assert_eq!(cfg.analysis_rate, Some(11025));
    }

    #[test]
    fn silence_has_no_transients() {
        let audio = AudioBuffer::new(vec![0.0; 4000], 8000);
        let cfg = TransientConfig {
            detection: DetectionConfig {
                num_channels: 4,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(pairwise_transient_detection(&audio, &cfg).unwrap().is_empty());
    }

    #[test]
    fn padding_covers_the_correntropy_reach() {
        // 16kHz defaults: 200-sample windows, 80-sample hops
        assert_eq!(context_padding(16000, 200, 80), 1680);
        assert_eq!(context_padding(8000, 10, 2), 800);
    }

    #[test]
    fn note_at_the_very_start_keeps_its_onset() {
        let rate = 8000;
        let mut samples: Vec<f32> = (0..rate as usize / 2)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 300.0 * i as f32 / rate as f32).sin())
            .collect();
        samples.extend(std::iter::repeat(0.0).take(rate as usize * 3 / 10));
        let audio = AudioBuffer::new(samples, rate);
        let cfg = TransientConfig {
            detection: DetectionConfig {
                num_channels: 8,
                max_freq: 3000.0,
                ..Default::default()
            },
            ..Default::default()
        };

        let transients = pairwise_transient_detection(&audio, &cfg).unwrap();
        assert_eq!(transients.len(), 2, "{:?}", transients);
        assert!(transients[0] <= 400, "{:?}", transients);
        assert!(transients[1].abs_diff(4000) <= 400, "{:?}", transients);
    }
}
