use rayon::prelude::*;
use serde::Deserialize;

use super::correntropy::{accumulate_psm, required_length};
use super::gammatone::{central_frequencies, filter, FilterMode};
use super::sigma::{roll_sigma, SILVERMAN_FACTOR};
use crate::audio::buffer::validate_samples;
use crate::error::{MelexError, Result};

/// Filterbank and correntropy settings. Optional sizes are in samples and
/// default to fractions of the sample rate.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub num_channels: usize,
    pub min_freq: f32,
    pub max_freq: f32,
    pub correntropy_win_size: Option<usize>,
    pub interval: Option<usize>,
    pub sig_window_size: Option<usize>,
    pub scale_factor: f32,
    pub filter_mode: FilterMode,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            num_channels: 64,
            min_freq: 80.0,
            max_freq: 4000.0,
            correntropy_win_size: None,
            interval: None,
            sig_window_size: None,
            scale_factor: SILVERMAN_FACTOR,
            filter_mode: FilterMode::Fast,
        }
    }
}

/// Window sizes after applying the sample-rate defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedSizes {
    pub correntropy_win_size: usize,
    pub interval: usize,
    pub sig_window_size: usize,
}

impl DetectionConfig {
    pub fn resolve(&self, sample_rate: u32) -> Result<ResolvedSizes> {
        let sr = sample_rate as usize;
        let sizes = ResolvedSizes {
            correntropy_win_size: self.correntropy_win_size.unwrap_or(sr / 80),
            interval: self.interval.unwrap_or(sr / 200),
            sig_window_size: self.sig_window_size.unwrap_or(7 * sr),
        };
        if sizes.correntropy_win_size == 0 || sizes.interval == 0 || sizes.sig_window_size == 0 {
            return Err(MelexError::invalid(format!(
                "window sizes must be positive at {}Hz: {:?}",
                sample_rate, sizes
            )));
        }
        Ok(sizes)
    }
}

/// First difference of the pooled summary, one value per hop of `interval` samples.
#[derive(Clone, Debug)]
pub struct DetectionFunction {
    pub values: Vec<f32>,
    pub interval: usize,
}

/// Number of correntropy evaluation points for `len` samples.
pub fn num_windows(len: usize, corr_win_size: usize, interval: usize) -> usize {
    (len - corr_win_size).div_ceil(interval) + 1
}

fn channel_psm(
    audio: &[f32],
    sample_rate: u32,
    center_freq: f32,
    config: &DetectionConfig,
    sizes: &ResolvedSizes,
    windows: usize,
    padded_len: usize,
) -> Result<Vec<f32>> {
    let mut filtered = filter(audio, sample_rate, center_freq, config.filter_mode)?;
    let mut sigmas = roll_sigma(
        &filtered,
        sizes.correntropy_win_size / 2,
        sizes.interval,
        sizes.sig_window_size,
        Some(windows),
        config.scale_factor,
    )?;
    // the last windows may fall past the sigma bound; reuse the final estimate
    let last = sigmas.last().copied().unwrap_or(0.0);
    sigmas.resize(windows, last);

    filtered.resize(padded_len, 0.0);
    let mut psm = crate::error::zeroed(windows)?;
    accumulate_psm(
        sizes.correntropy_win_size,
        sizes.interval,
        windows,
        &filtered,
        &sigmas,
        &mut psm,
    )?;
    log::debug!(
        "Channel {:.1}Hz: sigma range {:.3e}..{:.3e}",
        center_freq,
        sigmas.iter().copied().fold(f32::INFINITY, f32::min),
        sigmas.iter().copied().fold(0.0f32, f32::max)
    );
    Ok(psm)
}

/// Filterbank, rolling sigma and correntropy over every channel, pooled and
/// differenced into a detection function.
pub fn compute_detection_function(
    audio: &[f32],
    sample_rate: u32,
    config: &DetectionConfig,
) -> Result<DetectionFunction> {
    if sample_rate == 0 {
        return Err(MelexError::invalid("sample rate must be positive"));
    }
    let sizes = config.resolve(sample_rate)?;
    validate_samples(audio)?;
    if audio.len() <= sizes.correntropy_win_size {
        return Err(MelexError::invalid(format!(
            "audio of {} samples is shorter than the correntropy window ({})",
            audio.len(),
            sizes.correntropy_win_size
        )));
    }
    let channels = central_frequencies(config.num_channels, config.min_freq, config.max_freq)?;

    let windows = num_windows(audio.len(), sizes.correntropy_win_size, sizes.interval);
    let padded_len = audio
        .len()
        .max(required_length(sizes.correntropy_win_size, sizes.interval, windows));

    log::info!(
        "Detection function: {} channels ({:.0}-{:.0}Hz), {} windows, corr={} hop={} sigma={}",
        channels.len(),
        config.min_freq,
        config.max_freq,
        windows,
        sizes.correntropy_win_size,
        sizes.interval,
        sizes.sig_window_size
    );

    let contributions: Vec<Vec<f32>> = channels
        .par_iter()
        .map(|&cf| channel_psm(audio, sample_rate, cf, config, &sizes, windows, padded_len))
        .collect::<Result<_>>()?;

    // summed in channel order so results do not depend on scheduling
    let mut pooled = crate::error::zeroed(windows)?;
    for psm in &contributions {
        for (p, v) in pooled.iter_mut().zip(psm) {
            *p += v;
        }
    }

    let values = pooled.windows(2).map(|w| w[1] - w[0]).collect();
    Ok(DetectionFunction {
        values,
        interval: sizes.interval,
    })
}
