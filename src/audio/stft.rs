use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::Deserialize;

use crate::error::{MelexError, Result, STATUS_NON_FINITE};

/// Framing of the short-time transform. `fft_size` may exceed `window_size`,
/// in which case each frame is zero-padded.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct StftConfig {
    pub window_size: usize,
    pub fft_size: usize,
    pub hop: usize,
}

impl Default for StftConfig {
    fn default() -> Self {
        Self {
            window_size: 4096,
            fft_size: 4096,
            hop: 2048,
        }
    }
}

impl StftConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.hop == 0 {
            return Err(MelexError::invalid("STFT window size and hop must be positive"));
        }
        if self.fft_size < self.window_size {
            return Err(MelexError::invalid(format!(
                "FFT size {} is smaller than the window size {}",
                self.fft_size, self.window_size
            )));
        }
        Ok(())
    }

    /// Number of frames needed to cover `len` samples.
    pub fn num_windows(&self, len: usize) -> usize {
        if len <= self.window_size {
            return 1;
        }
        (len - self.window_size).div_ceil(self.hop) + 1
    }
}

/// Row-major magnitude spectra sharing one frequency axis.
#[derive(Clone, Debug)]
pub struct Spectrogram {
    data: Vec<f32>,
    num_bins: usize,
    frequencies: Vec<f32>,
}

impl Spectrogram {
    pub fn new(data: Vec<f32>, num_bins: usize, frequencies: Vec<f32>) -> Result<Self> {
        if num_bins == 0 {
            return Err(MelexError::invalid("spectrogram needs at least one bin"));
        }
        if data.len() % num_bins != 0 {
            return Err(MelexError::invalid(format!(
                "{} magnitudes do not divide into rows of {} bins",
                data.len(),
                num_bins
            )));
        }
        if frequencies.len() != num_bins {
            return Err(MelexError::invalid(format!(
                "frequency axis has {} entries for {} bins",
                frequencies.len(),
                num_bins
            )));
        }
        if frequencies.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return Err(MelexError::invalid("frequency axis must be finite and non-negative"));
        }
        if data.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(MelexError::invalid("magnitudes must be finite and non-negative"));
        }
        Ok(Self {
            data,
            num_bins,
            frequencies,
        })
    }

    pub fn num_windows(&self) -> usize {
        self.data.len() / self.num_bins
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn frequencies(&self) -> &[f32] {
        &self.frequencies
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, window: usize) -> &[f32] {
        &self.data[window * self.num_bins..(window + 1) * self.num_bins]
    }

    pub fn rows(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.num_bins)
    }

    /// Spacing between adjacent bins in Hz (0 for a single-bin axis).
    pub fn bin_width(&self) -> f32 {
        if self.num_bins < 2 {
            return 0.0;
        }
        (self.frequencies[self.num_bins - 1] - self.frequencies[0]) / (self.num_bins - 1) as f32
    }

    /// Number of bins spanning `hz`, at least one.
    pub fn bins_for_hz(&self, hz: f32) -> f32 {
        let width = self.bin_width();
        if width <= 0.0 {
            return 1.0;
        }
        (hz / width).max(1.0)
    }

    /// Copy with every bin outside `[low, high]` Hz set to zero.
    pub fn band_limited(&self, low: f32, high: f32) -> Self {
        let mut data = self.data.clone();
        for row in data.chunks_exact_mut(self.num_bins) {
            for (m, f) in row.iter_mut().zip(&self.frequencies) {
                if *f < low || *f > high {
                    *m = 0.0;
                }
            }
        }
        Self {
            data,
            num_bins: self.num_bins,
            frequencies: self.frequencies.clone(),
        }
    }
}

pub(crate) fn hann_window(size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

/// Magnitude STFT of `samples`, keeping bins `0..fft_size / 2`.
pub fn stft(samples: &[f32], sample_rate: u32, config: &StftConfig) -> Result<Spectrogram> {
    config.validate()?;
    if samples.is_empty() {
        return Err(MelexError::invalid("cannot transform an empty signal"));
    }
    if sample_rate == 0 {
        return Err(MelexError::invalid("sample rate must be positive"));
    }
    if samples.iter().any(|s| !s.is_finite()) {
        return Err(MelexError::processing("stft", STATUS_NON_FINITE));
    }

    let num_windows = config.num_windows(samples.len());
    let half = (config.fft_size / 2).max(1);
    let hann = hann_window(config.window_size);
    let fft = FftPlanner::<f32>::new().plan_fft_forward(config.fft_size);

    log::debug!(
        "STFT: {} windows of {} samples (fft {}, hop {})",
        num_windows,
        config.window_size,
        config.fft_size,
        config.hop
    );

    let rows: Vec<Vec<f32>> = (0..num_windows)
        .into_par_iter()
        .map(|w| {
            let start = (w * config.hop).min(samples.len());
            let end = (start + config.window_size).min(samples.len());

            let mut buffer = vec![Complex::new(0.0f32, 0.0); config.fft_size];
            for (i, &s) in samples[start..end].iter().enumerate() {
                buffer[i] = Complex::new(s * hann[i], 0.0);
            }
            fft.process(&mut buffer);

            buffer[..half].iter().map(|c| c.norm()).collect()
        })
        .collect();

    let mut data = Vec::new();
    crate::error::reserve(&mut data, num_windows * half)?;
    for row in rows {
        data.extend_from_slice(&row);
    }

    let frequencies = (0..half)
        .map(|k| k as f32 * sample_rate as f32 / config.fft_size as f32)
        .collect();

    Spectrogram::new(data, half, frequencies)
}
