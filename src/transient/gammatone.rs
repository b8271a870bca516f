use rustfft::num_complex::Complex64;
use serde::Deserialize;
use std::f64::consts::PI;

use crate::audio::resample::resample;
use crate::error::{MelexError, Result};

/// Glasberg & Moore ERB parameters.
const EAR_Q: f64 = 9.26449;
const MIN_BANDWIDTH: f64 = 24.7;
const BANDWIDTH_SCALE: f64 = 1.019;

/// Numeric precision used by [`filter`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Single precision at the native rate.
    #[default]
    Fast,
    /// Double precision at twice the native rate.
    Reference,
}

fn erb_number(freq: f64) -> f64 {
    21.4 * (1.0 + 0.00437 * freq).log10()
}

fn erb_number_inverse(erbs: f64) -> f64 {
    (10f64.powf(erbs / 21.4) - 1.0) / 0.00437
}

/// Channel center frequencies equally spaced on the ERB-number scale,
/// running from exactly `min_freq` to exactly `max_freq`.
pub fn central_frequencies(num_channels: usize, min_freq: f32, max_freq: f32) -> Result<Vec<f32>> {
    if num_channels == 0 {
        return Err(MelexError::invalid("filterbank needs at least one channel"));
    }
    if !(min_freq.is_finite() && max_freq.is_finite()) {
        return Err(MelexError::invalid("channel frequency bounds must be finite"));
    }
    if num_channels == 1 {
        if min_freq != max_freq || min_freq <= 0.0 {
            return Err(MelexError::invalid(
                "a single channel needs min_freq == max_freq > 0",
            ));
        }
        return Ok(vec![min_freq]);
    }
    if !(max_freq > min_freq && min_freq > 0.0) {
        return Err(MelexError::invalid(format!(
            "need max_freq > min_freq > 0, got {} and {}",
            min_freq, max_freq
        )));
    }

    let low = erb_number(min_freq as f64);
    let high = erb_number(max_freq as f64);
    let step = (high - low) / (num_channels - 1) as f64;

    let mut freqs: Vec<f32> = (0..num_channels)
        .map(|i| erb_number_inverse(low + step * i as f64) as f32)
        .collect();
    freqs[0] = min_freq;
    freqs[num_channels - 1] = max_freq;
    Ok(freqs)
}

/// One second-order section, `a[0]` normalised to 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl Biquad {
    fn response(&self, z_inv: Complex64) -> Complex64 {
        let z_inv2 = z_inv * z_inv;
        let num = self.b[0] + z_inv * self.b[1] + z_inv2 * self.b[2];
        let den = self.a[0] + z_inv * self.a[1] + z_inv2 * self.a[2];
        num / den
    }
}

/// Slaney's four-section approximation of a 4th-order gammatone filter,
/// normalised to unit gain at `center_freq`.
pub fn gammatone_coefficients(sample_rate: f64, center_freq: f64) -> Result<[Biquad; 4]> {
    if !(sample_rate > 0.0 && sample_rate.is_finite()) {
        return Err(MelexError::invalid("sample rate must be positive"));
    }
    if !(center_freq > 0.0 && center_freq.is_finite()) {
        return Err(MelexError::invalid("center frequency must be positive"));
    }

    let t = 1.0 / sample_rate;
    let erb = center_freq / EAR_Q + MIN_BANDWIDTH;
    let bw = BANDWIDTH_SCALE * 2.0 * PI * erb;
    let theta = 2.0 * PI * center_freq * t;
    let decay = (-bw * t).exp();

    let a = [1.0, -2.0 * theta.cos() * decay, decay * decay];
    let plus = (3.0 + 2f64.powf(1.5)).sqrt();
    let minus = (3.0 - 2f64.powf(1.5)).sqrt();
    let zero = |k: f64| -(t * theta.cos() + k * t * theta.sin()) * decay;

    let mut sections = [
        Biquad { b: [t, zero(plus), 0.0], a },
        Biquad { b: [t, zero(-plus), 0.0], a },
        Biquad { b: [t, zero(minus), 0.0], a },
        Biquad { b: [t, zero(-minus), 0.0], a },
    ];

    let z_inv = Complex64::from_polar(1.0, -theta);
    let gain: f64 = sections.iter().map(|s| s.response(z_inv).norm()).product();
    if !(gain.is_finite() && gain > 0.0) {
        return Err(MelexError::processing("gammatone design", crate::error::STATUS_NON_FINITE));
    }
    for b in sections[0].b.iter_mut() {
        *b /= gain;
    }
    Ok(sections)
}

fn cascade_f64(input: &[f64], sections: &[Biquad; 4]) -> Vec<f64> {
    let mut signal = input.to_vec();
    for s in sections {
        let (mut z1, mut z2) = (0.0f64, 0.0f64);
        for x in signal.iter_mut() {
            let y = s.b[0] * *x + z1;
            z1 = s.b[1] * *x - s.a[1] * y + z2;
            z2 = s.b[2] * *x - s.a[2] * y;
            *x = y;
        }
    }
    signal
}

fn cascade_f32(input: &[f32], sections: &[Biquad; 4]) -> Vec<f32> {
    let mut signal = input.to_vec();
    for s in sections {
        let [b0, b1, b2] = s.b.map(|c| c as f32);
        let [_, a1, a2] = s.a.map(|c| c as f32);
        let (mut z1, mut z2) = (0.0f32, 0.0f32);
        for x in signal.iter_mut() {
            let y = b0 * *x + z1;
            z1 = b1 * *x - a1 * y + z2;
            z2 = b2 * *x - a2 * y;
            *x = y;
        }
    }
    signal
}

/// Run one gammatone channel over `audio`. The output has the input's length.
pub fn filter(
    audio: &[f32],
    sample_rate: u32,
    center_freq: f32,
    mode: FilterMode,
) -> Result<Vec<f32>> {
    if sample_rate == 0 {
        return Err(MelexError::invalid("sample rate must be positive"));
    }
    if !(center_freq > 0.0) {
        return Err(MelexError::invalid("center frequency must be positive"));
    }

    match mode {
        FilterMode::Fast => {
            let sections = gammatone_coefficients(sample_rate as f64, center_freq as f64)?;
            Ok(cascade_f32(audio, &sections))
        }
        FilterMode::Reference => {
            let sections = gammatone_coefficients(2.0 * sample_rate as f64, center_freq as f64)?;
            let upsampled: Vec<f64> = resample(audio, 2.0)?.into_iter().map(f64::from).collect();
            let filtered: Vec<f32> = cascade_f64(&upsampled, &sections)
                .into_iter()
                .map(|s| s as f32)
                .collect();
            let mut out = resample(&filtered, 0.5)?;
            out.resize(audio.len(), 0.0);
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                0.5 * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    fn peak(x: &[f32]) -> f32 {
        x.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn central_frequencies_are_monotonic_with_exact_endpoints() {
        let cases = [(2, 100.0, 200.0), (16, 80.0, 4000.0), (64, 80.0, 4000.0), (7, 50.0, 51.0)];
        for &(n, lo, hi) in &cases {
            let freqs = central_frequencies(n, lo, hi).unwrap();
            assert_eq!(freqs.len(), n);
            assert_eq!(freqs[0], lo);
            assert_eq!(freqs[n - 1], hi);
            assert!(freqs.windows(2).all(|w| w[1] > w[0]), "{:?}", freqs);
        }
    }

    #[test]
    fn erb_spacing_is_denser_at_low_frequencies() {
        let freqs = central_frequencies(32, 80.0, 4000.0).unwrap();
        let first_gap = freqs[1] - freqs[0];
        let last_gap = freqs[31] - freqs[30];
        assert!(last_gap > 5.0 * first_gap);
    }

    #[test]
    fn single_channel_rules() {
        assert_eq!(central_frequencies(1, 440.0, 440.0).unwrap(), vec![440.0]);
        assert!(central_frequencies(1, 440.0, 880.0).is_err());
        assert!(central_frequencies(0, 80.0, 4000.0).is_err());
        assert!(central_frequencies(4, 400.0, 80.0).is_err());
        assert!(central_frequencies(4, 0.0, 80.0).is_err());
    }

    #[test]
    fn fast_filter_has_unit_gain_at_center() {
        let x = sine(1000.0, 16000, 16000);
        let y = filter(&x, 16000, 1000.0, FilterMode::Fast).unwrap();
        assert_eq!(y.len(), x.len());
        assert!((peak(&y[8000..]) - 0.5).abs() < 0.02, "peak {}", peak(&y[8000..]));
    }

    #[test]
    fn fast_filter_rejects_distant_tone() {
        let x = sine(3000.0, 16000, 16000);
        let y = filter(&x, 16000, 300.0, FilterMode::Fast).unwrap();
        assert!(peak(&y[8000..]) < 0.01);
    }

    #[test]
    fn reference_filter_matches_length_and_gain() {
        let x = sine(500.0, 8000, 8001);
        let y = filter(&x, 8000, 500.0, FilterMode::Reference).unwrap();
        assert_eq!(y.len(), x.len());
        assert!((peak(&y[3000..6000]) - 0.5).abs() < 0.03, "peak {}", peak(&y[3000..6000]));
    }

    #[test]
    fn filter_rejects_non_positive_parameters() {
        assert!(filter(&[0.0; 8], 0, 100.0, FilterMode::Fast).is_err());
        assert!(filter(&[0.0; 8], 8000, 0.0, FilterMode::Fast).is_err());
        assert!(filter(&[0.0; 8], 8000, -5.0, FilterMode::Reference).is_err());
    }
}
