use rayon::prelude::*;

use crate::audio::stft::Spectrogram;
use crate::error::{MelexError, Result};

/// Harmonic product of one spectrum: bin `i` times bins `2i ..= (overtones + 1) i`.
/// Bins whose highest overtone falls off the spectrum are left out.
fn harmonic_product(mags: &[f32], overtones: usize) -> Vec<f32> {
    let usable = (mags.len() - 1) / (overtones + 1) + 1;
    (0..usable)
        .map(|i| (1..=overtones + 1).map(|n| mags[i * n]).product())
        .collect()
}

/// Strongest harmonic-product bin for one window, or `NaN` when the product
/// vanishes everywhere.
pub fn hps_pitch(mags: &[f32], freqs: &[f32], overtones: usize) -> f32 {
    if mags.is_empty() {
        return f32::NAN;
    }
    let product = harmonic_product(mags, overtones);
    // skip DC
    let best = product
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.total_cmp(b.1));
    match best {
        Some((i, &value)) if value > 0.0 => freqs[i],
        _ => f32::NAN,
    }
}

/// Harmonic product spectrum pitch for every window.
pub fn hps_detect(spectrogram: &Spectrogram, overtones: usize, pitches: &mut [f32]) -> Result<()> {
    if overtones == 0 {
        return Err(MelexError::invalid("HPS needs at least one overtone"));
    }
    if pitches.len() != spectrogram.num_windows() {
        return Err(MelexError::invalid(format!(
            "pitch buffer holds {} values for {} windows",
            pitches.len(),
            spectrogram.num_windows()
        )));
    }
    let freqs = spectrogram.frequencies();
    pitches
        .par_iter_mut()
        .zip(spectrogram.data().par_chunks_exact(spectrogram.num_bins()))
        .for_each(|(pitch, mags)| *pitch = hps_pitch(mags, freqs, overtones));
    Ok(())
}
