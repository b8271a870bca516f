//! BaNa harmonic-matching candidate search.

use rayon::prelude::*;

use super::candidates::{
    distinct_frequencies, harmonic_confidence, ratio_candidates, Candidate, NestedCandidates,
};
use super::peaks::{find_peaks, PeakSearch};
use crate::audio::stft::Spectrogram;
use crate::error::{MelexError, Result, STATUS_NON_FINITE};

/// Upper bound on harmonic peaks examined per window.
pub const MAX_HARMONIC_PEAKS: usize = 10;

/// Peaks below `max / AMP_DIVISOR` are ignored.
const AMP_DIVISOR: f32 = 15.0;

/// Recommended smoothing width in Hz.
pub const SMOOTH_HZ: f32 = 50.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BanaParams {
    /// Number of harmonic peaks examined (`p`).
    pub harmonics: usize,
    pub f0_min: f32,
    pub f0_max: f32,
    /// Keep the lowest-frequency peaks rather than the tallest.
    pub first: bool,
    /// Clustering and harmonic-matching tolerance in Hz.
    pub xi: f32,
    /// Smoothing width in bins.
    pub smooth_width: f32,
}

impl BanaParams {
    /// Speech and general monophonic input.
    pub fn general(smooth_width: f32) -> Self {
        Self {
            harmonics: 5,
            f0_min: 50.0,
            f0_max: 600.0,
            first: true,
            xi: 10.0,
            smooth_width,
        }
    }

    /// Instrumental melodies, wider range and tighter tolerance.
    pub fn music(smooth_width: f32) -> Self {
        Self {
            harmonics: 5,
            f0_min: 50.0,
            f0_max: 3000.0,
            first: false,
            xi: 3.0,
            smooth_width,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.harmonics == 0 || self.harmonics > MAX_HARMONIC_PEAKS {
            return Err(MelexError::invalid(format!(
                "harmonic peak count must be in 1..={}, got {}",
                MAX_HARMONIC_PEAKS, self.harmonics
            )));
        }
        if !(self.f0_min > 0.0 && self.f0_max > self.f0_min) {
            return Err(MelexError::invalid(format!(
                "need 0 < f0_min < f0_max, got {} and {}",
                self.f0_min, self.f0_max
            )));
        }
        if !(self.xi > 0.0) {
            return Err(MelexError::invalid("xi must be positive"));
        }
        if !(self.smooth_width > 0.0) {
            return Err(MelexError::invalid("smoothing width must be positive"));
        }
        Ok(())
    }
}

fn window_candidates(
    mags: &[f32],
    freqs: &[f32],
    params: &BanaParams,
    tolerance: f32,
) -> Result<Vec<Candidate>> {
    if mags.iter().any(|m| !m.is_finite()) {
        return Err(MelexError::processing("BaNa candidate search", STATUS_NON_FINITE));
    }
    let max = mags.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Ok(Vec::new());
    }

    let search = PeakSearch::new(
        max / AMP_DIVISOR,
        params.smooth_width,
        params.harmonics,
        params.first,
    );
    let found = find_peaks(freqs, mags, &search);
    if found.peaks.is_empty() {
        return Ok(Vec::new());
    }

    let mut hypotheses = ratio_candidates(&found.peaks);
    crate::error::reserve(&mut hypotheses, found.peaks.len() + 1)?;
    hypotheses.extend(found.peaks.iter().map(|p| p.frequency));
    hypotheses.extend(found.lowest);

    let mut list = Vec::new();
    for f0 in distinct_frequencies(hypotheses, params.xi, params.f0_min, params.f0_max) {
        let confidence = harmonic_confidence(f0, &found.peaks, params.harmonics, tolerance);
        if confidence > 0 {
            list.push(Candidate::new(f0, confidence));
        }
    }
    list.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
    Ok(list)
}

/// Fundamental-frequency candidates for every window of `spectrogram`.
///
/// Windows are searched independently; a window with no usable peaks gets
/// an empty list.
pub fn find_candidates(spectrogram: &Spectrogram, params: &BanaParams) -> Result<NestedCandidates> {
    params.validate()?;

    let freqs = spectrogram.frequencies();
    let tolerance = params.xi.max(spectrogram.bin_width());

    let windows: Vec<Vec<Candidate>> = spectrogram
        .data()
        .par_chunks_exact(spectrogram.num_bins())
        .map(|mags| window_candidates(mags, freqs, params, tolerance))
        .collect::<Result<_>>()?;

    let total: usize = windows.iter().map(Vec::len).sum();
    log::debug!(
        "BaNa: {} candidates over {} windows (p={}, xi={})",
        total,
        windows.len(),
        params.harmonics,
        params.xi
    );
    Ok(NestedCandidates::new(windows))
}
