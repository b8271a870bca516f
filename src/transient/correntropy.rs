use crate::error::{MelexError, Result};

const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// Minimum data length for `num_windows` windows of `corr_win_size`
/// samples spaced `interval` apart.
pub fn required_length(corr_win_size: usize, interval: usize, num_windows: usize) -> usize {
    num_windows.saturating_sub(1) * interval + 2 * corr_win_size + 2
}

/// Summed-lag correntropy of one window of `width` samples starting at `start`.
///
/// Each sample is compared with the `width` samples that follow it.
fn window_correntropy(data: &[f32], start: usize, width: usize, sigma: f32) -> f64 {
    let inv = 1.0 / (sigma as f64 * std::f64::consts::SQRT_2);
    let mut total = 0.0f64;
    for n in start..start + width {
        let x = data[n] as f64;
        for &y in &data[n + 1..=n + width] {
            let u = (x - y as f64) * inv;
            total += (-u * u).exp();
        }
    }
    INV_SQRT_2PI * total / (sigma as f64 * width as f64)
}

/// Add this channel's correntropy for every window into `psm`.
///
/// A window whose sigma is zero (silence) or not finite contributes nothing.
pub fn accumulate_psm(
    corr_win_size: usize,
    interval: usize,
    num_windows: usize,
    data: &[f32],
    sigmas: &[f32],
    psm: &mut [f32],
) -> Result<()> {
    if corr_win_size == 0 || interval == 0 || num_windows == 0 {
        return Err(MelexError::invalid(
            "correntropy window, interval and window count must be positive",
        ));
    }
    let needed = required_length(corr_win_size, interval, num_windows);
    if data.len() < needed {
        return Err(MelexError::invalid(format!(
            "correntropy needs {} samples, got {}",
            needed,
            data.len()
        )));
    }
    if sigmas.len() != num_windows {
        return Err(MelexError::invalid(format!(
            "{} sigmas for {} windows",
            sigmas.len(),
            num_windows
        )));
    }
    if psm.len() != num_windows {
        return Err(MelexError::invalid(format!(
            "accumulator holds {} values for {} windows",
            psm.len(),
            num_windows
        )));
    }

    for (w, (acc, &sigma)) in psm.iter_mut().zip(sigmas).enumerate() {
        if !(sigma.is_finite() && sigma > 0.0) {
            continue;
        }
        *acc += window_correntropy(data, w * interval, corr_win_size, sigma) as f32;
    }
    Ok(())
}

/// Like [`accumulate_psm`], into a fresh zeroed accumulator.
pub fn psm_contribution(
    corr_win_size: usize,
    interval: usize,
    num_windows: usize,
    data: &[f32],
    sigmas: &[f32],
) -> Result<Vec<f32>> {
    let mut psm = crate::error::zeroed(num_windows)?;
    accumulate_psm(corr_win_size, interval, num_windows, data, sigmas, &mut psm)?;
    Ok(psm)
}
