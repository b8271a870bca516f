use crate::error::{MelexError, Result};

/// Silverman's rule-of-thumb factor, `(4/3)^0.2`.
pub const SILVERMAN_FACTOR: f32 = 1.059_223_8;

/// Samples on each side of a window's center: `(left, right)`.
///
/// Even sizes put one fewer sample on the left.
pub fn window_extent(window_size: usize) -> (usize, usize) {
    let right = window_size / 2;
    let left = if window_size % 2 == 0 { right - 1 } else { right };
    (left, right)
}

/// Half-open sample range covered by the window centered at `center`.
pub fn window_bounds(center: usize, window_size: usize, len: usize) -> (usize, usize) {
    let (left, right) = window_extent(window_size);
    (center.saturating_sub(left), (center + right + 1).min(len))
}

/// Number of windows reachable from `start_index` before a window would
/// hold fewer than two samples.
pub fn max_windows(len: usize, start_index: usize, interval: usize, window_size: usize) -> usize {
    let (left, _) = window_extent(window_size);
    let max_center = (len + left).saturating_sub(2);
    if start_index > max_center {
        return 1;
    }
    (max_center - start_index) / interval + 1
}

/// Running mean/variance with removal, accumulated in f64.
#[derive(Default)]
struct RollingMoments {
    nobs: u64,
    mean: f64,
    ssqdm: f64,
}

impl RollingMoments {
    fn add(&mut self, x: f64) {
        self.nobs += 1;
        let delta = x - self.mean;
        self.mean += delta / self.nobs as f64;
        self.ssqdm += delta * (x - self.mean);
    }

    fn remove(&mut self, x: f64) {
        if self.nobs <= 1 {
            *self = Self::default();
            return;
        }
        self.nobs -= 1;
        let delta = x - self.mean;
        self.mean -= delta / self.nobs as f64;
        self.ssqdm -= delta * (x - self.mean);
    }

    fn variance(&self) -> f64 {
        if self.nobs < 2 {
            return 0.0;
        }
        (self.ssqdm / (self.nobs - 1) as f64).max(0.0)
    }
}

/// Kernel bandwidth for each window centered at `start_index + k * interval`.
///
/// Uses `scale_factor * std / nobs^0.2` over each window's samples.
/// `num_windows` is capped to [`max_windows`]; `None` means as many as fit.
pub fn roll_sigma(
    data: &[f32],
    start_index: usize,
    interval: usize,
    window_size: usize,
    num_windows: Option<usize>,
    scale_factor: f32,
) -> Result<Vec<f32>> {
    if data.len() < 2 {
        return Err(MelexError::invalid("rolling sigma needs at least two samples"));
    }
    if start_index >= data.len() {
        return Err(MelexError::invalid(format!(
            "start index {} outside data of length {}",
            start_index,
            data.len()
        )));
    }
    if interval == 0 {
        return Err(MelexError::invalid("interval must be positive"));
    }
    if window_size < 2 {
        return Err(MelexError::invalid("sigma window must hold at least two samples"));
    }
    if !(scale_factor.is_finite() && scale_factor > 0.0) {
        return Err(MelexError::invalid("scale factor must be positive"));
    }

    let limit = max_windows(data.len(), start_index, interval, window_size);
    let count = num_windows.map_or(limit, |n| n.min(limit));
    if num_windows.is_some_and(|n| n > limit) {
        log::debug!("Capping sigma windows from {:?} to {}", num_windows, limit);
    }

    let mut sigmas = Vec::new();
    crate::error::reserve(&mut sigmas, count)?;

    let mut moments = RollingMoments::default();
    let (mut prev_start, mut prev_stop) = (0usize, 0usize);

    for k in 0..count {
        let center = start_index + k * interval;
        let (start, stop) = window_bounds(center, window_size, data.len());

        // add before removing so the estimate never empties mid-step
        for &x in &data[prev_stop.max(start)..stop] {
            moments.add(x as f64);
        }
        for &x in &data[prev_start..start.min(prev_stop)] {
            moments.remove(x as f64);
        }
        prev_start = start;
        prev_stop = stop;

        let sigma =
            scale_factor as f64 * moments.variance().sqrt() / (moments.nobs as f64).powf(0.2);
        sigmas.push(sigma as f32);
    }

    Ok(sigmas)
}
