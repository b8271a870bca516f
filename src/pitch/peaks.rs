//! Derivative zero-crossing peak finder for magnitude spectra.

/// A spectral peak after sub-bin refinement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak {
    pub frequency: f32,
    pub amplitude: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct PeakSearch {
    /// Minimum drop of the smoothed derivative across the zero crossing,
    /// relative to the peak height.
    pub slope_threshold: f32,
    pub amp_threshold: f32,
    /// Boxcar width in bins, rounded up to an odd count.
    pub smooth_width: f32,
    pub smooth_passes: usize,
    /// Bins used by the parabolic refinement.
    pub peak_group: usize,
    pub max_peaks: usize,
    /// Keep the lowest-frequency peaks instead of the tallest.
    pub first: bool,
}

impl PeakSearch {
    pub fn new(amp_threshold: f32, smooth_width: f32, max_peaks: usize, first: bool) -> Self {
        Self {
            slope_threshold: 0.0,
            amp_threshold,
            smooth_width,
            smooth_passes: 3,
            peak_group: 5,
            max_peaks,
            first,
        }
    }
}

/// Peaks kept by the search, in ascending frequency, plus the
/// lowest-frequency peak seen whether or not it was kept.
#[derive(Clone, Debug, Default)]
pub struct PeakSet {
    pub peaks: Vec<Peak>,
    pub lowest: Option<f32>,
}

fn sign(x: f32) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

fn derivative(y: &[f32]) -> Vec<f32> {
    let n = y.len();
    let mut d = vec![0.0; n];
    d[0] = y[1] - y[0];
    d[n - 1] = y[n - 1] - y[n - 2];
    for i in 1..n - 1 {
        d[i] = (y[i + 1] - y[i - 1]) / 2.0;
    }
    d
}

fn boxcar(input: &[f32], width: usize) -> Vec<f32> {
    let n = input.len();
    let mut out = vec![0.0; n];
    if width > n {
        return out;
    }
    let half = width / 2;
    let mut sum: f32 = input[..width].iter().sum();
    for k in 0..=n - width {
        out[k + half] = sum / width as f32;
        if k + width < n {
            sum += input[k + width] - input[k];
        }
    }
    out
}

fn smooth(input: &[f32], width: usize, passes: usize) -> Vec<f32> {
    let mut out = input.to_vec();
    for _ in 0..passes {
        out = boxcar(&out, width);
    }
    out
}

/// Fit a parabola to log-magnitudes around bin `j`; falls back to the raw bin.
fn refine(freqs: &[f32], mags: &[f32], j: usize, group: usize) -> Peak {
    let raw = Peak {
        frequency: freqs[j],
        amplitude: mags[j],
    };
    if group < 5 || j < 2 || j + 2 >= mags.len() {
        return raw;
    }

    // offsets -2..=2: sum x^2 = 10, sum x^4 = 34
    let ys: Vec<f32> = (0..5).map(|k| mags[j + k - 2].abs().ln()).collect();
    if ys.iter().any(|y| !y.is_finite()) {
        return raw;
    }
    let sum_y: f32 = ys.iter().sum();
    let sum_xy: f32 = ys.iter().enumerate().map(|(k, y)| (k as f32 - 2.0) * y).sum();
    let sum_x2y: f32 = ys.iter().enumerate().map(|(k, y)| (k as f32 - 2.0).powi(2) * y).sum();
    let c1 = sum_xy / 10.0;
    let c2 = (sum_x2y - 2.0 * sum_y) / 14.0;
    let c0 = (sum_y - 10.0 * c2) / 5.0;

    if c2 >= 0.0 {
        return raw;
    }
    let offset = -c1 / (2.0 * c2);
    if !offset.is_finite() || offset.abs() > 2.0 {
        return raw;
    }

    let spacing = (freqs[j + 1] - freqs[j - 1]) / 2.0;
    Peak {
        frequency: freqs[j] + offset * spacing,
        amplitude: (c0 - c1 * c1 / (4.0 * c2)).exp(),
    }
}

/// Locate peaks as downward zero crossings of the smoothed first derivative.
pub fn find_peaks(freqs: &[f32], mags: &[f32], search: &PeakSearch) -> PeakSet {
    let n = mags.len().min(freqs.len());
    if n < 3 || search.max_peaks == 0 {
        return PeakSet::default();
    }

    let width = (search.smooth_width.round().max(1.0) as usize) | 1;
    let d = smooth(&derivative(&mags[..n]), width, search.smooth_passes);

    let mut found: Vec<Peak> = Vec::new();
    let mut lowest = None;
    let lo = width.saturating_sub(1);
    let hi = n.saturating_sub(width);
    for j in lo..hi {
        let crosses = sign(d[j]) > sign(d[j + 1]) && d[j] > 0.0;
        if !crosses || d[j] - d[j + 1] <= search.slope_threshold * mags[j] {
            continue;
        }
        if mags[j] <= search.amp_threshold {
            continue;
        }
        let peak = refine(freqs, mags, j, search.peak_group);
        lowest.get_or_insert(peak.frequency);
        found.push(peak);
        if search.first && found.len() == search.max_peaks {
            break;
        }
    }

    if !search.first && found.len() > search.max_peaks {
        found.sort_by(|a, b| b.amplitude.total_cmp(&a.amplitude));
        found.truncate(search.max_peaks);
    }
    found.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));

    PeakSet {
        peaks: found,
        lowest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(n: usize, width: f32) -> Vec<f32> {
        (0..n).map(|i| i as f32 * width).collect()
    }

    fn bump(mags: &mut [f32], center: f32, height: f32, spread: f32) {
        for (i, m) in mags.iter_mut().enumerate() {
            let d = (i as f32 - center) / spread;
            *m += height * (-d * d).exp();
        }
    }

    #[test]
    fn finds_gaussian_bumps_with_sub_bin_accuracy() {
        let freqs = axis(400, 2.0);
        let mut mags = vec![0.0f32; 400];
        bump(&mut mags, 100.3, 1.0, 4.0);
        bump(&mut mags, 250.0, 0.6, 4.0);
        let set = find_peaks(&freqs, &mags, &PeakSearch::new(0.05, 5.0, 5, true));
        assert_eq!(set.peaks.len(), 2);
        assert!((set.peaks[0].frequency - 200.6).abs() < 0.5, "{:?}", set.peaks);
        assert!((set.peaks[1].frequency - 500.0).abs() < 0.5);
        assert!((set.peaks[0].amplitude - 1.0).abs() < 0.05);
        assert_eq!(set.lowest, Some(set.peaks[0].frequency));
    }

    #[test]
    fn first_keeps_lowest_and_otherwise_tallest() {
        let freqs = axis(600, 1.0);
        let mut mags = vec![0.0f32; 600];
        bump(&mut mags, 100.0, 0.3, 4.0);
        bump(&mut mags, 250.0, 1.0, 4.0);
        bump(&mut mags, 400.0, 0.8, 4.0);

        let lowest = find_peaks(&freqs, &mags, &PeakSearch::new(0.05, 5.0, 2, true));
        let f: Vec<f32> = lowest.peaks.iter().map(|p| p.frequency.round()).collect();
        assert_eq!(f, vec![100.0, 250.0]);

        let tallest = find_peaks(&freqs, &mags, &PeakSearch::new(0.05, 5.0, 2, false));
        let f: Vec<f32> = tallest.peaks.iter().map(|p| p.frequency.round()).collect();
        assert_eq!(f, vec![250.0, 400.0]);
        assert_eq!(tallest.lowest.map(f32::round), Some(100.0));
    }

    #[test]
    fn amplitude_threshold_filters_small_peaks() {
        let freqs = axis(300, 1.0);
        let mut mags = vec![0.0f32; 300];
        bump(&mut mags, 80.0, 1.0, 3.0);
        bump(&mut mags, 200.0, 0.02, 3.0);
        let set = find_peaks(&freqs, &mags, &PeakSearch::new(1.0 / 15.0, 3.0, 5, false));
        assert_eq!(set.peaks.len(), 1);
    }

    #[test]
    fn flat_spectrum_has_no_peaks() {
        let freqs = axis(64, 1.0);
        assert!(find_peaks(&freqs, &[0.0; 64], &PeakSearch::new(0.0, 3.0, 5, true))
            .peaks
            .is_empty());
        assert!(find_peaks(&freqs[..2], &[1.0, 0.0], &PeakSearch::new(0.0, 1.0, 5, true))
            .peaks
            .is_empty());
    }
}
