use super::peaks::Peak;

/// Lower edges of the harmonic-ratio bands.
const RATIO_EDGES: [f32; 15] = [
    1.15, 1.29, 1.42, 1.59, 1.8, 1.9, 2.1, 2.4, 2.6, 2.8, 3.2, 3.8, 4.2, 4.8, 5.2,
];

/// Harmonic number of the lower peak for a ratio in each band; 0 means no match.
const RATIO_HARMONIC: [u32; 15] = [4, 3, 2, 3, 0, 1, 0, 2, 0, 1, 0, 1, 0, 1, 0];

/// One fundamental-frequency hypothesis for one analysis window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub frequency: f32,
    /// Harmonics of `frequency` found among the window's peaks.
    pub confidence: u32,
    /// Lowest path cost ending here, set by selection.
    pub cost: f32,
    /// Index into the previous window's list on the lowest-cost path.
    pub best_predecessor: Option<usize>,
}

impl Candidate {
    pub fn new(frequency: f32, confidence: u32) -> Self {
        Self {
            frequency,
            confidence,
            cost: 0.0,
            best_predecessor: None,
        }
    }
}

/// Candidate lists for every analysis window, in window order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NestedCandidates(Vec<Vec<Candidate>>);

impl NestedCandidates {
    pub fn new(windows: Vec<Vec<Candidate>>) -> Self {
        Self(windows)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn window(&self, index: usize) -> &[Candidate] {
        &self.0[index]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Vec<Candidate>> {
        self.0.iter()
    }

    pub(crate) fn windows_mut(&mut self) -> &mut [Vec<Candidate>] {
        &mut self.0
    }

    pub fn into_inner(self) -> Vec<Vec<Candidate>> {
        self.0
    }
}

/// Harmonic number implied by two peaks, if their ratio falls in a known band.
pub fn harmonic_number(lower: f32, upper: f32) -> Option<u32> {
    let ratio = upper / lower;
    let i = RATIO_EDGES.partition_point(|&edge| edge < ratio);
    if i == 0 {
        return None;
    }
    match RATIO_HARMONIC[i - 1] {
        0 => None,
        m => Some(m),
    }
}

/// Fundamental hypotheses from every peak pair whose ratio matches a
/// harmonic pattern. `peaks` must be in ascending frequency.
pub fn ratio_candidates(peaks: &[Peak]) -> Vec<f32> {
    let mut out = Vec::new();
    for (i, low) in peaks.iter().enumerate() {
        for high in &peaks[i + 1..] {
            if let Some(m) = harmonic_number(low.frequency, high.frequency) {
                out.push(low.frequency / m as f32);
            }
        }
    }
    out
}

/// Cluster sorted frequencies within `xi` Hz, keeping each cluster's best
/// supported member that lies within `[f0_min, f0_max]`.
pub fn distinct_frequencies(mut freqs: Vec<f32>, xi: f32, f0_min: f32, f0_max: f32) -> Vec<f32> {
    freqs.sort_by(|a, b| a.total_cmp(b));
    let mut distinct = Vec::new();
    let mut support = Vec::with_capacity(freqs.len());

    while !freqs.is_empty() {
        support.clear();
        support.resize(freqs.len(), 1u32);
        for i in 0..freqs.len() {
            for j in i + 1..freqs.len() {
                if freqs[j] - freqs[i] > xi {
                    break;
                }
                support[i] += 1;
                support[j] += 1;
            }
        }

        // ties go to the lower frequency
        let mut best = 0;
        for i in 1..freqs.len() {
            if support[i] > support[best] {
                best = i;
            }
        }
        let center = freqs[best];
        if (f0_min..=f0_max).contains(&center) {
            distinct.push(center);
        }

        let first = freqs[..best]
            .iter()
            .rposition(|&f| center - f > xi)
            .map_or(0, |p| p + 1);
        let last = freqs[best..]
            .iter()
            .position(|&f| f - center > xi)
            .map_or(freqs.len(), |p| best + p);
        freqs.drain(first..last);
    }
    distinct
}

/// Number of harmonics `k * f0`, `k` in `1..=harmonics`, that have a peak
/// within `tolerance` Hz.
pub fn harmonic_confidence(f0: f32, peaks: &[Peak], harmonics: usize, tolerance: f32) -> u32 {
    (1..=harmonics)
        .filter(|&k| {
            let expected = k as f32 * f0;
            peaks.iter().any(|p| (p.frequency - expected).abs() <= tolerance)
        })
        .count() as u32
}
