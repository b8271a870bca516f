use serde::Deserialize;

use crate::error::{MelexError, Result, STATUS_NON_FINITE};

/// MAD to standard deviation for normally distributed noise.
const MAD_SCALE: f32 = 1.4826;

/// Shortest onset-to-offset span, in detection-function steps.
const MIN_PAIR_SPAN: usize = 4;

/// Steps needed after the last offset before the scan closes a final pair
/// over the remainder.
const MIN_TAIL: usize = 2 * MIN_PAIR_SPAN;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PickingConfig {
    /// Smallest accepted excursion, relative to the largest one.
    pub min_height: f32,
    /// Threshold in units of the robust noise estimate.
    pub noise_multiplier: f32,
    /// An excursion must be the largest swing, of either sign, within this
    /// many steps on each side.
    pub local_window: usize,
    /// Discard the final onset/offset pair.
    pub drop_trailing_pair: bool,
}

impl Default for PickingConfig {
    fn default() -> Self {
        Self {
            min_height: 0.1,
            noise_multiplier: 4.0,
            local_window: 8,
            drop_trailing_pair: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Polarity {
    Onset,
    Offset,
}

#[derive(Clone, Copy, Debug)]
struct Excursion {
    index: usize,
    polarity: Polarity,
    height: f32,
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}

fn noise_threshold(strength: &[f32], config: &PickingConfig) -> f32 {
    let mut work = strength.to_vec();
    let center = median(&mut work);
    for (w, s) in work.iter_mut().zip(strength) {
        *w = (s - center).abs();
    }
    let mad = median(&mut work);
    config.min_height.max(config.noise_multiplier * MAD_SCALE * mad)
}

/// Swings above `threshold` that dominate their neighbourhood. Overshoot
/// right after a swing is smaller than the swing itself, so it never
/// survives as a transient of the opposite polarity.
fn excursions(strength: &[f32], threshold: f32, local_window: usize) -> Vec<Excursion> {
    let n = strength.len();
    let mut found = Vec::new();
    for (i, &s) in strength.iter().enumerate() {
        let height = s.abs();
        if height <= threshold {
            continue;
        }
        let lo = i.saturating_sub(local_window);
        let hi = (i + local_window).min(n - 1);
        // ties go to the earlier step
        let dominated = strength[lo..i].iter().any(|v| v.abs() >= height)
            || strength[i + 1..=hi].iter().any(|v| v.abs() > height);
        if dominated {
            continue;
        }
        let polarity = if s > 0.0 { Polarity::Onset } else { Polarity::Offset };
        found.push(Excursion { index: i, polarity, height });
    }
    found
}

/// Alternate onsets and offsets: leading offsets are skipped and runs of
/// one polarity keep their largest member.
fn alternate(found: Vec<Excursion>) -> Vec<Excursion> {
    let mut picked: Vec<Excursion> = Vec::new();
    for ex in found {
        let last = picked.last().map(|l| (l.polarity, l.height));
        match last {
            None if ex.polarity == Polarity::Offset => {}
            Some((polarity, height)) if polarity == ex.polarity => {
                if ex.height > height {
                    if let Some(slot) = picked.last_mut() {
                        *slot = ex;
                    }
                }
            }
            _ => picked.push(ex),
        }
    }
    picked
}

/// Pair whatever follows the last pick with the end of the function.
///
/// An unmatched onset is closed at the final step. Otherwise, when enough
/// steps remain after the last offset, the remainder becomes one more pair
/// starting at its strongest onset-going step.
fn close_scan(picked: &mut Vec<Excursion>, strength: &[f32]) {
    let last_index = strength.len() - 1;
    let Some(last) = picked.last().copied() else {
        return;
    };
    let end = Excursion {
        index: last_index,
        polarity: Polarity::Offset,
        height: 0.0,
    };

    if last.polarity == Polarity::Onset {
        if last.index + MIN_PAIR_SPAN <= last_index {
            picked.push(end);
        } else {
            picked.pop();
        }
        return;
    }

    if last_index - last.index < MIN_TAIL {
        return;
    }
    let first = last.index + 1;
    let onset = strength[first..=last_index - MIN_PAIR_SPAN]
        .iter()
        .enumerate()
        .fold(None::<(usize, f32)>, |best, (k, &s)| match best {
            Some((_, b)) if b >= s => best,
            _ => Some((first + k, s)),
        });
    if let Some((index, height)) = onset {
        picked.push(Excursion {
            index,
            polarity: Polarity::Onset,
            height,
        });
        picked.push(end);
    }
}

/// Onset/offset indices into `det_func` with the default picking settings.
pub fn detect_transients(det_func: &[f32]) -> Result<Vec<usize>> {
    detect_transients_with(det_func, &PickingConfig::default())
}

/// Paired onset/offset scan over a detection function.
///
/// The pooled correntropy drops when a note starts, so onsets are negative
/// swings of `det_func` and offsets positive ones. Like a paired search that
/// runs to the end of the function, the scan always closes with a pair over
/// whatever follows the last offset; with `drop_trailing_pair` that final
/// pair is discarded. The result has even length, is strictly increasing
/// and starts with an onset.
pub fn detect_transients_with(det_func: &[f32], config: &PickingConfig) -> Result<Vec<usize>> {
    if !(config.min_height > 0.0 && config.noise_multiplier >= 0.0) {
        return Err(MelexError::invalid("picking thresholds must be positive"));
    }
    if det_func.iter().any(|v| !v.is_finite()) {
        return Err(MelexError::processing("transient scan", STATUS_NON_FINITE));
    }

    let peak = det_func.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    if peak == 0.0 {
        return Ok(Vec::new());
    }
    let strength: Vec<f32> = det_func.iter().map(|v| -v / peak).collect();
    let threshold = noise_threshold(&strength, config);

    let mut picked = alternate(excursions(&strength, threshold, config.local_window));
    close_scan(&mut picked, &strength);
    if config.drop_trailing_pair && picked.len() >= 2 {
        picked.truncate(picked.len() - 2);
    }

    log::debug!(
        "Picked {} transients above threshold {:.3}",
        picked.len(),
        threshold
    );
    Ok(picked.into_iter().map(|e| e.index).collect())
}
