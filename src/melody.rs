//! Turn transient pairs and a pitch track into notes.

use serde::{Deserialize, Serialize};

use crate::error::{MelexError, Result};
use crate::pitch::PitchTrack;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Notes on each side of a note that share its tuning estimate.
const TUNING_NEIGHBOURS: usize = 2;

/// Largest weighted spread, in squared semitones, at which the thresholded
/// mode trusts a shared offset.
const TUNING_SPREAD_LIMIT: f32 = 0.0625;

/// How a sharp or flat performance is corrected before rounding to MIDI.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TuningAdjustment {
    /// Round every pitch on its own.
    Off,
    /// Shift by the neighbourhood offset when the neighbours agree on it.
    #[default]
    Thresholded,
    /// Always shift by the neighbourhood offset.
    Always,
}

impl TuningAdjustment {
    fn spread_limit(self) -> Option<f32> {
        match self {
            Self::Off => None,
            Self::Thresholded => Some(TUNING_SPREAD_LIMIT),
            Self::Always => Some(f32::INFINITY),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NoteConfig {
    /// Frequency of A4 in Hz.
    pub tuning: f32,
    /// Notes shorter than this many seconds are dropped.
    pub min_duration: f32,
    pub tuning_adjustment: TuningAdjustment,
}

impl Default for NoteConfig {
    fn default() -> Self {
        Self {
            tuning: 440.0,
            min_duration: 0.04,
            tuning_adjustment: TuningAdjustment::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Note {
    pub onset: usize,
    pub offset: usize,
    pub onset_time: f32,
    pub offset_time: f32,
    /// `NaN` when no window under the note carried a pitch.
    pub frequency: f32,
    pub midi: Option<u8>,
    /// Semitones subtracted from the pitch before rounding to `midi`.
    pub tuning_offset: f32,
}

impl Note {
    pub fn duration(&self) -> f32 {
        self.offset_time - self.onset_time
    }

    pub fn name(&self) -> Option<String> {
        self.midi.map(note_name)
    }
}

/// Fractional MIDI pitch of `frequency`, `None` without a usable pitch.
pub fn fractional_midi(frequency: f32, tuning: f32) -> Option<f32> {
    if !(frequency > 0.0) || !frequency.is_finite() || !(tuning > 0.0) {
        return None;
    }
    Some(69.0 + 12.0 * (frequency / tuning).log2())
}

fn to_midi(pitch: f32) -> u8 {
    pitch.round().clamp(0.0, 127.0) as u8
}

/// Nearest MIDI note for `frequency`, or `None` without a usable pitch.
pub fn midi_number(frequency: f32, tuning: f32) -> Option<u8> {
    fractional_midi(frequency, tuning).map(to_midi)
}

/// Fractional part wrapped into [-0.5, 0.5).
fn wrapped_fraction(pitch: f32) -> f32 {
    let f = pitch - pitch.trunc();
    if f >= 0.5 {
        f - 1.0
    } else if f < -0.5 {
        f + 1.0
    } else {
        f
    }
}

/// Weighted circular mean of the fractional parts of `pitches` and its
/// spread, as `(offset, spread)`.
///
/// Weights fall off with the square root of the distance from
/// `pitches[center]`. Fractions live on a circle of circumference one, so
/// every place to cut that circle is tried and the cut with the smallest
/// weighted squared spread wins. The spread is infinite when the weights
/// leave no degrees of freedom, e.g. for a single pitch.
pub fn tuning_offset(pitches: &[f32], center: usize) -> (f32, f32) {
    let Some(&mid) = pitches.get(center) else {
        return (0.0, f32::INFINITY);
    };
    let weights: Vec<f32> = pitches
        .iter()
        .map(|&p| {
            let d = (p - mid).abs().sqrt();
            if d == 0.0 { 1.0 } else { (1.0 / d).min(1.0) }
        })
        .collect();
    let total: f32 = weights.iter().sum();
    let mut fractions: Vec<f32> = pitches.iter().map(|&p| wrapped_fraction(p)).collect();

    let mut best = (fractions[center], f32::INFINITY);
    let mut cut = f32::NEG_INFINITY;
    loop {
        for f in fractions.iter_mut().filter(|f| **f <= cut) {
            *f += 1.0;
        }
        let mean = fractions.iter().zip(&weights).map(|(f, w)| f * w).sum::<f32>() / total;
        let spread = fractions
            .iter()
            .zip(&weights)
            .map(|(f, w)| {
                let d = f - mean;
                let d = d - d.round();
                d * d * w
            })
            .sum::<f32>()
            / (total - 1.0);
        if spread.is_finite() && spread < best.1 {
            best = (mean, spread);
        }
        cut = fractions.iter().copied().fold(f32::INFINITY, f32::min);
        if !(cut < 0.5) {
            break;
        }
    }
    (best.0 - best.0.round(), best.1)
}

/// Fill in `midi` and `tuning_offset` for every voiced note.
fn assign_midi(notes: &mut [Note], config: &NoteConfig) {
    let voiced: Vec<(usize, f32)> = notes
        .iter()
        .enumerate()
        .filter_map(|(i, n)| fractional_midi(n.frequency, config.tuning).map(|p| (i, p)))
        .collect();
    let pitches: Vec<f32> = voiced.iter().map(|&(_, p)| p).collect();
    let limit = config.tuning_adjustment.spread_limit();

    let mut adjusted = 0;
    for (k, &(i, pitch)) in voiced.iter().enumerate() {
        let offset = match limit {
            Some(limit) => {
                let lo = k.saturating_sub(TUNING_NEIGHBOURS);
                let hi = (k + TUNING_NEIGHBOURS).min(pitches.len() - 1);
                let (offset, spread) = tuning_offset(&pitches[lo..=hi], k - lo);
                if spread < limit { offset } else { 0.0 }
            }
            None => 0.0,
        };
        let midi = to_midi(pitch - offset);
        if midi != to_midi(pitch) {
            adjusted += 1;
        }
        notes[i].midi = Some(midi);
        notes[i].tuning_offset = offset;
    }
    if adjusted > 0 {
        log::debug!("Tuning adjustment moved {} of {} notes", adjusted, voiced.len());
    }
}

/// Scientific pitch name such as `A4` or `C#3`.
pub fn note_name(midi: u8) -> String {
    let octave = midi as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[midi as usize % 12], octave)
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

fn validate_transients(transients: &[usize]) -> Result<()> {
    if transients.len() % 2 != 0 {
        return Err(MelexError::invalid(format!(
            "transients must come in onset/offset pairs, got {} indices",
            transients.len()
        )));
    }
    if transients.windows(2).any(|w| w[0] >= w[1]) {
        return Err(MelexError::invalid("transients must be strictly increasing"));
    }
    Ok(())
}

fn note_frequency(track: &PitchTrack, onset: usize, offset: usize) -> f32 {
    let mut inside: Vec<f32> = (0..track.len())
        .filter(|&w| (onset..offset).contains(&track.window_center(w)))
        .map(|w| track.pitches[w])
        .filter(|p| !p.is_nan())
        .collect();
    if !inside.is_empty() {
        return median(&mut inside);
    }

    let midpoint = (onset + offset) / 2;
    (0..track.len())
        .min_by_key(|&w| track.window_center(w).abs_diff(midpoint))
        .map_or(f32::NAN, |w| track.pitches[w])
}

/// Pair up onsets and offsets and label each note with its pitch.
///
/// MIDI numbers are rounded after removing the tuning offset shared with up
/// to two voiced neighbours on each side, per `config.tuning_adjustment`.
pub fn compile_notes(
    transients: &[usize],
    track: &PitchTrack,
    config: &NoteConfig,
) -> Result<Vec<Note>> {
    validate_transients(transients)?;
    if track.sample_rate == 0 {
        return Err(MelexError::invalid("pitch track has no sample rate"));
    }

    let rate = track.sample_rate as f32;
    let mut notes = Vec::with_capacity(transients.len() / 2);
    let mut short = 0;
    for pair in transients.chunks_exact(2) {
        let (onset, offset) = (pair[0], pair[1]);
        let onset_time = onset as f32 / rate;
        let offset_time = offset as f32 / rate;
        if offset_time - onset_time < config.min_duration {
            short += 1;
            continue;
        }
        let frequency = note_frequency(track, onset, offset);
        notes.push(Note {
            onset,
            offset,
            onset_time,
            offset_time,
            frequency,
            midi: None,
            tuning_offset: 0.0,
        });
    }
    assign_midi(&mut notes, config);

    if short > 0 {
        log::debug!("Dropped {} notes shorter than {}s", short, config.min_duration);
    }
    Ok(notes)
}
