//! Standard MIDI File (format 0) output for compiled notes.

use std::path::Path;

use serde::Deserialize;

use crate::error::{MelexError, Result};
use crate::melody::Note;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;
const META: u8 = 0xFF;
const META_TEMPO: u8 = 0x51;
const META_END_OF_TRACK: u8 = 0x2F;

/// Ticks between the last note off and the end of the track.
const END_PADDING: u32 = 2;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    pub bpm: u32,
    /// Ticks per quarter note.
    pub division: u16,
    pub velocity: u8,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            bpm: 120,
            division: 48,
            velocity: 80,
        }
    }
}

impl MidiConfig {
    fn validate(&self) -> Result<()> {
        if self.bpm == 0 || self.division == 0 || self.division > 0x7FFF {
            return Err(MelexError::invalid(format!(
                "invalid MIDI timing: {} bpm at {} ticks per quarter",
                self.bpm, self.division
            )));
        }
        if self.velocity > 127 {
            return Err(MelexError::invalid(format!("velocity {} above 127", self.velocity)));
        }
        Ok(())
    }
}

/// Variable-length quantity: seven bits per byte, most significant first,
/// continuation bit set on every byte but the last.
pub fn push_vlq(out: &mut Vec<u8>, value: u32) {
    let mut groups = [0u8; 5];
    let mut n = 0;
    let mut rest = value;
    loop {
        groups[n] = (rest & 0x7F) as u8;
        n += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for k in (0..n).rev() {
        let flag = if k > 0 { 0x80 } else { 0 };
        out.push(groups[k] | flag);
    }
}

/// Event deltas in ticks, one per onset and offset. Absolute times are
/// rounded before differencing so rounding error does not accumulate.
fn event_deltas(notes: &[&Note], sample_rate: u32, config: &MidiConfig) -> Vec<u32> {
    let ticks_per_sample =
        (config.bpm as f64 * config.division as f64) / (60.0 * sample_rate as f64);
    let mut prev = 0u32;
    let mut deltas = Vec::with_capacity(2 * notes.len());
    for note in notes {
        for sample in [note.onset, note.offset] {
            let tick = (sample as f64 * ticks_per_sample).round() as u32;
            deltas.push(tick.saturating_sub(prev));
            prev = prev.max(tick);
        }
    }
    deltas
}

fn track_events(notes: &[Note], sample_rate: u32, config: &MidiConfig) -> Vec<u8> {
    let voiced: Vec<&Note> = notes.iter().filter(|n| n.midi.is_some()).collect();
    let deltas = event_deltas(&voiced, sample_rate, config);

    let mut track = Vec::with_capacity(16 + 8 * voiced.len());
    let tempo = 60_000_000 / config.bpm;
    push_vlq(&mut track, 0);
    track.extend_from_slice(&[META, META_TEMPO, 3]);
    track.extend_from_slice(&tempo.to_be_bytes()[1..]);

    for (note, pair) in voiced.iter().zip(deltas.chunks_exact(2)) {
        let Some(key) = note.midi else { continue };
        push_vlq(&mut track, pair[0]);
        track.extend_from_slice(&[NOTE_ON, key, config.velocity]);
        push_vlq(&mut track, pair[1]);
        track.extend_from_slice(&[NOTE_OFF, key, config.velocity]);
    }

    push_vlq(&mut track, END_PADDING);
    track.extend_from_slice(&[META, META_END_OF_TRACK, 0]);
    track
}

/// Complete file contents: `MThd` header then a single `MTrk` chunk.
/// Notes without a MIDI number are skipped.
pub fn midi_bytes(notes: &[Note], sample_rate: u32, config: &MidiConfig) -> Result<Vec<u8>> {
    config.validate()?;
    if sample_rate == 0 {
        return Err(MelexError::invalid("sample rate must be positive"));
    }

    let track = track_events(notes, sample_rate, config);
    let track_len = u32::try_from(track.len())
        .map_err(|_| MelexError::invalid("MIDI track longer than 4 GiB"))?;

    let mut out = Vec::with_capacity(22 + track.len());
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&config.division.to_be_bytes());
    out.extend_from_slice(b"MTrk");
    out.extend_from_slice(&track_len.to_be_bytes());
    out.extend_from_slice(&track);
    Ok(out)
}

pub fn write_midi(
    notes: &[Note],
    sample_rate: u32,
    path: &Path,
    config: &MidiConfig,
) -> Result<()> {
    let bytes = midi_bytes(notes, sample_rate, config)?;
    std::fs::write(path, &bytes).map_err(|e| MelexError::io("writing MIDI file", e))?;
    let voiced = notes.iter().filter(|n| n.midi.is_some()).count();
    log::info!("Wrote {} notes to {}", voiced, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(onset: usize, offset: usize, midi: Option<u8>) -> Note {
        Note {
            onset,
            offset,
            onset_time: onset as f32 / 1000.0,
            offset_time: offset as f32 / 1000.0,
            frequency: 440.0,
            midi,
            tuning_offset: 0.0,
        }
    }

    fn vlq(value: u32) -> Vec<u8> {
        let mut out = Vec::new();
        push_vlq(&mut out, value);
        out
    }

    #[test]
    fn vlq_matches_the_smf_examples() {
        assert_eq!(vlq(0), vec![0x00]);
        assert_eq!(vlq(0x40), vec![0x40]);
        assert_eq!(vlq(0x7F), vec![0x7F]);
        assert_eq!(vlq(0x80), vec![0x81, 0x00]);
        assert_eq!(vlq(0x2000), vec![0xC0, 0x00]);
        assert_eq!(vlq(0x3FFF), vec![0xFF, 0x7F]);
        assert_eq!(vlq(0x4000), vec![0x81, 0x80, 0x00]);
        assert_eq!(vlq(0x0FFF_FFFF), vec![0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn header_is_format_zero_with_one_track() {
        let bytes = midi_bytes(&[], 1000, &MidiConfig::default()).unwrap();
        assert_eq!(&bytes[..4], b"MThd");
        assert_eq!(&bytes[4..8], &[0, 0, 0, 6]);
        assert_eq!(&bytes[8..10], &[0, 0]);
        assert_eq!(&bytes[10..12], &[0, 1]);
        assert_eq!(&bytes[12..14], &[0, 48]);
        assert_eq!(&bytes[14..18], b"MTrk");
        let len = u32::from_be_bytes([bytes[18], bytes[19], bytes[20], bytes[21]]) as usize;
        assert_eq!(bytes.len(), 22 + len);
        assert_eq!(&bytes[bytes.len() - 3..], &[0xFF, 0x2F, 0x00]);
    }

    #[test]
    fn notes_become_on_off_events_in_ticks() {
        // 120 bpm at 48 ticks per quarter is 96 ticks per second
        let notes = vec![note(500, 1000, Some(69)), note(1500, 2000, Some(71))];
        let bytes = midi_bytes(&notes, 1000, &MidiConfig::default()).unwrap();
        let track = &bytes[22..];
        assert_eq!(&track[..7], &[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]);
        assert_eq!(
            &track[7..23],
            &[48, 0x90, 69, 80, 48, 0x80, 69, 80, 48, 0x90, 71, 80, 48, 0x80, 71, 80]
        );
        assert_eq!(&track[23..], &[END_PADDING as u8, 0xFF, 0x2F, 0x00]);
    }

    #[test]
    fn unvoiced_notes_are_skipped() {
        let notes = vec![note(0, 500, None), note(1000, 1500, Some(60))];
        let bytes = midi_bytes(&notes, 1000, &MidiConfig::default()).unwrap();
        let track = &bytes[22..];
        // the rest before the voiced note counts from the start
        assert_eq!(&track[7..11], &[96, 0x90, 60, 80]);
    }

    #[test]
    fn rejects_bad_timing() {
        let config = MidiConfig {
            bpm: 0,
            ..Default::default()
        };
        assert!(midi_bytes(&[], 1000, &config).is_err());
        assert!(midi_bytes(&[], 0, &MidiConfig::default()).is_err());
    }

    #[test]
    fn writes_a_file() {
        let path = std::env::temp_dir().join(format!("melex-midi-{}.mid", std::process::id()));
        write_midi(&[note(0, 1000, Some(60))], 1000, &path, &MidiConfig::default()).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"MThd");
        let _ = std::fs::remove_file(&path);
    }
}
