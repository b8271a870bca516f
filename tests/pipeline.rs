use std::f32::consts::PI;

use melex::audio::stft::{stft, StftConfig};
use melex::pitch::bana::{find_candidates, BanaParams, SMOOTH_HZ};
use melex::transient::{DetectionConfig, PickingConfig};
use melex::{compile_notes, extract_pitch, pairwise_transient_detection};
use melex::{AudioBuffer, NoteConfig, PitchStrategy, TransientConfig};

const RATE: u32 = 16000;

fn push_tone(samples: &mut Vec<f32>, freq: f32, seconds: f32) {
    let n = (seconds * RATE as f32) as usize;
    samples.extend((0..n).map(|i| 0.5 * (2.0 * PI * freq * i as f32 / RATE as f32).sin()));
}

fn push_silence(samples: &mut Vec<f32>, seconds: f32) {
    let n = (seconds * RATE as f32) as usize;
    samples.extend(std::iter::repeat(0.0).take(n));
}

/// 0.3s silence, 200Hz for 1s, 0.1s gap, 400Hz for 1s, 0.3s silence.
fn two_tones() -> (AudioBuffer, [usize; 4]) {
    let mut samples = Vec::new();
    push_silence(&mut samples, 0.3);
    let a = samples.len();
    push_tone(&mut samples, 200.0, 1.0);
    let b = samples.len();
    push_silence(&mut samples, 0.1);
    let c = samples.len();
    push_tone(&mut samples, 400.0, 1.0);
    let d = samples.len();
    push_silence(&mut samples, 0.3);
    (AudioBuffer::new(samples, RATE), [a, b, c, d])
}

fn config(drop_trailing_pair: bool) -> TransientConfig {
    TransientConfig {
        detection: DetectionConfig {
            num_channels: 16,
            max_freq: 3000.0,
            ..Default::default()
        },
        picking: PickingConfig {
            drop_trailing_pair,
            ..Default::default()
        },
        analysis_rate: None,
    }
}

fn assert_near(found: &[usize], truth: &[usize]) {
    let tolerance = RATE as usize / 20;
    for (f, t) in found.iter().zip(truth) {
        assert!(
            f.abs_diff(*t) <= tolerance,
            "transient {} too far from boundary {} ({:?})",
            f,
            t,
            found
        );
    }
}

#[test]
fn unpadded_two_tones_with_default_config() {
    // 200Hz for 1s, 0.1s silence, 400Hz for 1s, nothing before or after
    let mut samples = Vec::new();
    push_tone(&mut samples, 200.0, 1.0);
    push_silence(&mut samples, 0.1);
    push_tone(&mut samples, 400.0, 1.0);
    let audio = AudioBuffer::new(samples, RATE);

    let transients = pairwise_transient_detection(&audio, &TransientConfig::default()).unwrap();
    assert_eq!(transients.len(), 4, "{:?}", transients);
    assert_near(&transients, &[0, 16000, 17600, 33600]);
}

#[test]
fn default_picking_gives_one_pair_per_tone() {
    let (audio, boundaries) = two_tones();
    let transients = pairwise_transient_detection(&audio, &config(true)).unwrap();
    assert_eq!(transients.len(), 4, "{:?}", transients);
    assert_near(&transients, &boundaries);
}

#[test]
fn kept_closing_pair_lies_past_the_audio() {
    let (audio, boundaries) = two_tones();
    let transients = pairwise_transient_detection(&audio, &config(false)).unwrap();
    assert_eq!(transients.len(), 6, "{:?}", transients);
    assert_near(&transients[..4], &boundaries);
    assert!(transients[4] > boundaries[3]);
    assert!(transients[5] > audio.samples.len(), "{:?}", transients);
}

#[test]
fn tone_after_silence_gives_one_onset() {
    let mut samples = Vec::new();
    push_silence(&mut samples, 0.5);
    push_tone(&mut samples, 300.0, 1.0);
    let audio = AudioBuffer::new(samples, RATE);

    let transients = pairwise_transient_detection(&audio, &config(true)).unwrap();
    assert_eq!(transients.len(), 2, "{:?}", transients);
    assert_near(&transients, &[8000, 24000]);
}

#[test]
fn two_tones_compile_to_two_notes() {
    let (audio, _) = two_tones();
    let transients = pairwise_transient_detection(&audio, &config(true)).unwrap();
    let track = extract_pitch(&audio, &StftConfig::default(), &PitchStrategy::BanaGeneral).unwrap();
    let notes = compile_notes(&transients, &track, &NoteConfig::default()).unwrap();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].midi, Some(55));
    assert_eq!(notes[1].midi, Some(67));
    assert!(notes.iter().all(|n| n.duration() > 0.9 && n.duration() < 1.1));
}

#[test]
fn bana_finds_a_pure_440hz_tone() {
    let rate = 8000;
    let samples: Vec<f32> = (0..rate as usize)
        .map(|i| 0.5 * (2.0 * PI * 440.0 * i as f32 / rate as f32).sin())
        .collect();
    let stft_config = StftConfig {
        window_size: 1024,
        fft_size: 4096,
        hop: 512,
    };
    let spec = stft(&samples, rate, &stft_config).unwrap();
    let params = BanaParams {
        harmonics: 1,
        f0_min: 100.0,
        f0_max: 1000.0,
        ..BanaParams::general(spec.bins_for_hz(SMOOTH_HZ))
    };
    let candidates = find_candidates(&spec, &params).unwrap();
    assert_eq!(candidates.len(), spec.num_windows());

    let middle = candidates.window(candidates.len() / 2);
    let top = middle.iter().max_by_key(|c| c.confidence).unwrap();
    assert!(
        (top.frequency - 440.0).abs() <= spec.bin_width(),
        "top candidate {:?}",
        top
    );
    assert!(top.confidence >= 1);
}
