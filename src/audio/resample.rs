use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::buffer::AudioBuffer;
use crate::error::{MelexError, Result};

/// Flush passes allowed before giving up on filling the predicted length.
const MAX_FLUSHES: usize = 64;

/// Output length for `len` input samples at `ratio`, `round(len * ratio)`.
pub fn predicted_length(len: usize, ratio: f64) -> Result<usize> {
    check_ratio(ratio)?;
    let predicted = (len as f64 * ratio).round();
    if predicted > i32::MAX as f64 {
        return Err(MelexError::invalid(format!(
            "resampled length {} overflows the supported range",
            predicted
        )));
    }
    Ok(predicted as usize)
}

fn check_ratio(ratio: f64) -> Result<()> {
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(MelexError::invalid(format!(
            "resample ratio must be positive, got {}",
            ratio
        )));
    }
    Ok(())
}

/// Band-limited resampling by `ratio` (> 1 upsamples).
///
/// The sinc resampler's group delay is removed, and the result is trimmed or
/// zero-padded to [`predicted_length`].
pub fn resample(samples: &[f32], ratio: f64) -> Result<Vec<f32>> {
    let target_len = predicted_length(samples.len(), ratio)?;

    if ratio == 1.0 {
        return Ok(samples.to_vec());
    }
    if samples.is_empty() || target_len == 0 {
        return Ok(Vec::new());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(MelexError::resample)?;
    let delay = resampler.output_delay();
    let wanted = delay + target_len;

    let mut output = Vec::new();
    crate::error::reserve(&mut output, wanted)?;

    let first = resampler
        .process(&[samples], None)
        .map_err(MelexError::resample)?;
    output.extend_from_slice(&first[0]);

    let mut flushes = 0;
    while output.len() < wanted && flushes < MAX_FLUSHES {
        let tail = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(MelexError::resample)?;
        if tail[0].is_empty() {
            break;
        }
        output.extend_from_slice(&tail[0]);
        flushes += 1;
    }

    let produced = output.len().saturating_sub(delay);
    if produced != target_len {
        log::debug!(
            "Resampler produced {} samples, reconciling to {}",
            produced,
            target_len
        );
    }

    let mut result: Vec<f32> = output.into_iter().skip(delay).take(target_len).collect();
    result.resize(target_len, 0.0);
    result.shrink_to_fit();
    Ok(result)
}

/// Resample a buffer to `target_rate`.
pub fn resample_buffer(audio: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if audio.sample_rate == 0 || target_rate == 0 {
        return Err(MelexError::invalid("sample rates must be positive"));
    }
    if audio.sample_rate == target_rate {
        return Ok(audio.clone());
    }

    let ratio = target_rate as f64 / audio.sample_rate as f64;
    log::info!(
        "Resampling {}Hz -> {}Hz ({} samples)",
        audio.sample_rate,
        target_rate,
        audio.samples.len()
    );
    let samples = resample(&audio.samples, ratio)?;
    Ok(AudioBuffer::new(samples, target_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|s| s * s).sum::<f32>() / x.len() as f32).sqrt()
    }

    #[test]
    fn unit_ratio_is_identity() {
        let x = sine(440.0, 8000.0, 1001);
        let y = resample(&x, 1.0).unwrap();
        assert!((y.len() as i64 - x.len() as i64).abs() <= 1);
        let mae: f32 = x.iter().zip(&y).map(|(a, b)| (a - b).abs()).sum::<f32>() / x.len() as f32;
        assert!(mae < 1e-7);
    }

    #[test]
    fn up_and_down_lengths_match_prediction() {
        let x = sine(100.0, 8000.0, 4000);
        let up = resample(&x, 2.0).unwrap();
        assert_eq!(up.len(), 8000);
        let down = resample(&x, 0.5).unwrap();
        assert_eq!(down.len(), 2000);
    }

    #[test]
    fn upsampling_keeps_amplitude() {
        let x = sine(100.0, 8000.0, 8000);
        let up = resample(&x, 2.0).unwrap();
        // skip edges where the sinc kernel sees zero padding
        let body = &up[2000..14000];
        assert!((rms(body) - 0.5 / 2f32.sqrt()).abs() < 0.02);
    }

    #[test]
    fn rejects_bad_ratio() {
        assert!(matches!(
            resample(&[0.0; 4], 0.0),
            Err(MelexError::InvalidArgument { .. })
        ));
        assert!(resample(&[0.0; 4], -1.0).is_err());
        assert!(resample(&[0.0; 4], f64::NAN).is_err());
    }

    #[test]
    fn predicted_length_overflow_is_rejected() {
        assert!(predicted_length(usize::MAX / 2, 4.0).is_err());
        assert_eq!(predicted_length(10, 1.25).unwrap(), 13);
    }

    #[test]
    fn buffer_resample_updates_rate() {
        let audio = AudioBuffer::new(sine(100.0, 8000.0, 800), 8000);
        let out = resample_buffer(&audio, 16000).unwrap();
        assert_eq!(out.sample_rate, 16000);
        assert_eq!(out.samples.len(), 1600);
    }
}
