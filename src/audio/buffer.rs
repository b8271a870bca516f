use crate::error::{MelexError, Result};

/// Mono audio handed to the analysis stages. Samples are expected in [-1, 1].
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(MelexError::invalid("sample rate must be positive"));
        }
        validate_samples(&self.samples)
    }
}

/// Reject samples that are non-finite or outside [-1, 1].
pub fn validate_samples(samples: &[f32]) -> Result<()> {
    if let Some((i, s)) = samples
        .iter()
        .enumerate()
        .find(|(_, s)| !s.is_finite() || s.abs() > 1.0)
    {
        return Err(MelexError::invalid(format!(
            "sample {} is {}, expected a finite value in [-1, 1]",
            i, s
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_unit_range() {
        let audio = AudioBuffer::new(vec![-1.0, 0.0, 0.5, 1.0], 8000);
        assert!(audio.validate().is_ok());
        assert!((audio.duration() - 0.0005).abs() < 1e-9);
    }

    #[test]
    fn rejects_out_of_range_and_nan() {
        assert!(validate_samples(&[0.0, 1.5]).is_err());
        assert!(validate_samples(&[f32::NAN]).is_err());
        assert!(AudioBuffer::new(vec![0.0], 0).validate().is_err());
    }
}
