//! Immutable mono audio frames

use std::time::Duration;

/// One block of mono `f32` samples as delivered by a capture callback
///
/// Frames are created once by the producer and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Box<[f32]>,
    sample_rate: u32,
}

impl AudioFrame {
    /// Wrap already-normalized mono samples
    #[must_use]
    pub fn new(samples: impl Into<Box<[f32]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Mono samples in [-1.0, 1.0]
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Wall-clock span covered by this frame
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Root-mean-square amplitude, used as a cheap voice-activity proxy
    #[must_use]
    pub fn rms(&self) -> f32 {
        calculate_rms(&self.samples)
    }

    /// Convert to 16-bit PCM for the decoder
    #[must_use]
    pub fn to_pcm16(&self) -> Vec<i16> {
        self.samples.iter().map(|&s| sample_to_i16(s)).collect()
    }
}

/// Calculate RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Convert f32 [-1.0, 1.0] to i16
#[allow(clippy::cast_possible_truncation)]
fn sample_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_calculation() {
        let silence = AudioFrame::new(vec![0.0f32; 100], 16_000);
        assert!(silence.rms() < 0.001);

        let loud = AudioFrame::new(vec![0.5f32; 100], 16_000);
        assert!(loud.rms() > 0.4);

        assert!(calculate_rms(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_duration() {
        let frame = AudioFrame::new(vec![0.0f32; 1600], 16_000);
        assert_eq!(frame.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_pcm16_conversion_saturates() {
        let frame = AudioFrame::new(vec![0.0, 1.0, -1.0, 0.5, 2.0], 16_000);
        assert_eq!(frame.to_pcm16(), vec![0, 32767, -32767, 16383, 32767]);
    }
}
