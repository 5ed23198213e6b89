//! Audio playback to speakers

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use super::device::{self, DeviceDescriptor};
use crate::{Error, Result};

/// Mono PCM clip decoded from a WAV file
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Plays clips on one output device, blocking until each finishes
pub struct AudioPlayback {
    device: Device,
}

impl AudioPlayback {
    /// Use the given device, or the host default when `None`
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new(output: Option<&DeviceDescriptor>) -> Result<Self> {
        let device = match output {
            Some(desc) => device::device_at(desc.index)?,
            None => cpal::default_host()
                .default_output_device()
                .ok_or_else(|| Error::Audio("no output device available".to_string()))?,
        };

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self { device })
    }

    /// Play a clip and wait until it has drained
    ///
    /// # Errors
    ///
    /// Returns error if no output config matches the clip or the stream fails
    pub fn play(&self, clip: &Clip) -> Result<()> {
        if clip.samples.is_empty() {
            return Ok(());
        }

        let config = self.output_config(clip.sample_rate)?;
        let channels = usize::from(config.channels);

        let samples: Arc<[f32]> = clip.samples.clone().into();
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            self.device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Relaxed);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < samples.len() {
                                pos += 1;
                            }
                        }
                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Poll for completion with timeout
        let duration_ms = (samples.len() as u64 * 1000) / u64::from(clip.sample_rate.max(1));
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Relaxed) {
            if start.elapsed() > timeout {
                tracing::warn!("playback did not drain before timeout");
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Small delay to ensure audio finishes
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = samples.len(), "playback complete");

        Ok(())
    }

    /// Find a mono or stereo f32 config at the clip's rate
    fn output_config(&self, sample_rate: u32) -> Result<StreamConfig> {
        let rate = SampleRate(sample_rate);
        let supports = |channels: u16| {
            self.device.supported_output_configs().ok().and_then(|mut configs| {
                configs.find(|c| {
                    c.channels() == channels
                        && c.sample_format() == cpal::SampleFormat::F32
                        && c.min_sample_rate() <= rate
                        && c.max_sample_rate() >= rate
                })
            })
        };

        supports(1)
            .or_else(|| supports(2))
            .map(|c| c.with_sample_rate(rate).config())
            .ok_or_else(|| {
                Error::Audio(format!("no suitable output config at {sample_rate} Hz"))
            })
    }
}

/// Decode a WAV byte buffer to a mono f32 clip
///
/// # Errors
///
/// Returns error if the bytes are not a readable WAV stream
pub fn decode_wav(bytes: &[u8]) -> Result<Clip> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = f32::from(1u16 << 15) * 2f32.powi(i32::from(spec.bits_per_sample) - 16);
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| sample_i32_to_f32(v, scale)))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    #[allow(clippy::cast_precision_loss)]
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(Clip {
        samples,
        sample_rate: spec.sample_rate,
    })
}

#[allow(clippy::cast_precision_loss)]
fn sample_i32_to_f32(value: i32, scale: f32) -> f32 {
    value as f32 / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_mono_wav() {
        let clip = decode_wav(&wav_bytes(&[0, 16384, -16384, -32768], 1, 22_050)).unwrap();

        assert_eq!(clip.sample_rate, 22_050);
        assert_eq!(clip.samples.len(), 4);
        assert!((clip.samples[1] - 0.5).abs() < 1e-4);
        assert!((clip.samples[3] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_stereo_downmixes() {
        let clip = decode_wav(&wav_bytes(&[16384, 0, -16384, -16384], 2, 16_000)).unwrap();

        assert_eq!(clip.samples.len(), 2);
        assert!((clip.samples[0] - 0.25).abs() < 1e-4);
        assert!((clip.samples[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_wav(b"definitely not a wav").is_err());
    }
}
