//! Audio capture from microphone
//!
//! The cpal callback applies gain, clips, downmixes to mono and pushes one
//! [`AudioFrame`] per hardware period into a [`FrameQueue`]. The control loop
//! drains that queue through [`FrameSource::read`].

use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};

use super::device::{self, DeviceDescriptor};
use super::{AudioFrame, FrameQueue};
use crate::{Error, Result};

/// Anything the turn controller can pull frames from
pub trait FrameSource {
    /// Wait up to `timeout` for the next frame
    ///
    /// `None` is the normal "no data yet" signal.
    fn read(&mut self, timeout: Duration) -> Option<AudioFrame>;

    /// Stop producing frames and discard anything buffered
    fn stop(&mut self);
}

/// Per-callback sample conditioning
#[derive(Debug, Clone, Copy)]
pub struct FrameProcessor {
    gain: f32,
    channels: usize,
}

impl FrameProcessor {
    #[must_use]
    pub fn new(gain: f32, channels: u16) -> Self {
        Self {
            gain,
            channels: usize::from(channels.max(1)),
        }
    }

    /// Apply gain, clip to [-1.0, 1.0] and average interleaved channels to mono
    ///
    /// Converts straight from the device sample type, so the only allocation
    /// is the returned frame buffer.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn process<T>(&self, interleaved: &[T]) -> Box<[f32]>
    where
        T: Sample,
        f32: FromSample<T>,
    {
        let gain = self.gain;
        let condition = |s: T| (s.to_sample::<f32>() * gain).clamp(-1.0, 1.0);

        if self.channels == 1 {
            return interleaved.iter().map(|&s| condition(s)).collect();
        }

        let width = self.channels as f32;
        interleaved
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().map(|&s| condition(s)).sum::<f32>() / width)
            .collect()
    }
}

/// Captures audio from a selected input device
pub struct AudioCapture {
    queue: FrameQueue,
    gain: f32,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Create an idle capture that will apply `gain` and buffer up to
    /// `queue_capacity` frames
    #[must_use]
    pub fn new(gain: f32, queue_capacity: usize) -> Self {
        Self {
            queue: FrameQueue::new(queue_capacity),
            gain,
            stream: None,
        }
    }

    /// Open the hardware stream and start the callback
    ///
    /// Calling `start` on a running capture is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Capture`] if the stream cannot be built or started
    pub fn start(
        &mut self,
        device: &DeviceDescriptor,
        channels: u16,
        sample_rate: u32,
    ) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let cpal_device =
            device::device_at(device.index).map_err(|e| Error::Capture(e.to_string()))?;
        let actual_name = cpal_device.name().unwrap_or_default();
        if actual_name != device.name {
            tracing::warn!(
                expected = %device.name,
                found = %actual_name,
                "device order changed since enumeration"
            );
        }

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Default,
        };
        let sample_format = cpal_device
            .default_input_config()
            .map_or(SampleFormat::F32, |c| c.sample_format());

        tracing::debug!(
            device = %device.name,
            sample_rate,
            channels,
            format = ?sample_format,
            "opening input stream"
        );

        let processor = FrameProcessor::new(self.gain, channels);
        let queue = self.queue.clone();

        let stream = match sample_format {
            SampleFormat::F32 => {
                build_stream::<f32>(&cpal_device, &config, processor, queue, sample_rate)
            }
            SampleFormat::I16 => {
                build_stream::<i16>(&cpal_device, &config, processor, queue, sample_rate)
            }
            SampleFormat::U16 => {
                build_stream::<u16>(&cpal_device, &config, processor, queue, sample_rate)
            }
            other => Err(Error::Capture(format!("unsupported sample format {other:?}"))),
        }?;

        stream.play().map_err(|e| Error::Capture(e.to_string()))?;

        self.queue.clear();
        self.stream = Some(stream);

        tracing::info!(device = %device.name, sample_rate, channels, "audio capture started");
        Ok(())
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Frames evicted because the control loop fell behind
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.queue.dropped()
    }
}

impl FrameSource for AudioCapture {
    fn read(&mut self, timeout: Duration) -> Option<AudioFrame> {
        if self.stream.is_none() {
            return None;
        }
        self.queue.pop(timeout)
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::info!(dropped = self.queue.dropped(), "audio capture stopped");
        }
        let discarded = self.queue.clear();
        if discarded > 0 {
            tracing::debug!(discarded, "flushed residual frames");
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    processor: FrameProcessor,
    queue: FrameQueue,
    sample_rate: u32,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if queue.push(AudioFrame::new(processor.process(data), sample_rate)) {
                    tracing::trace!("frame queue full, evicted oldest frame");
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Capture(e.to_string()))
}
