//! Voice processing module
//!
//! Handles device selection, audio capture, the frame handoff queue,
//! endpointing, wake phrase matching and spoken output.

mod capture;
pub mod device;
mod endpoint;
mod frame;
mod playback;
mod queue;
mod tts;
mod wake_word;

pub use capture::{AudioCapture, FrameProcessor, FrameSource};
pub use device::{DeviceDescriptor, list_devices, select_input_device, select_output_device};
pub use endpoint::{Endpoint, Endpointer, UtteranceState, VoiceActivity};
pub use frame::{AudioFrame, calculate_rms};
pub use playback::{AudioPlayback, Clip, decode_wav};
pub use queue::FrameQueue;
pub use tts::{EspeakSpeaker, MutedSpeaker, Speaker, prepare_text};
pub use wake_word::WakeMatcher;
