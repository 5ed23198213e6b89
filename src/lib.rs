//! Jarvis - wake-phrase voice control loop for small robots
//!
//! This library provides the pieces of the loop:
//! - Audio device selection, capture and the frame handoff queue
//! - Streaming recognition sessions (wake grammar and open vocabulary)
//! - Energy-based endpointing
//! - Chat backend, speech output and the serial actuator
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │   cpal callback: gain → clip → mono → push   │
//! └──────────────────────┬───────────────────────┘
//!                        │ FrameQueue (drop-oldest)
//! ┌──────────────────────▼───────────────────────┐
//! │                TurnController                │
//! │  wake session → ack → utterance + endpointer │
//! └──────┬───────────────┬───────────────┬───────┘
//!        │               │               │
//!    Actuator        ChatBackend      Speaker
//!    (serial)         (Ollama)       (espeak)
//! ```

pub mod actuator;
pub mod chat;
pub mod config;
pub mod daemon;
pub mod error;
pub mod recognizer;
pub mod turn;
pub mod voice;

pub use actuator::{Actuator, ActuatorCommand, SerialActuator, parse_motion};
pub use chat::{ChatBackend, OllamaClient};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use recognizer::{
    Decoder, RecognizerBackend, RecognizerSession, StepResult, TranscriptAccumulator,
    TranscriptPolicy,
};
pub use turn::{
    ActiveSession, Clock, ShutdownSignal, SystemClock, TurnController, TurnOutcome, TurnPhase,
};
