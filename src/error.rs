//! Error types for the Jarvis voice loop

use thiserror::Error;

/// Result type alias for Jarvis operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice loop
///
/// Only [`Error::NoInputDevice`], [`Error::Capture`] and decoder construction
/// failures abort the process. Everything else is recovered within a turn.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No device with at least one input channel exists
    #[error("no audio input device with input channels found")]
    NoInputDevice,

    /// Input stream could not be opened or started
    #[error("capture error: {0}")]
    Capture(String),

    /// Generic audio error (enumeration, playback)
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech decoder error
    #[error("decoder error: {0}")]
    Decoder(String),

    /// Chat backend returned an error status or unusable payload
    #[error("backend error: {0}")]
    Backend(String),

    /// Chat backend did not answer within the request timeout
    #[error("backend timed out after {0:?}")]
    BackendTimeout(std::time::Duration),

    /// Actuator link unavailable or write failed
    #[error("peripheral error: {0}")]
    Peripheral(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
