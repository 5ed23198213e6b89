//! TOML configuration file loading
//!
//! Supports `~/.config/jarvis/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JarvisConfigFile {
    /// Microphone and capture settings
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Wake phrase settings
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Endpointing thresholds
    #[serde(default)]
    pub endpoint: EndpointFileConfig,

    /// Speech recognizer settings
    #[serde(default)]
    pub recognizer: RecognizerFileConfig,

    /// Chat backend settings
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Speech synthesis settings
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Serial actuator settings
    #[serde(default)]
    pub actuator: ActuatorFileConfig,

    /// Fixed spoken phrases
    #[serde(default)]
    pub phrases: PhrasesFileConfig,
}

/// Audio capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Substring that must appear in the preferred microphone's name
    pub input_device: Option<String>,
    /// Capture sample rate in Hz
    pub sample_rate: Option<u32>,
    /// Wanted input channels (clamped to what the device offers)
    pub channels: Option<u16>,
    /// Software gain applied before clipping
    pub gain: Option<f32>,
    /// Frames buffered between callback and control loop
    pub queue_capacity: Option<usize>,
    /// How long one read waits for a frame, in seconds
    pub read_timeout_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    pub phrases: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EndpointFileConfig {
    /// RMS level above which a frame counts as voice
    pub silence_threshold: Option<f32>,
    /// Trailing silence that ends an utterance, in seconds
    pub silence_duration_end_secs: Option<f64>,
    /// Hard ceiling on utterance length, in seconds
    pub max_utterance_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecognizerFileConfig {
    /// Path to the decoder model directory
    pub model_path: Option<String>,
    /// "segments" or "concatenate"
    pub transcript_policy: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    pub url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<f64>,
    pub temperature: Option<f32>,
    pub num_predict: Option<u32>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Synthesizer executable (espeak or espeak-ng)
    pub program: Option<String>,
    /// Speaking rate in words per minute
    pub rate_wpm: Option<u32>,
    /// Substring that must appear in the preferred speaker's name
    pub output_device: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActuatorFileConfig {
    pub enabled: Option<bool>,
    /// Explicit serial port, e.g. `/dev/ttyACM0`
    pub port: Option<String>,
    pub baud: Option<u32>,
    /// Send `R` for left and `L` for right
    pub swap_turns: Option<bool>,
    /// Delay after opening the port while the board resets, in seconds
    pub reset_delay_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PhrasesFileConfig {
    pub online: Option<String>,
    pub acknowledge: Option<String>,
    pub not_heard: Option<String>,
    pub backend_failure: Option<String>,
}

/// Load the TOML config file
///
/// An explicit path must exist and parse. The default path is optional:
/// a missing or unreadable file falls back to defaults.
///
/// # Errors
///
/// Returns error if an explicitly requested file cannot be read or parsed
pub fn load_config_file(explicit: Option<&Path>) -> Result<JarvisConfigFile> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(JarvisConfigFile::default());
    };

    if !path.exists() {
        return Ok(JarvisConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(JarvisConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            Ok(JarvisConfigFile::default())
        }
    }
}

/// Return the config file path: `~/.config/jarvis/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("jarvis").join("config.toml"))
}
