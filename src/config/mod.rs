//! Configuration management for the voice loop
//!
//! A single immutable [`Config`] is resolved once at startup and passed by
//! reference to every component. Resolution order is env > toml > default.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::recognizer::TranscriptPolicy;
use crate::{Error, Result};

use file::JarvisConfigFile;

/// Default system prompt for the chat backend
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Jarvis, a small offline voice assistant running on a low-power device. \
You must always be brief, concrete, and stay strictly on topic. \
Rules: \
1) Treat each user utterance independently; you do not have long-term memory. \
2) Respond with at most one or two short sentences. \
3) Do not ask the user questions unless they clearly asked you something first. \
4) Never introduce new topics, stories, philosophy, or questions the user did not mention. \
5) If the user just greets you (e.g. 'hi', 'hello'), reply with a simple greeting only. \
6) If you are unsure or lack information, say you are not sure instead of making things up.";

/// Jarvis configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Microphone and capture settings
    pub audio: AudioConfig,

    /// Wake phrases, lowercased and trimmed
    pub wake: WakeConfig,

    /// Endpointing thresholds
    pub endpoint: EndpointConfig,

    /// Speech recognizer settings
    pub recognizer: RecognizerConfig,

    /// Chat backend settings
    pub chat: ChatConfig,

    /// Speech synthesis settings
    pub tts: TtsConfig,

    /// Serial actuator settings
    pub actuator: ActuatorConfig,

    /// Fixed spoken phrases
    pub phrases: Phrases,
}

/// Audio capture configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Substring matched against input device names (empty = no preference)
    pub input_device: String,

    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Wanted input channel count
    pub channels: u16,

    /// Software gain applied in the capture callback
    pub gain: f32,

    /// Frames the handoff queue holds before evicting the oldest
    pub queue_capacity: usize,

    /// How long one read waits before reporting "no data yet"
    pub read_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct WakeConfig {
    pub phrases: Vec<String>,
}

/// Endpointing thresholds
#[derive(Debug, Clone, Copy)]
pub struct EndpointConfig {
    /// RMS above this counts as voice
    pub silence_threshold: f32,

    /// Trailing silence after voice that ends capture
    pub silence_duration_end: Duration,

    /// Hard ceiling on capture length
    pub max_utterance: Duration,
}

#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    pub model_path: PathBuf,
    pub transcript_policy: TranscriptPolicy,
}

/// Chat backend configuration (Ollama `/api/chat`)
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub url: String,
    pub model: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub num_predict: u32,
    pub system_prompt: String,
}

#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub program: String,
    pub rate_wpm: u32,
    pub output_device: String,
}

#[derive(Debug, Clone)]
pub struct ActuatorConfig {
    pub enabled: bool,
    pub port: Option<String>,
    pub baud: u32,
    pub swap_turns: bool,
    pub reset_delay: Duration,
}

/// Phrases spoken at fixed points of a turn
#[derive(Debug, Clone)]
pub struct Phrases {
    /// Spoken once at startup
    pub online: String,

    /// Spoken when the wake phrase is heard
    pub acknowledge: String,

    /// Spoken when the utterance transcript is empty
    pub not_heard: String,

    /// Spoken when the chat backend fails or answers with nothing
    pub backend_failure: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig {
                input_device: String::new(),
                sample_rate: 16_000,
                channels: 1,
                gain: 2.0,
                queue_capacity: 256,
                read_timeout: Duration::from_secs(1),
            },
            wake: WakeConfig {
                phrases: vec!["jarvis".to_string(), "hey jarvis".to_string()],
            },
            endpoint: EndpointConfig {
                silence_threshold: 0.004,
                silence_duration_end: Duration::from_millis(2500),
                max_utterance: Duration::from_secs(15),
            },
            recognizer: RecognizerConfig {
                model_path: PathBuf::from("models/vosk-model-small-en-us-0.15"),
                transcript_policy: TranscriptPolicy::default(),
            },
            chat: ChatConfig {
                url: "http://localhost:11434/api/chat".to_string(),
                model: "smollm:135m".to_string(),
                timeout: Duration::from_secs(15),
                temperature: 0.35,
                num_predict: 64,
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            },
            tts: TtsConfig {
                program: "espeak".to_string(),
                rate_wpm: 180,
                output_device: String::new(),
            },
            actuator: ActuatorConfig {
                enabled: true,
                port: None,
                baud: 9600,
                swap_turns: true,
                reset_delay: Duration::from_secs(2),
            },
            phrases: Phrases {
                online: "Jarvis online. Say my name when you need me.".to_string(),
                acknowledge: "Yes?".to_string(),
                not_heard: "I didn't catch that. Please try again.".to_string(),
                backend_failure: "I'm having trouble thinking right now.".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from the environment and the TOML file
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is unreadable or any value is invalid
    pub fn load(explicit_file: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(explicit_file)?;
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed file with environment overrides on top of defaults
    ///
    /// # Errors
    ///
    /// Returns error if any resolved value is out of range
    pub fn resolve(fc: JarvisConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();

        let audio = AudioConfig {
            input_device: env("JARVIS_INPUT_DEVICE")
                .or(fc.audio.input_device)
                .unwrap_or(d.audio.input_device),
            sample_rate: fc.audio.sample_rate.unwrap_or(d.audio.sample_rate),
            channels: fc.audio.channels.unwrap_or(d.audio.channels),
            gain: fc.audio.gain.unwrap_or(d.audio.gain),
            queue_capacity: fc.audio.queue_capacity.unwrap_or(d.audio.queue_capacity),
            read_timeout: seconds(
                "audio.read_timeout_secs",
                fc.audio.read_timeout_secs,
                d.audio.read_timeout,
            )?,
        };

        let phrases: Vec<String> = fc
            .wake
            .phrases
            .unwrap_or(d.wake.phrases)
            .into_iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        let endpoint = EndpointConfig {
            silence_threshold: fc
                .endpoint
                .silence_threshold
                .unwrap_or(d.endpoint.silence_threshold),
            silence_duration_end: seconds(
                "endpoint.silence_duration_end_secs",
                fc.endpoint.silence_duration_end_secs,
                d.endpoint.silence_duration_end,
            )?,
            max_utterance: seconds(
                "endpoint.max_utterance_secs",
                fc.endpoint.max_utterance_secs,
                d.endpoint.max_utterance,
            )?,
        };

        let transcript_policy = match fc.recognizer.transcript_policy {
            Some(s) => s.parse()?,
            None => d.recognizer.transcript_policy,
        };
        let recognizer = RecognizerConfig {
            model_path: env("JARVIS_MODEL_PATH")
                .or(fc.recognizer.model_path)
                .map_or(d.recognizer.model_path, PathBuf::from),
            transcript_policy,
        };

        let chat = ChatConfig {
            url: env("JARVIS_CHAT_URL").or(fc.chat.url).unwrap_or(d.chat.url),
            model: env("JARVIS_CHAT_MODEL")
                .or(fc.chat.model)
                .unwrap_or(d.chat.model),
            timeout: seconds("chat.timeout_secs", fc.chat.timeout_secs, d.chat.timeout)?,
            temperature: fc.chat.temperature.unwrap_or(d.chat.temperature),
            num_predict: fc.chat.num_predict.unwrap_or(d.chat.num_predict),
            system_prompt: fc.chat.system_prompt.unwrap_or(d.chat.system_prompt),
        };

        let tts = TtsConfig {
            program: fc.tts.program.unwrap_or(d.tts.program),
            rate_wpm: fc.tts.rate_wpm.unwrap_or(d.tts.rate_wpm),
            output_device: env("JARVIS_OUTPUT_DEVICE")
                .or(fc.tts.output_device)
                .unwrap_or(d.tts.output_device),
        };

        let actuator = ActuatorConfig {
            enabled: env("JARVIS_ACTUATOR")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.actuator.enabled)
                .unwrap_or(d.actuator.enabled),
            port: env("JARVIS_SERIAL_PORT").or(fc.actuator.port),
            baud: fc.actuator.baud.unwrap_or(d.actuator.baud),
            swap_turns: fc.actuator.swap_turns.unwrap_or(d.actuator.swap_turns),
            reset_delay: seconds(
                "actuator.reset_delay_secs",
                fc.actuator.reset_delay_secs,
                d.actuator.reset_delay,
            )?,
        };

        let phrases_cfg = Phrases {
            online: fc.phrases.online.unwrap_or(d.phrases.online),
            acknowledge: fc.phrases.acknowledge.unwrap_or(d.phrases.acknowledge),
            not_heard: fc.phrases.not_heard.unwrap_or(d.phrases.not_heard),
            backend_failure: fc
                .phrases
                .backend_failure
                .unwrap_or(d.phrases.backend_failure),
        };

        let config = Self {
            audio,
            wake: WakeConfig { phrases },
            endpoint,
            recognizer,
            chat,
            tts,
            actuator,
            phrases: phrases_cfg,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that the pipeline depends on
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be positive".to_string()));
        }
        if self.audio.channels == 0 {
            return Err(Error::Config("audio.channels must be at least 1".to_string()));
        }
        if !self.audio.gain.is_finite() || self.audio.gain <= 0.0 {
            return Err(Error::Config("audio.gain must be a positive number".to_string()));
        }
        if self.audio.queue_capacity == 0 {
            return Err(Error::Config("audio.queue_capacity must be at least 1".to_string()));
        }
        if self.audio.read_timeout.is_zero() || self.audio.read_timeout > MAX_READ_TIMEOUT {
            return Err(Error::Config(format!(
                "audio.read_timeout_secs must be positive and at most {}",
                MAX_READ_TIMEOUT.as_secs()
            )));
        }
        if self.wake.phrases.is_empty() {
            return Err(Error::Config("wake.phrases must contain at least one phrase".to_string()));
        }
        if !self.endpoint.silence_threshold.is_finite() || self.endpoint.silence_threshold < 0.0 {
            return Err(Error::Config(
                "endpoint.silence_threshold must be a non-negative number".to_string(),
            ));
        }
        if self.endpoint.silence_duration_end.is_zero() || self.endpoint.max_utterance.is_zero() {
            return Err(Error::Config("endpoint durations must be positive".to_string()));
        }
        if self.chat.timeout.is_zero() {
            return Err(Error::Config("chat.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Longest frame wait; also bounds how late a shutdown request is noticed
const MAX_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Convert an optional seconds value, keeping the default when unset
fn seconds(key: &str, value: Option<f64>, default: Duration) -> Result<Duration> {
    value.map_or(Ok(default), |secs| {
        Duration::try_from_secs_f64(secs)
            .map_err(|_| Error::Config(format!("{key} must be a non-negative number of seconds")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_match_device_tuning() {
        let config = Config::resolve(JarvisConfigFile::default(), no_env).unwrap();

        assert_eq!(config.audio.sample_rate, 16_000);
        assert_eq!(config.audio.channels, 1);
        assert!((config.audio.gain - 2.0).abs() < f32::EPSILON);
        assert_eq!(config.wake.phrases, vec!["jarvis", "hey jarvis"]);
        assert_eq!(config.endpoint.silence_duration_end, Duration::from_millis(2500));
        assert_eq!(config.endpoint.max_utterance, Duration::from_secs(15));
        assert_eq!(config.chat.timeout, Duration::from_secs(15));
        assert_eq!(config.recognizer.transcript_policy, TranscriptPolicy::Segments);
    }

    #[test]
    fn test_env_overrides_file() {
        let fc: JarvisConfigFile =
            toml::from_str("[audio]\ninput_device = \"file mic\"\n[chat]\nmodel = \"file-model\"")
                .unwrap();
        let config = Config::resolve(fc, |key| match key {
            "JARVIS_INPUT_DEVICE" => Some("env mic".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.audio.input_device, "env mic");
        assert_eq!(config.chat.model, "file-model");
    }

    #[test]
    fn test_wake_phrases_normalized() {
        let fc: JarvisConfigFile =
            toml::from_str("[wake]\nphrases = [\"  Hey JARVIS \", \"\", \"Computer\"]").unwrap();
        let config = Config::resolve(fc, no_env).unwrap();

        assert_eq!(config.wake.phrases, vec!["hey jarvis", "computer"]);
    }

    #[test]
    fn test_empty_wake_phrases_rejected() {
        let fc: JarvisConfigFile = toml::from_str("[wake]\nphrases = [\" \"]").unwrap();
        assert!(matches!(Config::resolve(fc, no_env), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for toml_src in [
            "[audio]\nsample_rate = 0",
            "[audio]\nqueue_capacity = 0",
            "[audio]\ngain = -1.0",
            "[audio]\nread_timeout_secs = 0.0",
            "[audio]\nread_timeout_secs = 1e12",
            "[endpoint]\nmax_utterance_secs = -3.0",
            "[endpoint]\nsilence_duration_end_secs = 0.0",
            "[recognizer]\ntranscript_policy = \"whatever\"",
        ] {
            let fc: JarvisConfigFile = toml::from_str(toml_src).unwrap();
            assert!(Config::resolve(fc, no_env).is_err(), "accepted: {toml_src}");
        }
    }

    #[test]
    fn test_actuator_env_toggle() {
        let config = Config::resolve(JarvisConfigFile::default(), |key| {
            (key == "JARVIS_ACTUATOR").then(|| "false".to_string())
        })
        .unwrap();
        assert!(!config.actuator.enabled);
    }
}
