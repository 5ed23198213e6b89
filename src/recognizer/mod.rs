//! Streaming speech recognition sessions
//!
//! A [`Decoder`] is the opaque streaming engine: it takes 16-bit PCM and
//! reports JSON results carrying a `text` (final) or `partial` field. A
//! [`RecognizerSession`] owns one decoder for one recognition pass and turns
//! its output into [`StepResult`]s.

#[cfg(feature = "vosk")]
mod vosk;

use std::str::FromStr;

use serde::Deserialize;

use crate::config::Config;
use crate::voice::AudioFrame;
use crate::{Error, Result};

#[cfg(feature = "vosk")]
pub use self::vosk::VoskBackend;

/// Streaming decoder interface
///
/// Feed 16 kHz-class mono S16LE PCM. `accept_waveform` returns `true` when
/// the decoder closed a segment, after which [`Decoder::result`] holds it.
pub trait Decoder {
    /// Submit PCM samples
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decoder`] if the engine rejects the audio
    fn accept_waveform(&mut self, pcm: &[i16]) -> Result<bool>;

    /// JSON for the segment just closed, e.g. `{"text": "turn left"}`
    fn result(&mut self) -> String;

    /// JSON for the open segment, e.g. `{"partial": "turn"}`
    fn partial_result(&mut self) -> String;

    /// Flush buffered audio and return the remaining JSON result
    fn final_result(&mut self) -> String;
}

/// Builds decoders for the two recognition phases
pub trait RecognizerBackend {
    /// Decoder restricted to a closed grammar of phrases
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot build a recognizer
    fn grammar_decoder(&self, phrases: &[String]) -> Result<Box<dyn Decoder>>;

    /// Open-vocabulary decoder
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot build a recognizer
    fn open_decoder(&self) -> Result<Box<dyn Decoder>>;
}

/// Load the decoder backend compiled into this build
///
/// # Errors
///
/// Returns error if the model cannot be loaded or no backend is compiled in
#[cfg(feature = "vosk")]
pub fn load_backend(config: &Config) -> Result<Box<dyn RecognizerBackend>> {
    let backend = VoskBackend::load(&config.recognizer.model_path, config.audio.sample_rate)?;
    Ok(Box::new(backend))
}

/// Load the decoder backend compiled into this build
///
/// # Errors
///
/// Always fails: this build has no decoder backend
#[cfg(not(feature = "vosk"))]
pub fn load_backend(_config: &Config) -> Result<Box<dyn RecognizerBackend>> {
    Err(Error::Config(
        "no speech decoder compiled in; rebuild with `--features vosk`".to_string(),
    ))
}

/// Outcome of feeding one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// The open segment's hypothesis changed
    Partial(String),
    /// The decoder closed a segment
    Final(String),
    /// Nothing new
    NoUpdate,
}

/// One decoder instance for one recognition pass
///
/// Frames must be submitted in capture order. [`RecognizerSession::finalize`]
/// consumes the session; a new pass needs a new session.
pub struct RecognizerSession {
    decoder: Box<dyn Decoder>,
    last_partial: String,
    frames: u64,
}

impl RecognizerSession {
    /// Session restricted to the wake phrases
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot build a grammar decoder
    pub fn wake(backend: &dyn RecognizerBackend, phrases: &[String]) -> Result<Self> {
        let decoder = backend.grammar_decoder(phrases)?;
        tracing::debug!(grammar = ?phrases, "wake session created");
        Ok(Self::from_decoder(decoder))
    }

    /// Open-vocabulary session for a full utterance
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot build a decoder
    pub fn utterance(backend: &dyn RecognizerBackend) -> Result<Self> {
        let decoder = backend.open_decoder()?;
        tracing::debug!("utterance session created");
        Ok(Self::from_decoder(decoder))
    }

    #[must_use]
    pub fn from_decoder(decoder: Box<dyn Decoder>) -> Self {
        Self {
            decoder,
            last_partial: String::new(),
            frames: 0,
        }
    }

    /// Feed the next frame
    ///
    /// Decoder failures and malformed output degrade to [`StepResult::NoUpdate`].
    pub fn submit(&mut self, frame: &AudioFrame) -> StepResult {
        self.frames += 1;
        let pcm = frame.to_pcm16();

        match self.decoder.accept_waveform(&pcm) {
            Ok(true) => {
                self.last_partial.clear();
                StepResult::Final(result_text(&self.decoder.result()))
            }
            Ok(false) => {
                let partial = partial_text(&self.decoder.partial_result());
                if partial.is_empty() || partial == self.last_partial {
                    StepResult::NoUpdate
                } else {
                    self.last_partial.clone_from(&partial);
                    StepResult::Partial(partial)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, frame = self.frames, "decoder rejected frame");
                StepResult::NoUpdate
            }
        }
    }

    /// Flush the decoder and return whatever text remains
    #[must_use]
    pub fn finalize(mut self) -> String {
        let text = result_text(&self.decoder.final_result());
        tracing::debug!(frames = self.frames, text = %text, "session finalized");
        text
    }

    /// Frames submitted so far
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.frames
    }
}

#[derive(Debug, Default, Deserialize)]
struct DecoderOutput {
    #[serde(default)]
    text: String,
    #[serde(default)]
    partial: String,
}

fn parse_output(json: &str) -> DecoderOutput {
    serde_json::from_str(json).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "malformed decoder output");
        DecoderOutput::default()
    })
}

/// Extract the `text` field of a final result; malformed input yields ""
#[must_use]
pub fn result_text(json: &str) -> String {
    parse_output(json).text.trim().to_string()
}

/// Extract the `partial` field of a partial result; malformed input yields ""
#[must_use]
pub fn partial_text(json: &str) -> String {
    parse_output(json).partial.trim().to_string()
}

/// How text collected during capture is combined into the transcript
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TranscriptPolicy {
    /// Closed segments plus the finalize text. The newest partial is used
    /// only when both are empty.
    #[default]
    Segments,
    /// Every partial, every segment and the finalize text in arrival order.
    /// Repeats words the decoder already reported; opt-in only.
    Concatenate,
}

impl FromStr for TranscriptPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "segments" => Ok(Self::Segments),
            "concatenate" => Ok(Self::Concatenate),
            other => Err(Error::Config(format!(
                "unknown transcript policy '{other}' (expected segments or concatenate)"
            ))),
        }
    }
}

/// Collects step results for one utterance according to a policy
#[derive(Debug, Clone)]
pub struct TranscriptAccumulator {
    policy: TranscriptPolicy,
    parts: Vec<String>,
    latest_partial: String,
}

impl TranscriptAccumulator {
    #[must_use]
    pub const fn new(policy: TranscriptPolicy) -> Self {
        Self {
            policy,
            parts: Vec::new(),
            latest_partial: String::new(),
        }
    }

    /// Record one step result
    pub fn record(&mut self, step: &StepResult) {
        match (step, self.policy) {
            (StepResult::Final(text), _) => {
                self.latest_partial.clear();
                push_nonempty(&mut self.parts, text);
            }
            (StepResult::Partial(text), TranscriptPolicy::Segments) => {
                self.latest_partial.clone_from(text);
            }
            (StepResult::Partial(text), TranscriptPolicy::Concatenate) => {
                self.latest_partial.clone_from(text);
                push_nonempty(&mut self.parts, text);
            }
            (StepResult::NoUpdate, _) => {}
        }
    }

    /// Text gathered so far, without the finalize output
    #[must_use]
    pub fn snapshot(&self) -> String {
        self.parts.join(" ")
    }

    /// Combine with the session's finalize text
    #[must_use]
    pub fn finish(mut self, final_text: &str) -> String {
        push_nonempty(&mut self.parts, final_text);
        if self.parts.is_empty() && self.policy == TranscriptPolicy::Segments {
            return self.latest_partial.trim().to_string();
        }
        self.parts.join(" ").trim().to_string()
    }
}

fn push_nonempty(parts: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        parts.push(text.to_string());
    }
}
