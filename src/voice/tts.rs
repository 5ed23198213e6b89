//! Text-to-speech (TTS) output

use std::process::Command;

use super::playback::{AudioPlayback, decode_wav};
use crate::config::TtsConfig;
use crate::{Error, Result};

/// Synchronous speech sink
///
/// `speak` returns once playback has finished. Empty or whitespace-only text
/// is a no-op.
pub trait Speaker {
    /// Synthesize and play `text`
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    fn speak(&mut self, text: &str) -> Result<()>;
}

/// Local synthesis through the espeak command line
pub struct EspeakSpeaker {
    program: String,
    rate_wpm: u32,
    playback: AudioPlayback,
}

impl EspeakSpeaker {
    #[must_use]
    pub fn new(config: &TtsConfig, playback: AudioPlayback) -> Self {
        Self {
            program: config.program.clone(),
            rate_wpm: config.rate_wpm,
            playback,
        }
    }

    /// Run the synthesizer and collect its WAV output
    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let output = Command::new(&self.program)
            .arg("-s")
            .arg(self.rate_wpm.to_string())
            .arg("--stdout")
            .arg(text)
            .output()
            .map_err(|e| Error::Tts(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Tts(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

impl Speaker for EspeakSpeaker {
    fn speak(&mut self, text: &str) -> Result<()> {
        let Some(text) = prepare_text(text) else {
            return Ok(());
        };

        tracing::info!(text = %text, "speaking");
        let wav = self.synthesize(&text)?;
        let clip = decode_wav(&wav)?;
        self.playback.play(&clip)
    }
}

/// Stand-in used when no output device could be opened
///
/// Every non-blank phrase fails with [`Error::Tts`], so the turn loop logs it
/// and carries on without sound.
#[derive(Debug, Clone)]
pub struct MutedSpeaker {
    reason: String,
}

impl MutedSpeaker {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Speaker for MutedSpeaker {
    fn speak(&mut self, text: &str) -> Result<()> {
        if prepare_text(text).is_none() {
            return Ok(());
        }
        Err(Error::Tts(format!("speech output unavailable: {}", self.reason)))
    }
}

/// Trim and sanitize text for the synthesizer; `None` when nothing to say
#[must_use]
pub fn prepare_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.replace('"', "'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_text_is_skipped() {
        assert_eq!(prepare_text(""), None);
        assert_eq!(prepare_text("  \n\t "), None);
    }

    #[test]
    fn test_muted_speaker_reports_reason() {
        let mut speaker = MutedSpeaker::new("no output device");
        assert!(speaker.speak("   ").is_ok());
        match speaker.speak("Yes?") {
            Err(Error::Tts(msg)) => assert!(msg.contains("no output device")),
            other => panic!("expected Tts error, got {other:?}"),
        }
    }

    #[test]
    fn test_text_is_trimmed_and_quotes_replaced() {
        assert_eq!(
            prepare_text("  He said \"hi\"  ").as_deref(),
            Some("He said 'hi'")
        );
    }
}
