//! Wake phrase matching
//!
//! The wake recognizer runs with a closed grammar, but its output is still
//! checked here: a final transcript counts as a wake only if it contains one
//! of the configured phrases, case-insensitively.

use crate::{Error, Result};

/// Case-insensitive substring matcher over the configured wake phrases
#[derive(Debug, Clone)]
pub struct WakeMatcher {
    phrases: Vec<String>,
}

impl WakeMatcher {
    /// Create a matcher for the given phrases
    ///
    /// # Arguments
    ///
    /// * `phrases` - Wake phrases to detect (e.g., "hey jarvis")
    ///
    /// # Errors
    ///
    /// Returns error if no non-empty phrase remains after normalization
    pub fn new(phrases: &[String]) -> Result<Self> {
        let normalized: Vec<String> = phrases
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        if normalized.is_empty() {
            return Err(Error::Config("at least one wake phrase is required".to_string()));
        }

        tracing::debug!(wake_phrases = ?normalized, "wake matcher initialized");

        Ok(Self {
            phrases: normalized,
        })
    }

    /// Return the first configured phrase contained in `transcript`
    #[must_use]
    pub fn find(&self, transcript: &str) -> Option<&str> {
        let normalized = transcript.to_lowercase();
        self.phrases
            .iter()
            .find(|phrase| normalized.contains(phrase.as_str()))
            .map(String::as_str)
    }

    /// Check if transcribed text contains a wake phrase
    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        self.find(transcript).is_some()
    }

    /// Normalized phrases, also used as the wake recognizer's grammar
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}
