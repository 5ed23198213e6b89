//! Energy-based endpointing
//!
//! A frame is voice when its RMS exceeds a fixed threshold. Capture ends on
//! trailing silence after voice, or unconditionally at the duration ceiling.
//! There is no adaptive noise floor, so a loud room can keep capture open
//! until the ceiling.

use std::time::{Duration, Instant};

use crate::config::EndpointConfig;

/// Per-frame voice decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceActivity {
    Voice,
    Silence,
}

/// Whether capture should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Keep feeding frames
    Continue,
    /// Voice was heard, then silence lasted longer than the configured gap
    SilenceAfterSpeech,
    /// The utterance ceiling was reached
    MaxDuration,
}

impl Endpoint {
    #[must_use]
    pub const fn is_end(self) -> bool {
        !matches!(self, Self::Continue)
    }
}

/// Mutable state of one utterance capture
#[derive(Debug, Clone)]
pub struct UtteranceState {
    pub started_at: Instant,
    /// Equals `started_at` until voice is first observed
    pub last_voice_at: Instant,
    pub heard_any_voice: bool,
    pub transcript_so_far: String,
}

impl UtteranceState {
    #[must_use]
    pub const fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            last_voice_at: started_at,
            heard_any_voice: false,
            transcript_so_far: String::new(),
        }
    }
}

/// Decides when an utterance has ended
#[derive(Debug, Clone)]
pub struct Endpointer {
    config: EndpointConfig,
    state: UtteranceState,
}

impl Endpointer {
    /// Start tracking an utterance that begins at `started_at`
    #[must_use]
    pub const fn new(config: EndpointConfig, started_at: Instant) -> Self {
        Self {
            config,
            state: UtteranceState::new(started_at),
        }
    }

    /// Classify a frame by its RMS energy
    #[must_use]
    pub fn classify(&self, rms: f32) -> VoiceActivity {
        if rms > self.config.silence_threshold {
            VoiceActivity::Voice
        } else {
            VoiceActivity::Silence
        }
    }

    /// Record one frame's energy observed at `now`
    pub fn observe(&mut self, rms: f32, now: Instant) -> VoiceActivity {
        let activity = self.classify(rms);
        if activity == VoiceActivity::Voice {
            self.state.heard_any_voice = true;
            self.state.last_voice_at = now;
        }
        tracing::trace!(rms, ?activity, "endpointer frame");
        activity
    }

    /// Evaluate both termination conditions at `now`
    ///
    /// The duration ceiling takes precedence when both hold.
    #[must_use]
    pub fn check(&self, now: Instant) -> Endpoint {
        if self.elapsed(now) > self.config.max_utterance {
            return Endpoint::MaxDuration;
        }
        if self.state.heard_any_voice
            && now.saturating_duration_since(self.state.last_voice_at)
                > self.config.silence_duration_end
        {
            return Endpoint::SilenceAfterSpeech;
        }
        Endpoint::Continue
    }

    /// Time since capture began
    #[must_use]
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.state.started_at)
    }

    /// Progress of the utterance so far
    #[must_use]
    pub const fn state(&self) -> &UtteranceState {
        &self.state
    }

    pub const fn state_mut(&mut self) -> &mut UtteranceState {
        &mut self.state
    }

    /// Consume the endpointer, keeping only the utterance state
    #[must_use]
    pub fn into_state(self) -> UtteranceState {
        self.state
    }
}
