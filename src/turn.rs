//! Turn-taking state machine
//!
//! One controller owns the frame source, the active recognizer session and
//! every output collaborator. It runs on a single thread and loops
//! wait-for-wake → acknowledge → capture → dispatch until shut down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::actuator::{Actuator, ActuatorCommand, parse_motion};
use crate::chat::ChatBackend;
use crate::config::Config;
use crate::recognizer::{RecognizerBackend, RecognizerSession, StepResult, TranscriptAccumulator};
use crate::voice::{Endpoint, Endpointer, FrameSource, Speaker, WakeMatcher};
use crate::{Error, Result};

/// Where the controller is in a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    WaitingForWake,
    Acknowledged,
    CapturingUtterance,
    Dispatching,
}

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Shutdown was requested mid-turn
    Shutdown,
    /// Capture produced no text
    NotHeard,
    /// A motion command went to the actuator
    Motion(ActuatorCommand),
    /// The chat backend answered and the answer was spoken
    Answered,
    /// The chat backend failed and the fallback phrase was spoken
    BackendFailed,
}

/// The one recognizer session alive at a time
pub enum ActiveSession {
    Wake(RecognizerSession),
    Utterance(RecognizerSession),
}

impl ActiveSession {
    fn session_mut(&mut self) -> &mut RecognizerSession {
        match self {
            Self::Wake(s) | Self::Utterance(s) => s,
        }
    }

    fn into_session(self) -> RecognizerSession {
        match self {
            Self::Wake(s) | Self::Utterance(s) => s,
        }
    }

    #[must_use]
    pub const fn is_wake(&self) -> bool {
        matches!(self, Self::Wake(_))
    }
}

/// Time source for endpointing
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Cross-thread stop request
///
/// The control loop polls it once per frame read, so it exits within one
/// read timeout of [`ShutdownSignal::trigger`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives the voice loop over pluggable collaborators
pub struct TurnController<'a> {
    config: &'a Config,
    wake: WakeMatcher,
    backend: &'a dyn RecognizerBackend,
    source: Box<dyn FrameSource + 'a>,
    speaker: Box<dyn Speaker + 'a>,
    chat: Box<dyn ChatBackend + 'a>,
    actuator: Option<Box<dyn Actuator + 'a>>,
    clock: Box<dyn Clock + 'a>,
    phase: TurnPhase,
    session: Option<ActiveSession>,
}

impl<'a> TurnController<'a> {
    /// Create an idle controller with no actuator and the wall clock
    ///
    /// # Errors
    ///
    /// Returns error if the configured wake phrase list is empty
    pub fn new(
        config: &'a Config,
        backend: &'a dyn RecognizerBackend,
        source: Box<dyn FrameSource + 'a>,
        speaker: Box<dyn Speaker + 'a>,
        chat: Box<dyn ChatBackend + 'a>,
    ) -> Result<Self> {
        Ok(Self {
            config,
            wake: WakeMatcher::new(&config.wake.phrases)?,
            backend,
            source,
            speaker,
            chat,
            actuator: None,
            clock: Box::new(SystemClock),
            phase: TurnPhase::Idle,
            session: None,
        })
    }

    /// Attach the actuator link; `None` leaves motion and face cues disabled
    #[must_use]
    pub fn with_actuator(mut self, actuator: Option<Box<dyn Actuator + 'a>>) -> Self {
        self.actuator = actuator;
        self
    }

    /// Replace the wall clock used for endpointing
    #[must_use]
    pub fn with_clock(mut self, clock: Box<dyn Clock + 'a>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Kind of the live recognizer session, if any
    #[must_use]
    pub const fn active_session(&self) -> Option<&ActiveSession> {
        self.session.as_ref()
    }

    /// Announce readiness, run turns until shutdown, then release peripherals
    ///
    /// Once a turn has completed, a recognizer session that fails to build is
    /// logged, answered with the not-heard phrase and retried from wake
    /// detection.
    ///
    /// # Errors
    ///
    /// Returns error if a recognizer session cannot be built before the first
    /// turn completes
    pub fn run(&mut self, shutdown: &ShutdownSignal) -> Result<()> {
        self.actuate(ActuatorCommand::FaceBlink);
        let config = self.config;
        self.say(&config.phrases.online);

        let mut turns_completed = 0u64;
        let result = loop {
            match self.run_turn(shutdown) {
                Ok(TurnOutcome::Shutdown) => break Ok(()),
                Ok(outcome) => {
                    turns_completed += 1;
                    tracing::debug!(?outcome, turns_completed, "turn finished");
                }
                Err(e) if turns_completed > 0 => {
                    tracing::warn!(error = %e, "recognizer session failed, retrying");
                    self.session = None;
                    self.say(&config.phrases.not_heard);
                    self.set_phase(TurnPhase::WaitingForWake);
                    // Pace retries to the read timeout
                    let _ = self.source.read(config.audio.read_timeout);
                }
                Err(e) => break Err(e),
            }
        };

        self.shutdown();
        result
    }

    /// Run one full turn starting from wake detection
    ///
    /// # Errors
    ///
    /// Returns error only if a recognizer session cannot be built
    pub fn run_turn(&mut self, shutdown: &ShutdownSignal) -> Result<TurnOutcome> {
        if !self.wait_for_wake(shutdown)? {
            return Ok(TurnOutcome::Shutdown);
        }

        let config = self.config;
        self.set_phase(TurnPhase::Acknowledged);
        self.say(&config.phrases.acknowledge);

        let Some(transcript) = self.capture_utterance(shutdown)? else {
            return Ok(TurnOutcome::Shutdown);
        };

        if transcript.is_empty() {
            tracing::info!("no speech recognized");
            self.say(&config.phrases.not_heard);
            self.set_phase(TurnPhase::WaitingForWake);
            return Ok(TurnOutcome::NotHeard);
        }

        tracing::info!(transcript = %transcript, "user said");
        self.set_phase(TurnPhase::Dispatching);
        let outcome = self.dispatch(&transcript);
        self.set_phase(TurnPhase::WaitingForWake);
        Ok(outcome)
    }

    /// Feed frames into a fresh wake session until a final result names a
    /// wake phrase; `false` on shutdown
    fn wait_for_wake(&mut self, shutdown: &ShutdownSignal) -> Result<bool> {
        self.set_phase(TurnPhase::WaitingForWake);
        self.session = Some(ActiveSession::Wake(RecognizerSession::wake(
            self.backend,
            self.wake.phrases(),
        )?));
        tracing::info!("waiting for wake phrase");

        let timeout = self.config.audio.read_timeout;
        loop {
            if shutdown.is_triggered() {
                return Ok(false);
            }
            let Some(frame) = self.source.read(timeout) else {
                continue;
            };
            let Some(session) = self.session.as_mut() else {
                return Err(Error::Decoder("wake session missing".to_string()));
            };

            if let StepResult::Final(text) = session.session_mut().submit(&frame) {
                if text.is_empty() {
                    continue;
                }
                tracing::debug!(text = %text, "wake recognizer result");
                if let Some(phrase) = self.wake.find(&text) {
                    tracing::info!(phrase, "wake phrase detected");
                    self.session = None;
                    return Ok(true);
                }
            }
        }
    }

    /// Capture one utterance until an endpoint fires; `None` on shutdown
    fn capture_utterance(&mut self, shutdown: &ShutdownSignal) -> Result<Option<String>> {
        self.set_phase(TurnPhase::CapturingUtterance);
        self.session = Some(ActiveSession::Utterance(RecognizerSession::utterance(
            self.backend,
        )?));
        let mut endpointer = Endpointer::new(self.config.endpoint, self.clock.now());
        let mut transcript = TranscriptAccumulator::new(self.config.recognizer.transcript_policy);
        tracing::info!("listening for utterance");

        let timeout = self.config.audio.read_timeout;
        let endpoint = loop {
            if shutdown.is_triggered() {
                self.session = None;
                return Ok(None);
            }
            if endpointer.check(self.clock.now()) == Endpoint::MaxDuration {
                break Endpoint::MaxDuration;
            }
            let Some(frame) = self.source.read(timeout) else {
                continue;
            };
            let now = self.clock.now();
            endpointer.observe(frame.rms(), now);

            let Some(session) = self.session.as_mut() else {
                return Err(Error::Decoder("utterance session missing".to_string()));
            };
            let step = session.session_mut().submit(&frame);
            transcript.record(&step);
            endpointer.state_mut().transcript_so_far = transcript.snapshot();

            let endpoint = endpointer.check(now);
            if endpoint.is_end() {
                break endpoint;
            }
        };

        let state = endpointer.into_state();
        tracing::info!(
            ?endpoint,
            heard_voice = state.heard_any_voice,
            "utterance capture ended"
        );

        let final_text = self
            .session
            .take()
            .map(|s| s.into_session().finalize())
            .unwrap_or_default();
        Ok(Some(transcript.finish(&final_text)))
    }

    fn dispatch(&mut self, transcript: &str) -> TurnOutcome {
        if self.actuator.is_some()
            && let Some(command) = parse_motion(transcript)
        {
            tracing::info!(?command, "motion command");
            self.actuate(command);
            self.say(command.confirmation());
            self.actuate(ActuatorCommand::FaceBlink);
            return TurnOutcome::Motion(command);
        }

        self.actuate(ActuatorCommand::FaceThink);
        let started = Instant::now();
        let answer = self.chat.ask(transcript);
        self.actuate(ActuatorCommand::FaceBlink);

        match answer {
            Ok(answer) => {
                tracing::info!(
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    answer = %answer,
                    "assistant answered"
                );
                self.say(&answer);
                TurnOutcome::Answered
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat backend failed");
                let config = self.config;
                self.say(&config.phrases.backend_failure);
                TurnOutcome::BackendFailed
            }
        }
    }

    fn shutdown(&mut self) {
        tracing::info!("shutting down voice loop");
        self.session = None;
        self.source.stop();
        self.actuate(ActuatorCommand::Stop);
        self.actuate(ActuatorCommand::FaceBlink);
        self.set_phase(TurnPhase::Idle);
    }

    fn say(&mut self, text: &str) {
        if let Err(e) = self.speaker.speak(text) {
            tracing::warn!(error = %e, "speech output failed");
        }
    }

    fn actuate(&mut self, command: ActuatorCommand) {
        if let Some(actuator) = self.actuator.as_mut()
            && let Err(e) = actuator.send(command)
        {
            tracing::warn!(error = %e, ?command, "actuator command failed");
        }
    }

    fn set_phase(&mut self, phase: TurnPhase) {
        if self.phase != phase {
            tracing::debug!(from = ?self.phase, to = ?phase, "turn phase");
            self.phase = phase;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_signal_is_shared() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        assert!(!signal.is_triggered());
        clone.trigger();
        assert!(signal.is_triggered());
    }

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
