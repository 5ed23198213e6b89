//! Shared test utilities
//!
//! Hardware-free stand-ins for every collaborator the turn controller talks to.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use jarvis::voice::{AudioFrame, FrameSource, Speaker};
use jarvis::{
    Actuator, ActuatorCommand, ChatBackend, Clock, Config, Decoder, Error, RecognizerBackend,
    Result, ShutdownSignal, TurnController,
};

pub const SAMPLE_RATE: u32 = 16_000;

/// 100 ms of loud-enough audio to count as voice
#[must_use]
pub fn voice_frame() -> AudioFrame {
    AudioFrame::new(vec![0.1; 1600], SAMPLE_RATE)
}

/// 100 ms of digital silence
#[must_use]
pub fn silence_frame() -> AudioFrame {
    AudioFrame::new(vec![0.0; 1600], SAMPLE_RATE)
}

/// `n` copies of a frame
#[must_use]
pub fn frames(frame: &AudioFrame, n: usize) -> Vec<AudioFrame> {
    vec![frame.clone(); n]
}

/// Test clock moved forward by hand
#[derive(Clone)]
pub struct ManualClock(Arc<Mutex<Instant>>);

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Instant::now())))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.0.lock().unwrap()
    }
}

/// What a scripted decoder reports for one submitted frame
#[derive(Debug, Clone)]
pub enum Step {
    Silent,
    Partial(&'static str),
    Final(&'static str),
}

/// Per-frame steps for one decoder instance plus its flush text
#[derive(Debug, Clone, Default)]
pub struct DecoderScript {
    pub steps: Vec<Step>,
    pub final_text: &'static str,
}

impl DecoderScript {
    #[must_use]
    pub fn new(steps: Vec<Step>, final_text: &'static str) -> Self {
        Self { steps, final_text }
    }
}

struct ScriptedDecoder {
    steps: VecDeque<Step>,
    final_text: &'static str,
    pending: String,
}

impl Decoder for ScriptedDecoder {
    fn accept_waveform(&mut self, _pcm: &[i16]) -> Result<bool> {
        match self.steps.pop_front().unwrap_or(Step::Silent) {
            Step::Silent => {
                self.pending = r#"{"partial": ""}"#.to_string();
                Ok(false)
            }
            Step::Partial(text) => {
                self.pending = serde_json::json!({ "partial": text }).to_string();
                Ok(false)
            }
            Step::Final(text) => {
                self.pending = serde_json::json!({ "text": text }).to_string();
                Ok(true)
            }
        }
    }

    fn result(&mut self) -> String {
        std::mem::take(&mut self.pending)
    }

    fn partial_result(&mut self) -> String {
        self.pending.clone()
    }

    fn final_result(&mut self) -> String {
        serde_json::json!({ "text": self.final_text }).to_string()
    }
}

/// Hands out scripted decoders in order and records what was asked for
#[derive(Default)]
pub struct ScriptedBackend {
    wake_scripts: RefCell<VecDeque<DecoderScript>>,
    utterance_scripts: RefCell<VecDeque<DecoderScript>>,
    grammars: RefCell<Vec<Vec<String>>>,
    open_decoders: RefCell<usize>,
    open_limit: Option<usize>,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new(wake: Vec<DecoderScript>, utterance: Vec<DecoderScript>) -> Self {
        Self {
            wake_scripts: RefCell::new(wake.into()),
            utterance_scripts: RefCell::new(utterance.into()),
            ..Self::default()
        }
    }

    /// Fail every open decoder request after the first `n`
    #[must_use]
    pub fn fail_open_decoders_after(mut self, n: usize) -> Self {
        self.open_limit = Some(n);
        self
    }

    /// Grammars passed to each wake decoder, in creation order
    #[must_use]
    pub fn grammars(&self) -> Vec<Vec<String>> {
        self.grammars.borrow().clone()
    }

    #[must_use]
    pub fn open_decoders(&self) -> usize {
        *self.open_decoders.borrow()
    }

    fn build(script: Option<DecoderScript>) -> Box<dyn Decoder> {
        let script = script.unwrap_or_default();
        Box::new(ScriptedDecoder {
            steps: script.steps.into(),
            final_text: script.final_text,
            pending: String::new(),
        })
    }
}

impl RecognizerBackend for ScriptedBackend {
    fn grammar_decoder(&self, phrases: &[String]) -> Result<Box<dyn Decoder>> {
        self.grammars.borrow_mut().push(phrases.to_vec());
        Ok(Self::build(self.wake_scripts.borrow_mut().pop_front()))
    }

    fn open_decoder(&self) -> Result<Box<dyn Decoder>> {
        *self.open_decoders.borrow_mut() += 1;
        if self.open_limit.is_some_and(|limit| self.open_decoders() > limit) {
            return Err(Error::Decoder("scripted decoder failure".to_string()));
        }
        Ok(Self::build(self.utterance_scripts.borrow_mut().pop_front()))
    }
}

/// Replays frames, advancing the clock by each frame's span, and requests
/// shutdown once the script runs dry
pub struct ScriptedSource {
    frames: VecDeque<AudioFrame>,
    clock: ManualClock,
    shutdown: ShutdownSignal,
    stopped: Arc<AtomicBool>,
    remaining: Arc<Mutex<usize>>,
}

impl FrameSource for ScriptedSource {
    fn read(&mut self, timeout: Duration) -> Option<AudioFrame> {
        let frame = self.frames.pop_front();
        *self.remaining.lock().unwrap() = self.frames.len();
        match frame {
            Some(frame) => {
                self.clock.advance(frame.duration());
                Some(frame)
            }
            None => {
                self.clock.advance(timeout);
                self.shutdown.trigger();
                None
            }
        }
    }

    fn stop(&mut self) {
        self.frames.clear();
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Speaker that writes down every phrase
pub struct RecordingSpeaker(Arc<Mutex<Vec<String>>>);

impl Speaker for RecordingSpeaker {
    fn speak(&mut self, text: &str) -> Result<()> {
        self.0.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Chat backend with canned answers; `None` answers fail
pub struct ScriptedChat {
    answers: VecDeque<Option<&'static str>>,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ChatBackend for ScriptedChat {
    fn ask(&mut self, user_text: &str) -> Result<String> {
        self.asked.lock().unwrap().push(user_text.to_string());
        match self.answers.pop_front().flatten() {
            Some(answer) => Ok(answer.to_string()),
            None => Err(Error::Backend("scripted failure".to_string())),
        }
    }
}

/// Actuator that writes down every command
pub struct RecordingActuator(Arc<Mutex<Vec<ActuatorCommand>>>);

impl Actuator for RecordingActuator {
    fn send(&mut self, command: ActuatorCommand) -> Result<()> {
        self.0.lock().unwrap().push(command);
        Ok(())
    }
}

/// Owns the config, backend and every recording handle for one test
pub struct Harness {
    pub config: Config,
    pub backend: ScriptedBackend,
    pub clock: ManualClock,
    pub shutdown: ShutdownSignal,
    pub spoken: Arc<Mutex<Vec<String>>>,
    pub asked: Arc<Mutex<Vec<String>>>,
    pub sent: Arc<Mutex<Vec<ActuatorCommand>>>,
    pub stopped: Arc<AtomicBool>,
    pub remaining: Arc<Mutex<usize>>,
}

impl Harness {
    #[must_use]
    pub fn new(backend: ScriptedBackend) -> Self {
        Self {
            config: Config::default(),
            backend,
            clock: ManualClock::new(),
            shutdown: ShutdownSignal::new(),
            spoken: Arc::default(),
            asked: Arc::default(),
            sent: Arc::default(),
            stopped: Arc::default(),
            remaining: Arc::default(),
        }
    }

    /// Build a controller over scripted frames and a scripted chat backend
    pub fn controller(
        &self,
        frames: Vec<AudioFrame>,
        answers: Vec<Option<&'static str>>,
        with_actuator: bool,
    ) -> TurnController<'_> {
        let chat = ScriptedChat {
            answers: answers.into(),
            asked: Arc::clone(&self.asked),
        };
        self.controller_with_chat(frames, Box::new(chat), with_actuator)
    }

    /// Build a controller over scripted frames and any chat backend
    pub fn controller_with_chat<'a>(
        &'a self,
        frames: Vec<AudioFrame>,
        chat: Box<dyn ChatBackend + 'a>,
        with_actuator: bool,
    ) -> TurnController<'a> {
        let speaker = Box::new(RecordingSpeaker(Arc::clone(&self.spoken)));
        self.assemble(frames, chat, speaker, with_actuator)
    }

    /// Build a controller with scripted chat answers and any speaker
    pub fn controller_with_speaker<'a>(
        &'a self,
        frames: Vec<AudioFrame>,
        answers: Vec<Option<&'static str>>,
        speaker: Box<dyn Speaker + 'a>,
    ) -> TurnController<'a> {
        let chat = ScriptedChat {
            answers: answers.into(),
            asked: Arc::clone(&self.asked),
        };
        self.assemble(frames, Box::new(chat), speaker, false)
    }

    fn assemble<'a>(
        &'a self,
        frames: Vec<AudioFrame>,
        chat: Box<dyn ChatBackend + 'a>,
        speaker: Box<dyn Speaker + 'a>,
        with_actuator: bool,
    ) -> TurnController<'a> {
        *self.remaining.lock().unwrap() = frames.len();
        let source = ScriptedSource {
            frames: frames.into(),
            clock: self.clock.clone(),
            shutdown: self.shutdown.clone(),
            stopped: Arc::clone(&self.stopped),
            remaining: Arc::clone(&self.remaining),
        };
        let actuator: Option<Box<dyn Actuator + 'a>> = with_actuator
            .then(|| Box::new(RecordingActuator(Arc::clone(&self.sent))) as Box<dyn Actuator + 'a>);

        TurnController::new(&self.config, &self.backend, Box::new(source), speaker, chat)
            .unwrap()
            .with_actuator(actuator)
            .with_clock(Box::new(self.clock.clone()))
    }

    #[must_use]
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    #[must_use]
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<ActuatorCommand> {
        self.sent.lock().unwrap().clone()
    }

    #[must_use]
    pub fn remaining_frames(&self) -> usize {
        *self.remaining.lock().unwrap()
    }
}

/// Chat endpoint that accepts one request and answers only after `delay`
pub fn slow_chat_server(delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/api/chat", listener.local_addr().unwrap());

    std::thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        let mut reader = BufReader::new(stream);
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                break;
            }
            if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                content_length = v.trim().parse().unwrap_or(0);
            }
        }
        let mut body = vec![0u8; content_length];
        let _ = reader.read_exact(&mut body);

        std::thread::sleep(delay);
        let answer = r#"{"message":{"content":"too late"}}"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{answer}",
            answer.len()
        );
        let _ = reader.into_inner().write_all(response.as_bytes());
    });

    url
}
