//! Daemon - wires real hardware into the turn controller
//!
//! Everything here is constructed on the thread that runs the loop: cpal
//! streams are not `Send`, so the caller moves the [`Daemon`] into a blocking
//! task and calls [`Daemon::run`] there.

use crate::actuator::{Actuator, SerialActuator};
use crate::chat::OllamaClient;
use crate::recognizer;
use crate::turn::{ShutdownSignal, TurnController};
use crate::voice::device::log_devices;
use crate::voice::{
    AudioCapture, AudioPlayback, DeviceDescriptor, EspeakSpeaker, MutedSpeaker, Speaker,
    list_devices, select_input_device, select_output_device,
};
use crate::{Config, Result};

/// The Jarvis daemon - owns configuration for one voice loop run
pub struct Daemon {
    config: Config,
}

impl Daemon {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Open devices, load the decoder and run turns until `shutdown` fires
    ///
    /// # Errors
    ///
    /// Returns error if no input device exists, the capture stream cannot be
    /// opened, or the decoder cannot be loaded
    pub fn run(self, shutdown: &ShutdownSignal) -> Result<()> {
        let config = &self.config;
        tracing::info!(
            wake = ?config.wake.phrases,
            model = %config.recognizer.model_path.display(),
            chat = %config.chat.url,
            "daemon starting"
        );

        let devices = list_devices()?;
        log_devices(&devices);

        let (input, channels) =
            select_input_device(&devices, &config.audio.input_device, config.audio.channels)?;

        // Decoder first: a bad model path should fail before the mic opens
        let backend = recognizer::load_backend(config)?;

        let output = select_output_device(&devices, &config.tts.output_device);
        if output.is_none() && !config.tts.output_device.is_empty() {
            tracing::warn!(
                preferred = %config.tts.output_device,
                "preferred output device not found, using default"
            );
        }
        let speaker = open_speaker(config, output);
        let chat = OllamaClient::new(&config.chat)?;
        let actuator = connect_actuator(config);

        let mut capture = AudioCapture::new(config.audio.gain, config.audio.queue_capacity);
        capture.start(&input, channels, config.audio.sample_rate)?;

        let mut controller = TurnController::new(
            config,
            backend.as_ref(),
            Box::new(capture),
            speaker,
            Box::new(chat),
        )?
        .with_actuator(actuator);

        let result = controller.run(shutdown);
        tracing::info!("daemon stopped");
        result
    }
}

/// Open the speech output; a missing device leaves the loop running silent
fn open_speaker(config: &Config, output: Option<&DeviceDescriptor>) -> Box<dyn Speaker> {
    match AudioPlayback::new(output) {
        Ok(playback) => Box::new(EspeakSpeaker::new(&config.tts, playback)),
        Err(e) => {
            tracing::warn!(error = %e, "audio output unavailable, continuing without speech");
            Box::new(MutedSpeaker::new(e.to_string()))
        }
    }
}

/// Open the actuator link if enabled; failures disable it
fn connect_actuator(config: &Config) -> Option<Box<dyn Actuator>> {
    if !config.actuator.enabled {
        tracing::info!("actuator disabled by configuration");
        return None;
    }

    match SerialActuator::connect(&config.actuator) {
        Ok(actuator) => Some(Box::new(actuator)),
        Err(e) => {
            tracing::warn!(error = %e, "actuator unavailable, motion commands disabled");
            None
        }
    }
}
