//! Vosk (Kaldi) offline decoder backend

use std::path::Path;

use serde_json::json;
use vosk::{CompleteResult, DecodingState, Model, Recognizer};

use super::{Decoder, RecognizerBackend};
use crate::{Error, Result};

/// Loaded Vosk model shared by every session
pub struct VoskBackend {
    model: Model,
    sample_rate: f32,
}

impl VoskBackend {
    /// Load a model directory
    ///
    /// # Errors
    ///
    /// Returns error if the directory does not hold a usable model
    #[allow(clippy::cast_precision_loss)]
    pub fn load(path: &Path, sample_rate: u32) -> Result<Self> {
        tracing::info!(path = %path.display(), "loading vosk model");
        let model = Model::new(path.to_string_lossy()).ok_or_else(|| {
            Error::Decoder(format!("failed to load vosk model from {}", path.display()))
        })?;
        tracing::info!("vosk model loaded");

        Ok(Self {
            model,
            sample_rate: sample_rate as f32,
        })
    }
}

impl RecognizerBackend for VoskBackend {
    fn grammar_decoder(&self, phrases: &[String]) -> Result<Box<dyn Decoder>> {
        let recognizer = Recognizer::new_with_grammar(&self.model, self.sample_rate, phrases)
            .ok_or_else(|| Error::Decoder("failed to build grammar recognizer".to_string()))?;
        Ok(Box::new(VoskDecoder(recognizer)))
    }

    fn open_decoder(&self) -> Result<Box<dyn Decoder>> {
        let recognizer = Recognizer::new(&self.model, self.sample_rate)
            .ok_or_else(|| Error::Decoder("failed to build recognizer".to_string()))?;
        Ok(Box::new(VoskDecoder(recognizer)))
    }
}

struct VoskDecoder(Recognizer);

impl Decoder for VoskDecoder {
    fn accept_waveform(&mut self, pcm: &[i16]) -> Result<bool> {
        match self.0.accept_waveform(pcm) {
            Ok(DecodingState::Finalized) => Ok(true),
            Ok(DecodingState::Running) => Ok(false),
            Ok(DecodingState::Failed) => Err(Error::Decoder("decoding failed".to_string())),
            Err(e) => Err(Error::Decoder(e.to_string())),
        }
    }

    fn result(&mut self) -> String {
        complete_json(&self.0.result())
    }

    fn partial_result(&mut self) -> String {
        json!({ "partial": self.0.partial_result().partial }).to_string()
    }

    fn final_result(&mut self) -> String {
        complete_json(&self.0.final_result())
    }
}

fn complete_json(result: &CompleteResult<'_>) -> String {
    let text = match result {
        CompleteResult::Single(single) => single.text,
        CompleteResult::Multiple(multiple) => {
            multiple.alternatives.first().map_or("", |alt| alt.text)
        }
    };
    json!({ "text": text }).to_string()
}
