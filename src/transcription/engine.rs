//! # Speech Engine
//!
//! The seam between the Wyoming server and the recognizer. The server only
//! ever calls [`SpeechEngine::transcribe`]; [`WhisperEngine`] is the
//! production implementation and tests substitute their own.
//!
//! ## Key Responsibilities:
//! - **Model lookup**: Route each call to the preloaded model it names
//! - **Result metadata**: Report audio duration and processing time
//! - **Serialization**: One decode per model at a time (decoder caches are mutable)

use crate::audio::SAMPLE_RATE;
use crate::device::{device_label, DevicePreference};
use crate::error::{AppError, AppResult};
use crate::transcription::model::WhisperModel;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info};

/// Settings for loading the Whisper engine.
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    /// Model id as advertised to clients
    pub model: String,

    pub device: DevicePreference,

    /// Fixed transcription language, or `None` for auto-detection
    pub language: Option<String>,
}

/// Result of one engine call.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EngineOutput {
    pub text: String,

    /// Seconds of audio transcribed
    pub audio_duration: f64,

    pub processing_time_ms: u64,

    pub model_name: String,
}

/// A synchronous, blocking speech-to-text engine.
///
/// Called from `tokio::task::spawn_blocking`, never on the async runtime.
pub trait SpeechEngine: Send + Sync {
    /// ## Parameters:
    /// - **samples**: 16kHz mono audio in `[-1.0, 1.0)`, possibly empty
    /// - **model**: The model id the connection was configured with
    fn transcribe(&self, samples: &[f32], model: &str) -> AppResult<EngineOutput>;
}

/// Whisper models preloaded at startup, keyed by model id.
pub struct WhisperEngine {
    models: HashMap<String, Mutex<WhisperModel>>,
}

impl WhisperEngine {
    /// Load the configured model. Downloads it on first use.
    pub async fn load(config: &TranscriptionConfig) -> AppResult<Self> {
        let device = config.device.resolve();
        info!(
            "Loading speech engine on {}",
            device_label(&device)
        );

        let model = WhisperModel::load(&config.model, device, config.language.as_deref()).await?;

        let mut models = HashMap::new();
        models.insert(config.model.clone(), Mutex::new(model));
        Ok(Self { models })
    }

    /// Ids of the loaded models.
    pub fn model_ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

impl SpeechEngine for WhisperEngine {
    fn transcribe(&self, samples: &[f32], model: &str) -> AppResult<EngineOutput> {
        let start_time = Instant::now();
        let audio_duration = samples.len() as f64 / SAMPLE_RATE as f64;

        let slot = self
            .models
            .get(model)
            .ok_or_else(|| AppError::Inference(format!("model '{}' is not loaded", model)))?;

        let text = if samples.is_empty() {
            String::new()
        } else {
            let mut whisper = slot
                .lock()
                .map_err(|_| AppError::Inference(format!("model '{}' is poisoned", model)))?;
            debug!("Decoding {:.2}s of audio with {}", audio_duration, whisper.repo());
            whisper.transcribe(samples)?
        };

        Ok(EngineOutput {
            text,
            audio_duration,
            processing_time_ms: start_time.elapsed().as_millis() as u64,
            model_name: model.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_is_inference_error() {
        let engine = WhisperEngine {
            models: HashMap::new(),
        };
        let err = engine.transcribe(&[0.0; 160], "tiny").unwrap_err();
        assert!(matches!(err, AppError::Inference(_)));
        assert_eq!(engine.model_ids().count(), 0);
    }
}
