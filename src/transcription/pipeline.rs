//! # Utterance Transcription
//!
//! Runs one finished utterance through the container and the engine:
//! canonical PCM → WAV → `f32` samples → engine (on the blocking pool) → text.

use crate::audio::container::{decode_wav, wrap_wav};
use crate::error::{AppError, AppResult};
use crate::transcription::engine::SpeechEngine;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Transcribe the complete audio of one utterance.
///
/// ## Parameters:
/// - **engine**: Shared speech engine
/// - **model**: The connection's model id
/// - **pcm**: Canonical 16kHz 16-bit mono bytes (may be empty)
///
/// ## Returns:
/// - **Ok(text)**: The engine's text (possibly empty)
/// - **Err(AppError::Container)**: The WAV round trip failed
/// - **Err(AppError::Inference)**: The engine failed or its worker panicked
pub async fn transcribe_utterance(
    engine: Arc<dyn SpeechEngine>,
    model: Arc<str>,
    pcm: Vec<u8>,
) -> AppResult<String> {
    let wav = wrap_wav(&pcm)?;
    let samples = decode_wav(&wav)?;

    let start_time = Instant::now();
    let output = tokio::task::spawn_blocking(move || engine.transcribe(&samples, &model))
        .await
        .map_err(|e| AppError::Inference(format!("inference worker failed: {}", e)))??;

    debug!(
        "Transcribed {:.2}s of audio with {} in {}ms ({:.3}s including hand-off)",
        output.audio_duration,
        output.model_name,
        output.processing_time_ms,
        start_time.elapsed().as_secs_f64()
    );
    info!("{}", output.text);

    Ok(output.text)
}
