//! # Transcription Module
//!
//! Speech-to-text using Whisper models via the Candle framework, in pure
//! Rust without FFI bindings to whisper.cpp.
//!
//! ## Key Components:
//! - **Engine**: The `SpeechEngine` trait and its Whisper implementation
//! - **Model**: Hub download, weight loading and greedy decoding
//! - **Mel**: The Slaney mel filter bank for feature extraction
//! - **Pipeline**: Turns a finished utterance buffer into text
//!
//! ## Whisper Model Sizes:
//! - **tiny**: ~39MB, fastest but least accurate
//! - **base**: ~74MB, good balance for development
//! - **small**: ~244MB, better accuracy
//! - **medium**: ~769MB, good technical vocabulary
//! - **large-v3-turbo**: ~1.6GB, near large-v3 accuracy at a fraction of the decode cost

pub mod engine;      // SpeechEngine trait and WhisperEngine
pub mod mel;         // Mel filter bank
pub mod model;       // Whisper model loading and decoding
pub mod pipeline;    // Utterance → text

pub use engine::{EngineOutput, SpeechEngine, TranscriptionConfig, WhisperEngine};
pub use pipeline::transcribe_utterance;
