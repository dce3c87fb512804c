//! # Utterance Buffer
//!
//! Append-only storage for the canonical audio of one utterance. A session
//! owns exactly one; it is appended to while audio streams in and drained in
//! one piece at `audio-stop`.
//!
//! ## Key Features:
//! - **Canonical only**: Holds normalizer output, never raw client bytes
//! - **Single owner**: Lives inside the connection's task, so no locking
//! - **Drain and reset**: `take` hands the bytes over and leaves it empty
//! - **Bounded**: Growing past [`MAX_UTTERANCE_BYTES`] is an audio error

use crate::audio::{SAMPLE_RATE, SAMPLE_WIDTH};
use crate::error::{AppError, AppResult};

/// Longest utterance kept in memory: 10 minutes of canonical audio.
pub const MAX_UTTERANCE_BYTES: usize = 10 * 60 * SAMPLE_RATE as usize * SAMPLE_WIDTH as usize;

#[derive(Debug, Default)]
pub struct UtteranceBuffer {
    /// 16kHz 16-bit mono little-endian PCM
    bytes: Vec<u8>,
}

impl UtteranceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append normalized audio.
    ///
    /// ## Returns:
    /// - **Ok(true)**: This was the first audio of the utterance
    /// - **Ok(false)**: Appended to audio already buffered
    /// - **Err(AppError::Audio)**: The utterance would exceed its size limit
    pub fn append(&mut self, canonical: &[u8]) -> AppResult<bool> {
        self.check_room(canonical.len() as u64)?;
        let first = self.bytes.is_empty() && !canonical.is_empty();
        self.bytes.extend_from_slice(canonical);
        Ok(first)
    }

    /// Fail if `additional` more bytes would not fit.
    pub fn check_room(&self, additional: u64) -> AppResult<()> {
        if self.bytes.len() as u64 + additional > MAX_UTTERANCE_BYTES as u64 {
            return Err(AppError::Audio(format!(
                "utterance exceeds {} bytes ({:.0}s of audio)",
                MAX_UTTERANCE_BYTES,
                MAX_UTTERANCE_BYTES as f64 / (SAMPLE_RATE as f64 * SAMPLE_WIDTH as f64)
            )));
        }
        Ok(())
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Move the accumulated audio out, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    /// Duration of the buffered audio in seconds.
    pub fn duration_seconds(&self) -> f64 {
        let samples = self.bytes.len() / SAMPLE_WIDTH as usize;
        samples as f64 / SAMPLE_RATE as f64
    }
}
