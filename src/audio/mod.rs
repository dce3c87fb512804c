//! # Audio Module
//!
//! Everything between a raw `audio-chunk` payload and the samples handed to
//! the speech engine.
//!
//! ## Key Components:
//! - **Normalizer**: Converts any PCM format to the canonical one, streaming
//! - **Utterance Buffer**: Accumulates canonical bytes until `audio-stop`
//! - **Container**: Wraps canonical PCM as WAV and decodes it to `f32`
//!
//! ## Canonical Format:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers

pub mod buffer;       // Per-utterance accumulation
pub mod container;    // WAV wrap/unwrap
pub mod normalizer;   // Rate, width and channel conversion

pub use buffer::UtteranceBuffer;
pub use normalizer::AudioNormalizer;

/// Sample rate Whisper expects.
pub const SAMPLE_RATE: u32 = 16000;

/// Bytes per canonical sample.
pub const SAMPLE_WIDTH: u16 = 2;

pub const CHANNELS: u16 = 1;

/// Lowest source rate accepted from clients.
pub const MIN_SOURCE_RATE: u32 = 1000;

/// Highest source rate accepted from clients.
pub const MAX_SOURCE_RATE: u32 = 384_000;

/// Format of a PCM stream as declared in `audio-chunk` data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Samples per second per channel
    pub rate: u32,

    /// Bytes per sample
    pub width: u16,

    /// Interleaved channel count
    pub channels: u16,
}

impl AudioFormat {
    /// 16kHz, 16-bit, mono.
    pub const CANONICAL: AudioFormat = AudioFormat::new(SAMPLE_RATE, SAMPLE_WIDTH, CHANNELS);

    pub const fn new(rate: u32, width: u16, channels: u16) -> Self {
        Self {
            rate,
            width,
            channels,
        }
    }

    /// Bytes per interleaved frame (one sample for every channel).
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    pub fn is_canonical(&self) -> bool {
        *self == Self::CANONICAL
    }

    /// Upper bound on the canonical bytes `len` input bytes normalize to.
    ///
    /// Exact for a fresh stream; a stream already in progress never yields
    /// more. Degenerate formats count as one byte per frame at 1Hz so the
    /// bound stays finite; the normalizer rejects them anyway.
    pub fn canonical_len(&self, len: usize) -> u64 {
        let frames = (len / self.frame_size().max(1)) as u64;
        let rate = self.rate.max(1) as u64;
        let samples = (frames * SAMPLE_RATE as u64).div_ceil(rate);
        samples * SAMPLE_WIDTH as u64
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz/{}-bit/{}ch",
            self.rate,
            self.width as u32 * 8,
            self.channels
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_len() {
        assert_eq!(AudioFormat::CANONICAL.canonical_len(3200), 3200);
        assert_eq!(AudioFormat::new(8000, 2, 1).canonical_len(1600), 3200);
        assert_eq!(AudioFormat::new(48000, 2, 2).canonical_len(4), 2);
        assert_eq!(AudioFormat::new(1000, 2, 1).canonical_len(2000), 32000);
        assert_eq!(AudioFormat::new(0, 0, 0).canonical_len(10), 10 * 16000 * 2);
    }
}
