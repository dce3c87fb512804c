//! # WAV Container
//!
//! The utterance is packaged as a RIFF/WAVE file before decoding, so the
//! engine always receives audio that went through a real container parse
//! with a checked header.

use crate::audio::{CHANNELS, SAMPLE_RATE, SAMPLE_WIDTH};
use crate::error::{AppError, AppResult};
use byteorder::{ByteOrder, LittleEndian};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;

const BITS_PER_SAMPLE: u16 = SAMPLE_WIDTH * 8;

/// The only layout this server produces or accepts.
fn canonical_spec() -> WavSpec {
    WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    }
}

/// Wrap canonical PCM bytes in a WAV container (PCM, mono, 16kHz, 16-bit).
pub fn wrap_wav(pcm: &[u8]) -> AppResult<Vec<u8>> {
    if pcm.len() % SAMPLE_WIDTH as usize != 0 {
        return Err(AppError::Container(format!(
            "{} bytes is not whole 16-bit samples",
            pcm.len()
        )));
    }

    let write_error = |e: hound::Error| AppError::Container(format!("failed to write WAV: {}", e));

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = WavWriter::new(&mut cursor, canonical_spec()).map_err(write_error)?;
        for sample in pcm.chunks_exact(2) {
            writer
                .write_sample(LittleEndian::read_i16(sample))
                .map_err(write_error)?;
        }
        writer.finalize().map_err(write_error)?;
    }

    Ok(cursor.into_inner())
}

/// Decode a WAV container into `f32` samples in `[-1.0, 1.0)`.
///
/// Anything other than canonical 16-bit mono 16kHz PCM is rejected.
pub fn decode_wav(bytes: &[u8]) -> AppResult<Vec<f32>> {
    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| AppError::Container(format!("failed to read WAV: {}", e)))?;

    let spec = reader.spec();
    if spec != canonical_spec() {
        return Err(AppError::Container(format!(
            "expected {}Hz 16-bit mono PCM, got {:?} {}Hz {}-bit {}ch",
            SAMPLE_RATE, spec.sample_format, spec.sample_rate, spec.bits_per_sample, spec.channels
        )));
    }

    reader
        .into_samples::<i16>()
        .map(|sample| {
            sample
                .map(|s| s as f32 / 32768.0)
                .map_err(|e| AppError::Container(format!("truncated WAV data: {}", e)))
        })
        .collect()
}
