//! # Audio Normalization
//!
//! Converts streamed PCM of any supported format into canonical audio
//! (16kHz, 16-bit, mono) one chunk at a time.
//!
//! ## Conversion Steps:
//! 1. **Width**: 1-4 byte signed little-endian samples are scaled to 32 bits
//! 2. **Channels**: Each frame is downmixed to the mean of its channels
//! 3. **Truncation**: The 32-bit value keeps its top 16 bits
//! 4. **Rate**: Linear interpolation in integer arithmetic
//!
//! The resampler keeps its position and last sample between chunks, so the
//! concatenated output of a stream does not depend on how it was chunked.
//! Canonical input is returned untouched.

use crate::audio::{AudioFormat, MAX_SOURCE_RATE, MIN_SOURCE_RATE, SAMPLE_RATE};
use crate::error::{AppError, AppResult};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

/// Streaming converter for one connection.
///
/// ## Usage Example:
/// ```rust
/// let mut normalizer = AudioNormalizer::new();
/// let canonical = normalizer.normalize(&chunk.audio, chunk.format)?;
/// buffer.append(&canonical)?;
/// // on audio-stop
/// normalizer.reset();
/// ```
#[derive(Debug, Default)]
pub struct AudioNormalizer {
    /// Present while the stream needs rate conversion
    resampler: Option<Resampler>,
}

impl AudioNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one chunk to canonical bytes.
    ///
    /// ## Parameters:
    /// - **audio**: Interleaved little-endian samples
    /// - **format**: The chunk's declared rate, width and channel count
    ///
    /// ## Returns:
    /// - **Ok(bytes)**: 16kHz 16-bit mono PCM (possibly empty)
    /// - **Err(AppError::Audio)**: Unsupported format or a partial frame
    pub fn normalize(&mut self, audio: &[u8], format: AudioFormat) -> AppResult<Vec<u8>> {
        validate(audio, format)?;

        if format.is_canonical() {
            self.resampler = None;
            return Ok(audio.to_vec());
        }

        let samples = to_mono_i16(audio, format);

        let samples = if format.rate == SAMPLE_RATE {
            self.resampler = None;
            samples
        } else {
            let resampler = match self.resampler.take() {
                Some(r) if r.src_rate == format.rate => r,
                _ => Resampler::new(format.rate),
            };
            let resampler = self.resampler.insert(resampler);
            resampler.process(&samples)
        };

        let mut out = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            out.write_i16::<LittleEndian>(sample)?;
        }
        Ok(out)
    }

    /// Forget all streaming state. Called at the end of every utterance.
    pub fn reset(&mut self) {
        self.resampler = None;
    }
}

fn validate(audio: &[u8], format: AudioFormat) -> AppResult<()> {
    if !(MIN_SOURCE_RATE..=MAX_SOURCE_RATE).contains(&format.rate) {
        return Err(AppError::Audio(format!(
            "sample rate must be {}-{}Hz, got {}",
            MIN_SOURCE_RATE, MAX_SOURCE_RATE, format.rate
        )));
    }
    if format.channels == 0 {
        return Err(AppError::Audio("channel count must be positive".to_string()));
    }
    if !(1..=4).contains(&format.width) {
        return Err(AppError::Audio(format!(
            "sample width must be 1-4 bytes, got {}",
            format.width
        )));
    }
    if audio.len() % format.frame_size() != 0 {
        return Err(AppError::Audio(format!(
            "{} bytes is not a whole number of {}-byte frames",
            audio.len(),
            format.frame_size()
        )));
    }
    Ok(())
}

/// Read one signed sample of `width` bytes, scaled to the full i32 range.
fn read_sample(bytes: &[u8], width: u16) -> i32 {
    match width {
        1 => (bytes[0] as i8 as i32) << 24,
        2 => (LittleEndian::read_i16(bytes) as i32) << 16,
        3 => LittleEndian::read_i24(bytes) << 8,
        _ => LittleEndian::read_i32(bytes),
    }
}

fn to_mono_i16(audio: &[u8], format: AudioFormat) -> Vec<i16> {
    let width = format.width as usize;
    let channels = format.channels as i64;

    audio
        .chunks_exact(format.frame_size())
        .map(|frame| {
            let sum: i64 = frame
                .chunks_exact(width)
                .map(|s| read_sample(s, format.width) as i64)
                .sum();
            ((sum / channels) >> 16) as i16
        })
        .collect()
}

/// Linear-interpolation rate converter to 16kHz.
///
/// Output sample `k` sits at input position `k * in_step / out_step`. It is
/// emitted once the input sample at that position has arrived and is
/// interpolated between that sample and the one before it, so the output
/// lags the input by one source sample. After `n` input samples exactly
/// `ceil(n * 16000 / src_rate)` outputs exist.
#[derive(Debug)]
struct Resampler {
    src_rate: u32,
    in_step: u64,
    out_step: u64,
    consumed: u64,
    produced: u64,
    prev: i64,
    cur: i64,
}

impl Resampler {
    fn new(src_rate: u32) -> Self {
        let g = gcd(src_rate as u64, SAMPLE_RATE as u64);
        Self {
            src_rate,
            in_step: src_rate as u64 / g,
            out_step: SAMPLE_RATE as u64 / g,
            consumed: 0,
            produced: 0,
            prev: 0,
            cur: 0,
        }
    }

    fn process(&mut self, input: &[i16]) -> Vec<i16> {
        let expected = (input.len() as u64 * self.out_step / self.in_step) as usize + 1;
        let mut out = Vec::with_capacity(expected);

        for &x in input {
            let x = x as i64;
            self.prev = if self.consumed == 0 { x } else { self.cur };
            self.cur = x;
            self.consumed += 1;

            while self.produced * self.in_step < self.consumed * self.out_step {
                let r = ((self.produced * self.in_step) % self.out_step) as i64;
                let out_step = self.out_step as i64;
                let value = (self.prev * (out_step - r) + self.cur * r) / out_step;
                out.push(value as i16);
                self.produced += 1;
            }
        }

        out
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn samples16(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn test_canonical_is_passthrough() {
        let mut normalizer = AudioNormalizer::new();
        let audio: Vec<u8> = (0..=255u8).cycle().take(3200).collect();

        let out = normalizer.normalize(&audio, AudioFormat::CANONICAL).unwrap();
        assert_eq!(out, audio);
    }

    #[test]
    fn test_8khz_doubles_length() {
        let mut normalizer = AudioNormalizer::new();
        let audio = pcm16(&[1000; 800]);

        let out = normalizer
            .normalize(&audio, AudioFormat::new(8000, 2, 1))
            .unwrap();
        assert_eq!(out.len(), audio.len() * 2);
        assert!(samples16(&out).iter().all(|&s| s == 1000));
    }

    #[test]
    fn test_upsampling_interpolates() {
        let mut normalizer = AudioNormalizer::new();
        let out = normalizer
            .normalize(&pcm16(&[0, 100, 200]), AudioFormat::new(8000, 2, 1))
            .unwrap();
        assert_eq!(samples16(&out), vec![0, 0, 0, 50, 100, 150]);
    }

    #[test]
    fn test_output_count_matches_rate_ratio() {
        for &rate in &[8000u32, 11025, 22050, 44100, 48000] {
            let mut normalizer = AudioNormalizer::new();
            let n = 1234u64;
            let audio = pcm16(&vec![7; n as usize]);
            let out = normalizer
                .normalize(&audio, AudioFormat::new(rate, 2, 1))
                .unwrap();
            let expected = (n * 16000 + rate as u64 - 1) / rate as u64;
            assert_eq!(out.len() as u64, expected * 2, "rate {}", rate);
        }
    }

    #[test]
    fn test_output_is_independent_of_chunking() {
        let format = AudioFormat::new(22050, 2, 2);
        let samples: Vec<i16> = (0..4410).map(|i| ((i * 37) % 20000 - 10000) as i16).collect();
        let audio = pcm16(&samples);

        let mut whole = AudioNormalizer::new();
        let expected = whole.normalize(&audio, format).unwrap();

        for &chunk_frames in &[1usize, 7, 160, 1023] {
            let mut chunked = AudioNormalizer::new();
            let mut out = Vec::new();
            for chunk in audio.chunks(chunk_frames * format.frame_size()) {
                out.extend(chunked.normalize(chunk, format).unwrap());
            }
            assert_eq!(out, expected, "chunk size {}", chunk_frames);
        }
    }

    #[test]
    fn test_stereo_downmix_averages() {
        let mut normalizer = AudioNormalizer::new();
        let out = normalizer
            .normalize(&pcm16(&[1000, 3000, -200, 200]), AudioFormat::new(16000, 2, 2))
            .unwrap();
        assert_eq!(samples16(&out), vec![2000, 0]);
    }

    #[test]
    fn test_width_conversion() {
        let mut normalizer = AudioNormalizer::new();

        let out = normalizer
            .normalize(&[0x01, 0xff], AudioFormat::new(16000, 1, 1))
            .unwrap();
        assert_eq!(samples16(&out), vec![256, -256]);

        let out = normalizer
            .normalize(&[0x00, 0x34, 0x12], AudioFormat::new(16000, 3, 1))
            .unwrap();
        assert_eq!(samples16(&out), vec![0x1234]);

        let out = normalizer
            .normalize(&0x7fff_0000i32.to_le_bytes(), AudioFormat::new(16000, 4, 1))
            .unwrap();
        assert_eq!(samples16(&out), vec![0x7fff]);
    }

    #[test]
    fn test_invalid_formats_are_rejected() {
        let mut normalizer = AudioNormalizer::new();
        let cases = [
            (vec![0u8; 4], AudioFormat::new(0, 2, 1)),
            (vec![0u8; 4], AudioFormat::new(1, 2, 1)),
            (vec![0u8; 4], AudioFormat::new(999, 2, 1)),
            (vec![0u8; 4], AudioFormat::new(384_001, 2, 1)),
            (vec![0u8; 4], AudioFormat::new(16000, 2, 0)),
            (vec![0u8; 5], AudioFormat::new(16000, 5, 1)),
            (vec![0u8; 3], AudioFormat::new(16000, 2, 1)),
            (vec![0u8; 6], AudioFormat::new(44100, 2, 2)),
        ];

        for (audio, format) in cases {
            let err = normalizer.normalize(&audio, format).unwrap_err();
            assert!(matches!(err, AppError::Audio(_)), "{}", format);
        }
    }

    #[test]
    fn test_rate_bounds_are_inclusive() {
        let mut normalizer = AudioNormalizer::new();
        let audio = pcm16(&[0; 384]);

        let low = normalizer
            .normalize(&audio, AudioFormat::new(MIN_SOURCE_RATE, 2, 1))
            .unwrap();
        assert_eq!(low.len(), audio.len() * 16);

        let high = normalizer
            .normalize(&audio, AudioFormat::new(MAX_SOURCE_RATE, 2, 1))
            .unwrap();
        assert_eq!(high.len(), 2 * 16);
    }

    #[test]
    fn test_reset_restarts_resampler() {
        let format = AudioFormat::new(8000, 2, 1);
        let audio = pcm16(&[500, -500, 500]);

        let mut normalizer = AudioNormalizer::new();
        let first = normalizer.normalize(&audio, format).unwrap();
        normalizer.reset();
        let second = normalizer.normalize(&audio, format).unwrap();
        assert_eq!(first, second);
    }
}
