//! # Mel Filter Bank
//!
//! Builds the mel filter bank Whisper's feature extractor expects: Slaney
//! mel scale, Slaney area normalization, 0 Hz to Nyquist. The STFT and log
//! scaling themselves are done by `candle_transformers::models::whisper::audio`.
//!
//! ## Whisper Audio Parameters:
//! - **Sample rate**: 16,000 Hz
//! - **FFT size**: 400 (201 frequency bins)
//! - **Mel bins**: 80, or 128 for large-v3 models

use crate::audio::SAMPLE_RATE;

/// FFT window size (25ms at 16kHz)
pub const N_FFT: usize = 400;

/// Frequency bins produced by a real FFT of `N_FFT` points.
pub const N_FREQS: usize = N_FFT / 2 + 1;

// Slaney mel scale: linear below 1kHz, logarithmic above
const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

fn hz_to_mel(hz: f64) -> f64 {
    if hz < MIN_LOG_HZ {
        hz / F_SP
    } else {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    if mel < MIN_LOG_MEL {
        F_SP * mel
    } else {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    }
}

/// Build an `n_mels x N_FREQS` filter bank, row-major.
pub fn mel_filters(n_mels: usize) -> Vec<f32> {
    let sr = SAMPLE_RATE as f64;
    let fft_freqs: Vec<f64> = (0..N_FREQS).map(|i| i as f64 * sr / N_FFT as f64).collect();

    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(sr / 2.0);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| {
            let mel = mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64;
            mel_to_hz(mel)
        })
        .collect();

    let mut filters = vec![0.0f32; n_mels * N_FREQS];
    for m in 0..n_mels {
        let (left, center, right) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
        let norm = 2.0 / (right - left);

        for (k, &freq) in fft_freqs.iter().enumerate() {
            let lower = (freq - left) / (center - left);
            let upper = (right - freq) / (right - center);
            let weight = lower.min(upper).max(0.0);
            filters[m * N_FREQS + k] = (weight * norm) as f32;
        }
    }

    filters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mel_scale_round_trip() {
        for &hz in &[0.0, 300.0, 1000.0, 4000.0, 8000.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_filter_bank_shape() {
        assert_eq!(mel_filters(80).len(), 80 * N_FREQS);
        assert_eq!(mel_filters(128).len(), 128 * N_FREQS);
    }

    #[test]
    fn test_filters_are_triangular_and_normalized() {
        let filters = mel_filters(80);

        for m in 0..80 {
            let row = &filters[m * N_FREQS..(m + 1) * N_FREQS];
            assert!(row.iter().all(|&w| w >= 0.0));
            assert!(row.iter().any(|&w| w > 0.0), "filter {} is empty", m);
        }

        // Area normalization divides by the band width in Hz
        let row = &filters[40 * N_FREQS..41 * N_FREQS];
        let peak = row.iter().cloned().fold(0.0f32, f32::max);
        assert!(peak > 0.0 && peak < 0.1);
    }
}
