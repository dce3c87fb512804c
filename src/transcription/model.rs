//! # Whisper Model
//!
//! Loads a Whisper checkpoint from the Hugging Face hub and runs greedy
//! decoding on it with Candle.
//!
//! ## Model Loading Process:
//! 1. Resolve the model id to a hub repository (`tiny` → `openai/whisper-tiny`)
//! 2. Download `config.json`, `tokenizer.json` and `model.safetensors` (cached)
//! 3. Build the mel filter bank for the model's mel bin count
//! 4. Memory-map the weights onto the selected device
//!
//! ## Decoding:
//! Audio is cut into 30 second mel windows. Each window is decoded greedily
//! without timestamps, starting from `<|startoftranscript|>`, the optional
//! language token, `<|transcribe|>` and `<|notimestamps|>`.

use crate::error::{AppError, AppResult};
use crate::transcription::mel;
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, audio, Config};
use hf_hub::api::tokio::{Api, ApiBuilder};
use std::path::PathBuf;
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// GPT-2 id of a bare space, never a useful first token.
const SPACE_TOKEN: u32 = 220;

/// Map a configured model id to its hub repository.
///
/// ## Examples:
/// - `tiny` → `openai/whisper-tiny`
/// - `small.en` → `openai/whisper-small.en`
/// - `large` → `openai/whisper-large-v2`
/// - `turbo` → `openai/whisper-large-v3-turbo`
/// - `distil-whisper/distil-large-v3` → unchanged
pub fn resolve_repo(model_id: &str) -> String {
    if model_id.contains('/') {
        return model_id.to_string();
    }
    match model_id.to_lowercase().as_str() {
        "large" => "openai/whisper-large-v2".to_string(),
        "turbo" => "openai/whisper-large-v3-turbo".to_string(),
        name => format!("openai/whisper-{}", name),
    }
}

/// A loaded Whisper model ready for transcription.
///
/// Decoding mutates the key/value caches, so callers need `&mut self`
/// (the engine keeps each model behind a mutex).
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    tokenizer: Tokenizer,

    /// `num_mel_bins x (N_FFT / 2 + 1)` filter bank
    mel_filters: Vec<f32>,

    /// `-inf` at every token the model must never emit
    suppress_tokens: Tensor,

    /// Additional mask for the first decoded token
    suppress_blank: Tensor,

    sot_token: u32,
    transcribe_token: u32,
    no_timestamps_token: u32,
    eot_token: u32,
    language_token: Option<u32>,

    /// Hub repository the weights came from
    repo: String,
}

impl WhisperModel {
    /// Download (or reuse from cache) and load a Whisper model.
    ///
    /// ## Parameters:
    /// - **model_id**: Short name or hub repository
    /// - **device**: Device to load the weights on
    /// - **language**: Optional fixed language (`en`, `de`, ...); `None` lets
    ///   the model detect it
    pub async fn load(model_id: &str, device: Device, language: Option<&str>) -> AppResult<Self> {
        let repo_name = resolve_repo(model_id);
        info!("Loading Whisper model {} from {}", model_id, repo_name);
        let start_time = std::time::Instant::now();

        let api = build_api()?;
        let repo = api.model(repo_name.clone());

        let hub_error = |file: &str, e: hf_hub::api::tokio::ApiError| {
            AppError::Inference(format!("failed to download {} from {}: {}", file, repo_name, e))
        };
        let config_filename = repo
            .get("config.json")
            .await
            .map_err(|e| hub_error("config.json", e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| hub_error("tokenizer.json", e))?;
        let model_filename = repo
            .get("model.safetensors")
            .await
            .map_err(|e| hub_error("model.safetensors", e))?;
        debug!("Model files cached at {:?}", model_filename.parent());

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)
            .map_err(|e| AppError::Inference(format!("invalid config.json: {}", e)))?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| AppError::Inference(format!("failed to load tokenizer: {}", e)))?;

        let mel_filters = mel::mel_filters(config.num_mel_bins);

        // SAFETY: the mapped file lives in the hub cache and is not modified while loaded
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[model_filename], m::DTYPE, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        let sot_token = token_id(&tokenizer, m::SOT_TOKEN)?;
        let transcribe_token = token_id(&tokenizer, m::TRANSCRIBE_TOKEN)?;
        let no_timestamps_token = token_id(&tokenizer, m::NO_TIMESTAMPS_TOKEN)?;
        let eot_token = token_id(&tokenizer, m::EOT_TOKEN)?;
        let language_token = match language {
            Some(lang) => Some(token_id(&tokenizer, &format!("<|{}|>", lang)).map_err(|_| {
                AppError::Inference(format!("language '{}' is not supported by {}", lang, repo_name))
            })?),
            None => None,
        };

        let suppress_tokens = token_mask(config.vocab_size, &device, |t| {
            config.suppress_tokens.contains(&t) || t == no_timestamps_token
        })?;
        let suppress_blank =
            token_mask(config.vocab_size, &device, |t| t == SPACE_TOKEN || t == eot_token)?;

        info!(
            "Whisper model {} loaded in {:.2}s ({} mel bins)",
            repo_name,
            start_time.elapsed().as_secs_f64(),
            config.num_mel_bins
        );

        Ok(Self {
            model,
            config,
            device,
            tokenizer,
            mel_filters,
            suppress_tokens,
            suppress_blank,
            sot_token,
            transcribe_token,
            no_timestamps_token,
            eot_token,
            language_token,
            repo: repo_name,
        })
    }

    /// Transcribe 16kHz mono samples in `[-1.0, 1.0]`.
    ///
    /// Long audio is decoded window by window and the texts are joined with
    /// a space.
    pub fn transcribe(&mut self, samples: &[f32]) -> AppResult<String> {
        let mel = audio::pcm_to_mel(&self.config, samples, &self.mel_filters);
        let n_mels = self.config.num_mel_bins;
        let frames = mel.len() / n_mels;
        let mel = Tensor::from_vec(mel, (1, n_mels, frames), &self.device)?;

        let (_, _, content_frames) = mel.dims3()?;
        let mut seek = 0;
        let mut texts = Vec::new();

        while seek < content_frames {
            let segment_size = usize::min(content_frames - seek, m::N_FRAMES);
            let segment = mel.narrow(2, seek, segment_size)?;
            let text = self.decode_segment(&segment)?;
            debug!("Window at frame {} decoded: '{}'", seek, text);
            if !text.is_empty() {
                texts.push(text);
            }
            seek += segment_size;
        }

        Ok(texts.join(" "))
    }

    fn decode_segment(&mut self, mel: &Tensor) -> AppResult<String> {
        let audio_features = self.model.encoder.forward(mel, true)?;
        let sample_len = self.config.max_target_positions / 2;

        let mut tokens = vec![self.sot_token];
        if let Some(language_token) = self.language_token {
            tokens.push(language_token);
        }
        tokens.push(self.transcribe_token);
        tokens.push(self.no_timestamps_token);
        let prompt_len = tokens.len();

        for i in 0..sample_len {
            let tokens_t = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let ys = self.model.decoder.forward(&tokens_t, &audio_features, i == 0)?;

            let (_, seq_len, _) = ys.dims3()?;
            let logits = self
                .model
                .decoder
                .final_linear(&ys.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?;
            let mut logits = logits.broadcast_add(&self.suppress_tokens)?;
            if i == 0 {
                logits = logits.broadcast_add(&self.suppress_blank)?;
            }

            let next_token = logits.argmax(0)?.to_scalar::<u32>()?;
            if next_token == self.eot_token {
                break;
            }
            tokens.push(next_token);
            if tokens.len() > self.config.max_target_positions {
                break;
            }
        }

        let text = self
            .tokenizer
            .decode(&tokens[prompt_len..], true)
            .map_err(|e| AppError::Inference(format!("tokenizer decode error: {}", e)))?;
        Ok(text.trim().to_string())
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }
}

/// Hub client honoring `HF_TOKEN`, `HF_HUB_CACHE` and `HF_HOME`.
fn build_api() -> AppResult<Api> {
    let mut builder = ApiBuilder::new()
        .with_token(std::env::var("HF_TOKEN").ok())
        .with_progress(false);

    if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
        builder = builder.with_cache_dir(PathBuf::from(cache_dir));
    } else if let Ok(hf_home) = std::env::var("HF_HOME") {
        builder = builder.with_cache_dir(PathBuf::from(hf_home).join("hub"));
    }

    builder
        .build()
        .map_err(|e| AppError::Inference(format!("failed to create Hugging Face client: {}", e)))
}

fn token_id(tokenizer: &Tokenizer, token: &str) -> AppResult<u32> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| AppError::Inference(format!("tokenizer has no token {}", token)))
}

/// Additive logit mask: `-inf` where `suppressed` holds, `0` elsewhere.
fn token_mask(vocab_size: usize, device: &Device, suppressed: impl Fn(u32) -> bool) -> AppResult<Tensor> {
    let mask: Vec<f32> = (0..vocab_size as u32)
        .map(|t| if suppressed(t) { f32::NEG_INFINITY } else { 0.0 })
        .collect();
    Ok(Tensor::new(mask.as_slice(), device)?)
}
