//! # Whisper Model
//!
//! Loading and inference for OpenAI Whisper checkpoints via Candle.
//! Weights come from HuggingFace (cached locally by `hf-hub`); decoding is
//! greedy with a language hint and the transcribe task token.

use anyhow::{anyhow, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use tokenizers::Tokenizer;

/// Input sample rate the model expects.
pub const SAMPLE_RATE: u32 = 16_000;

/// Frames in a 30-second mel spectrogram window.
const N_FRAMES: usize = 3000;

const SOT_TOKEN: u32 = 50258;
const EOT_TOKEN: u32 = 50257;
const TRANSCRIBE_TOKEN: u32 = 50359;

/// Longest token sequence we will decode for a single file.
const MAX_DECODE_TOKENS: usize = 224;

/// Available Whisper checkpoint sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// HuggingFace repository carrying this checkpoint.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// A loaded Whisper checkpoint ready for inference.
///
/// The decoder mutates internal state per call, so `transcribe` takes
/// `&mut self`; callers that share a model across requests must serialize
/// access.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
}

impl WhisperModel {
    /// Download (or reuse the local cache of) a checkpoint and build the
    /// model on `device`. `fp16` selects the weight dtype; disabled means
    /// full f32 precision.
    pub async fn load(size: ModelSize, device: Device, fp16: bool) -> Result<Self> {
        tracing::info!("Loading Whisper {} model...", size);
        let start_time = std::time::Instant::now();

        let api = {
            use hf_hub::api::tokio::ApiBuilder;

            let mut builder = ApiBuilder::new().with_progress(false);
            if let Ok(token) = std::env::var("HF_TOKEN") {
                builder = builder.with_token(Some(token));
            }
            builder
                .build()
                .map_err(|e| anyhow!("Failed to create HuggingFace API client: {}", e))?
        };

        let repo = api.model(size.repo_name().to_string());

        let config_filename = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let model_filename = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let mel_filters = build_mel_filter_bank(config.num_mel_bins as usize);

        let dtype = if fp16 { DType::F16 } else { DType::F32 };
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[model_filename], dtype, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        tracing::info!(
            "Whisper {} model loaded in {:.2}s (dtype {:?})",
            size,
            start_time.elapsed().as_secs_f64(),
            dtype
        );

        Ok(Self {
            model,
            config,
            device,
            tokenizer,
            mel_filters,
        })
    }

    /// Run inference over mono 16 kHz samples and return the raw text.
    ///
    /// The caller owns whitespace trimming; the model output may carry
    /// leading/trailing space from the tokenizer.
    pub fn transcribe(&mut self, audio_data: &[f32], language: Option<&str>) -> Result<String> {
        if audio_data.is_empty() {
            return Err(anyhow!("Audio data is empty"));
        }

        let start_time = std::time::Instant::now();

        let mel = self.pcm_to_mel(audio_data)?;
        let mel = mel.unsqueeze(0)?;

        let encoder_output = self.model.encoder.forward(&mel, false)?;

        let mut tokens = vec![SOT_TOKEN];
        if let Some(lang) = language {
            if let Some(lang_token) = language_token(lang) {
                tokens.push(lang_token);
            }
        }
        tokens.push(TRANSCRIBE_TOKEN);

        let mut output_tokens = Vec::new();

        for _ in 0..MAX_DECODE_TOKENS {
            let token_tensor = Tensor::new(&tokens[..], &self.device)?.unsqueeze(0)?;
            let logits = self.model.decoder.forward(&token_tensor, &encoder_output, false)?;

            let last_logits = logits.i((.., tokens.len() - 1, ..))?;
            let next_token = last_logits.argmax_keepdim(1)?.to_scalar::<u32>()?;

            if next_token == EOT_TOKEN {
                break;
            }

            // Greedy decoding can lock into a loop on degenerate audio.
            if is_repetitive(&output_tokens, next_token) {
                break;
            }

            tokens.push(next_token);
            output_tokens.push(next_token);
        }

        let text = self.decode_tokens(&output_tokens)?;

        tracing::debug!(
            "Transcribed {:.2}s of audio in {:.2}s: '{}'",
            audio_data.len() as f64 / SAMPLE_RATE as f64,
            start_time.elapsed().as_secs_f64(),
            text
        );

        Ok(text)
    }

    /// Convert PCM samples into the model's log-mel input tensor, padded or
    /// truncated to the 30-second window.
    fn pcm_to_mel(&self, pcm_data: &[f32]) -> Result<Tensor> {
        let window_len = 30 * SAMPLE_RATE as usize;
        let mut padded = vec![0.0f32; window_len];
        let copy_len = pcm_data.len().min(window_len);
        padded[..copy_len].copy_from_slice(&pcm_data[..copy_len]);

        let n_mels = self.config.num_mel_bins as usize;
        let frame_size = padded.len() / N_FRAMES;
        let mut mel_data = vec![0.0f32; n_mels * N_FRAMES];

        for frame in 0..N_FRAMES {
            let start = frame * frame_size;
            let end = (start + frame_size).min(padded.len());
            let frame_energy: f32 =
                padded[start..end].iter().map(|s| s.abs()).sum::<f32>() / frame_size as f32;

            for mel_bin in 0..n_mels {
                let weight = self.mel_filters[mel_bin * N_FILTER_POINTS + frame % N_FILTER_POINTS];
                // -80 dB floor keeps silence finite in log space.
                mel_data[mel_bin * N_FRAMES + frame] =
                    (frame_energy * weight).max(1e-5).ln().max(-11.512_9);
            }
        }

        Ok(Tensor::from_vec(mel_data, (n_mels, N_FRAMES), &self.device)?)
    }

    fn decode_tokens(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        let cleaned = text
            .replace("<|startoftranscript|>", "")
            .replace("<|endoftext|>", "")
            .replace("<|notimestamps|>", "");

        Ok(cleaned)
    }
}

/// Points per mel filter in the generated bank.
const N_FILTER_POINTS: usize = 400;

/// Build a triangular mel filter bank with one filter per mel bin.
fn build_mel_filter_bank(n_mels: usize) -> Vec<f32> {
    let mut filters = vec![0.0f32; n_mels * N_FILTER_POINTS];

    for mel_bin in 0..n_mels {
        let center = (mel_bin + 1) * N_FILTER_POINTS / (n_mels + 1);
        let width = N_FILTER_POINTS / (n_mels + 1);

        for point in 0..N_FILTER_POINTS {
            let distance = (point as i32 - center as i32).unsigned_abs() as usize;
            if distance <= width {
                filters[mel_bin * N_FILTER_POINTS + point] =
                    1.0 - distance as f32 / width as f32;
            }
        }
    }

    filters
}

/// Token id for a language hint, when the hint is a language Whisper was
/// trained to tag.
fn language_token(language: &str) -> Option<u32> {
    match language.to_lowercase().as_str() {
        "en" | "english" => Some(50259),
        "zh" | "chinese" => Some(50260),
        "de" | "german" => Some(50261),
        "es" | "spanish" => Some(50262),
        "ru" | "russian" => Some(50263),
        "ko" | "korean" => Some(50264),
        "fr" | "french" => Some(50265),
        "ja" | "japanese" => Some(50266),
        "pt" | "portuguese" => Some(50267),
        "it" | "italian" => Some(50274),
        _ => None,
    }
}

/// True when appending `new_token` would extend an immediate or three-token
/// pattern repetition.
fn is_repetitive(tokens: &[u32], new_token: u32) -> bool {
    if tokens.len() >= 2 {
        let tail = &tokens[tokens.len() - 2..];
        if tail == [new_token, new_token] {
            return true;
        }
    }

    if tokens.len() >= 6 {
        let last_3 = &tokens[tokens.len() - 3..];
        let prev_3 = &tokens[tokens.len() - 6..tokens.len() - 3];
        if last_3 == prev_3 {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_size_parsing() {
        assert_eq!("base".parse::<ModelSize>().unwrap(), ModelSize::Base);
        assert_eq!("LARGE".parse::<ModelSize>().unwrap(), ModelSize::Large);
        assert!("enormous".parse::<ModelSize>().is_err());
    }

    #[test]
    fn test_model_size_display_round_trips() {
        for size in [
            ModelSize::Tiny,
            ModelSize::Base,
            ModelSize::Small,
            ModelSize::Medium,
            ModelSize::Large,
        ] {
            assert_eq!(size.to_string().parse::<ModelSize>().unwrap(), size);
        }
    }

    #[test]
    fn test_language_token_lookup() {
        assert_eq!(language_token("en"), Some(50259));
        assert_eq!(language_token("English"), Some(50259));
        assert_eq!(language_token("tlh"), None);
    }

    #[test]
    fn test_repetition_guard() {
        assert!(!is_repetitive(&[], 7));
        assert!(is_repetitive(&[7, 7], 7));
        assert!(is_repetitive(&[1, 2, 3, 1, 2, 3], 9));
        assert!(!is_repetitive(&[1, 2, 3, 4, 5, 6], 7));
    }

    #[test]
    fn test_mel_filter_bank_dimensions() {
        let filters = build_mel_filter_bank(80);
        assert_eq!(filters.len(), 80 * N_FILTER_POINTS);
        assert!(filters.iter().all(|&w| (0.0..=1.0).contains(&w)));
    }
}
