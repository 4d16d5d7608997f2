//! Local text generation over a GGUF model.
//!
//! The model file is memory-heavy and the decode loop is CPU-bound; exactly
//! one generation may run at a time (the pipeline's admission gate enforces
//! this, `&mut self` in the trait makes it structural). Every call restarts
//! decoding at position zero, which rebuilds the KV cache, so a failed
//! request does not poison the next one.

mod mock;

pub use mock::MockGenerator;

use std::path::Path;
use std::time::Instant;

use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::{ModelWeights, MAX_SEQ_LEN};
use tokenizers::Tokenizer;

use ragserve_core::error::{Error, Result};
use ragserve_core::traits::TextGenerator;
use ragserve_core::types::{GenerationOptions, GenerationResult};

fn gen_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Generation(e.to_string())
}

/// Sampling knobs fixed at load time. Temperature matches the original
/// serving default; the repeat penalty window keeps short answers from
/// looping.
#[derive(Debug, Clone)]
pub struct SamplingConfig {
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub seed: u64,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { temperature: 0.6, top_p: None, seed: 42, repeat_penalty: 1.1, repeat_last_n: 64 }
    }
}

pub struct GgufGenerator {
    model: ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    sampling: SamplingConfig,
    eos_token: Option<u32>,
}

impl GgufGenerator {
    /// Load quantized weights from a `.gguf` file; `tokenizer.json` is
    /// expected next to it. CPU only: the serving container has no
    /// accelerator and two resident models already stretch its memory.
    pub fn load(model_path: &Path, sampling: SamplingConfig) -> Result<Self> {
        let device = Device::Cpu;
        tracing::info!(model = %model_path.display(), "loading gguf model");
        let started = Instant::now();

        let mut file = std::fs::File::open(model_path).map_err(|e| {
            Error::NotFound(format!("gguf model {}: {e}", model_path.display()))
        })?;
        let content = gguf_file::Content::read(&mut file).map_err(gen_err)?;
        let model = ModelWeights::from_gguf(content, &mut file, &device).map_err(gen_err)?;

        let tokenizer_path = model_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            Error::Generation(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let eos_token = ["</s>", "<|im_end|>", "<|endoftext|>"]
            .iter()
            .find_map(|t| tokenizer.token_to_id(t));
        if eos_token.is_none() {
            tracing::warn!("no EOS token found in tokenizer; relying on budget and stop sequences");
        }

        tracing::info!(secs = started.elapsed().as_secs(), "gguf model ready");
        Ok(Self { model, tokenizer, device, sampling, eos_token })
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| Error::Generation(format!("detokenization failed: {e}")))
    }
}

impl TextGenerator for GgufGenerator {
    fn context_window(&self) -> usize {
        MAX_SEQ_LEN
    }

    fn generate(&mut self, prompt: &str, opts: &GenerationOptions) -> Result<GenerationResult> {
        if prompt.trim().is_empty() {
            return Err(Error::Generation("empty prompt".to_string()));
        }
        let enc = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| Error::Generation(format!("tokenization failed: {e}")))?;
        let prompt_tokens: Vec<u32> = enc.get_ids().to_vec();
        if prompt_tokens.len() >= MAX_SEQ_LEN {
            return Err(Error::Generation(format!(
                "prompt is {} tokens, model context is {}",
                prompt_tokens.len(),
                MAX_SEQ_LEN
            )));
        }
        // Never decode past the model context, whatever the caller asked for.
        let budget = opts.max_new_tokens.min(MAX_SEQ_LEN - prompt_tokens.len());

        let mut logits_processor = LogitsProcessor::new(
            self.sampling.seed,
            Some(self.sampling.temperature),
            self.sampling.top_p,
        );

        // Prefill: the whole prompt in one forward pass, sample the first
        // new token from its final logits.
        let input = Tensor::new(prompt_tokens.as_slice(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(gen_err)?;
        let logits = self
            .model
            .forward(&input, 0)
            .and_then(|l| l.squeeze(0))
            .map_err(gen_err)?;
        let mut next_token = logits_processor.sample(&logits).map_err(gen_err)?;

        let mut generated: Vec<u32> = Vec::new();
        let mut text = String::new();
        let mut finished = true;
        let mut truncated = false;

        loop {
            if Some(next_token) == self.eos_token {
                break;
            }
            generated.push(next_token);
            text = self.decode(&generated)?;
            if let Some(cut) = find_stop(&text, &opts.stop_sequences) {
                text.truncate(cut);
                break;
            }
            if generated.len() >= budget {
                truncated = true;
                break;
            }
            if opts.deadline.is_some_and(|d| Instant::now() >= d) {
                finished = false;
                break;
            }

            let input = Tensor::new(&[next_token], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(gen_err)?;
            let logits = self
                .model
                .forward(&input, prompt_tokens.len() + generated.len() - 1)
                .and_then(|l| l.squeeze(0))
                .map_err(gen_err)?;
            let logits = if self.sampling.repeat_penalty == 1.0 {
                logits
            } else {
                let start_at = generated.len().saturating_sub(self.sampling.repeat_last_n);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    self.sampling.repeat_penalty,
                    &generated[start_at..],
                )
                .map_err(gen_err)?
            };
            next_token = logits_processor.sample(&logits).map_err(gen_err)?;
        }

        Ok(GenerationResult { text: text.trim().to_string(), finished, truncated })
    }
}

/// Byte offset of the earliest stop-sequence match in `text`, if any.
pub fn find_stop(text: &str, stop_sequences: &[String]) -> Option<usize> {
    stop_sequences
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
}

/// Build the generator the process should serve with. `backend` is the
/// `generation.backend` config value; `APP_USE_MOCK_GENERATOR=1` forces the
/// mock regardless, mirroring the fake-embedder toggle.
pub fn get_default_generator(
    backend: &str,
    model_path: Option<&Path>,
) -> Result<Box<dyn TextGenerator>> {
    let force_mock = std::env::var("APP_USE_MOCK_GENERATOR")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if force_mock || backend.eq_ignore_ascii_case("mock") {
        tracing::info!("using mock generator");
        return Ok(Box::new(MockGenerator::new()));
    }
    if !backend.eq_ignore_ascii_case("gguf") {
        return Err(Error::InvalidConfig(format!(
            "unknown generation backend '{backend}' (expected 'gguf' or 'mock')"
        )));
    }
    let path = model_path.ok_or_else(|| {
        Error::InvalidConfig("generation.backend = 'gguf' but paths.generator_model is not set".to_string())
    })?;
    Ok(Box::new(GgufGenerator::load(path, SamplingConfig::default())?))
}
