//! Query/document embedding on top of candle.
//!
//! The real model is BGE-M3 (XLM-RoBERTa weights, 1024-dim output) loaded
//! from a local directory. A deterministic hash-based embedder can be
//! selected with `APP_USE_FAKE_EMBEDDINGS=1` so tests and offline dev never
//! touch the large weights.

mod device;
mod pooling;
mod tokenize;

pub use device::select_device;
pub use pooling::masked_mean_l2;
pub use tokenize::tokenize_padded;

use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use ragserve_core::error::{Error, Result};
use ragserve_core::traits::Embedder;

pub const EMBEDDING_DIM: usize = 1024;
const INPUT_MAX_LEN: usize = 256;

fn embed_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Embedding(e.to_string())
}

pub struct EmbeddingModel {
    id: String,
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl EmbeddingModel {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        tracing::info!(dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            Error::Embedding(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let config_path = model_dir.join("config.json");
        let config_text = std::fs::read_to_string(&config_path).map_err(|e| {
            Error::Embedding(format!("failed to read {}: {e}", config_path.display()))
        })?;
        let config: XLMRobertaConfig = serde_json::from_str(&config_text).map_err(embed_err)?;

        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path).map_err(embed_err)?;
        let weights_map: std::collections::HashMap<String, Tensor> =
            weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb).map_err(embed_err)?;

        tracing::info!("embedding model ready");
        Ok(Self {
            id: format!("local:bge-m3:d{EMBEDDING_DIM}"),
            model,
            tokenizer,
            device,
        })
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::Embedding("empty input text".to_string()));
        }
        let start = Instant::now();

        let (input_ids, attention_mask) =
            tokenize_padded(&self.tokenizer, text, INPUT_MAX_LEN, &self.device)?;
        let token_type_ids =
            Tensor::zeros((1, INPUT_MAX_LEN), DType::I64, &self.device).map_err(embed_err)?;

        let hidden = self
            .model
            .forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)
            .map_err(embed_err)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask).map_err(embed_err)?;

        let vector: Vec<f32> = pooled
            .to_device(&Device::Cpu)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec1())
            .map_err(embed_err)?;
        if vector.len() != EMBEDDING_DIM {
            return Err(Error::Embedding(format!(
                "model produced {} dims, expected {}",
                vector.len(),
                EMBEDDING_DIM
            )));
        }

        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 {
            tracing::debug!(ms = elapsed.as_millis() as u64, "slow embedding");
        }
        Ok(vector)
    }
}

impl Embedder for EmbeddingModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        EMBEDDING_DIM
    }

    fn max_len(&self) -> usize {
        INPUT_MAX_LEN
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }
}

/// Hash-based stand-in with the same shape contract as the real model:
/// deterministic, L2-normalized, `EMBEDDING_DIM` wide. Texts sharing words
/// land near each other, which is enough for retrieval tests.
pub struct FakeEmbedder {
    id: String,
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { id: format!("fake:xxhash:d{dim}"), dim }
    }
}

impl Default for FakeEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

impl Embedder for FakeEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        8192
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;

        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            if text.trim().is_empty() {
                return Err(Error::Embedding("empty input text".to_string()));
            }
            let mut v = vec![0f32; self.dim];
            for token in text.to_lowercase().split_whitespace() {
                let mut hasher = XxHash64::with_seed(0);
                token.hash(&mut hasher);
                let h = hasher.finish();
                let idx = (h as usize) % self.dim;
                let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
                v[idx] += val + 0.1;
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
            for x in &mut v {
                *x /= norm;
            }
            out.push(v);
        }
        Ok(out)
    }
}

/// Build the embedder the process should serve with. `model_dir` usually
/// comes from `paths.embed_model_dir`; `APP_USE_FAKE_EMBEDDINGS=1` wins over
/// everything and avoids loading weights entirely.
pub fn get_default_embedder(model_dir: Option<&Path>) -> Result<Box<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake {
        tracing::info!("using fake embedder");
        return Ok(Box::new(FakeEmbedder::default()));
    }
    let dir = resolve_model_dir(model_dir)?;
    Ok(Box::new(EmbeddingModel::load(&dir)?))
}

fn resolve_model_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        if dir.exists() {
            return Ok(dir.to_path_buf());
        }
        return Err(Error::NotFound(format!(
            "embedding model directory {} does not exist",
            dir.display()
        )));
    }
    if let Ok(dir) = std::env::var("APP_EMBED_MODEL_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() {
            return Ok(p);
        }
    }
    let default = Path::new("models/bge-m3");
    if default.exists() {
        return Ok(default.to_path_buf());
    }
    Err(Error::NotFound("could not locate an embedding model directory".to_string()))
}
