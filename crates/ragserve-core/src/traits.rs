use crate::error::Result;
use crate::types::{GenerationOptions, GenerationResult, SearchHit};

/// Text to fixed-dimension vector. Implementations must be deterministic for
/// identical input and model version, and must return L2-normalized vectors.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the model (e.g. `local:bge-m3:d1024`). Recorded
    /// in the index at build time and checked again at load time.
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Nearest-neighbor lookup over the loaded corpus. Read-only; safe to share
/// once loading has completed.
pub trait VectorSearcher: Send + Sync {
    fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>>;
}

/// A loaded local-inference model. Calls are logically exclusive on the
/// instance; `&mut self` makes that exclusivity visible to the type system.
pub trait TextGenerator: Send {
    fn context_window(&self) -> usize;
    fn generate(&mut self, prompt: &str, opts: &GenerationOptions) -> Result<GenerationResult>;
}
