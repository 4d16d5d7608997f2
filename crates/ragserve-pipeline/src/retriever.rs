use std::sync::Arc;

use ragserve_core::error::{Error, Result};
use ragserve_core::traits::{Embedder, VectorSearcher};
use ragserve_core::types::{Query, RetrievalResult};

/// Embeds the query and asks the index for the top-k nearest snippets,
/// then drops low-confidence matches below the score threshold. All
/// matches filtered out is a valid, expected outcome.
pub struct Retriever {
    embedder: Box<dyn Embedder>,
    index: Arc<dyn VectorSearcher>,
    score_threshold: f32,
}

impl Retriever {
    pub fn new(embedder: Box<dyn Embedder>, index: Arc<dyn VectorSearcher>, score_threshold: f32) -> Self {
        Self { embedder, index, score_threshold }
    }

    pub fn embedder_id(&self) -> &str {
        self.embedder.id()
    }

    pub fn retrieve(&self, query: &Query) -> Result<RetrievalResult> {
        let query_vec = self
            .embedder
            .embed_batch(std::slice::from_ref(&query.text))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("embedder returned no vector".to_string()))?;
        let hits = self.index.search(&query_vec, query.top_k)?;
        let kept: Vec<_> = hits
            .into_iter()
            .filter(|h| h.score >= self.score_threshold)
            .collect();
        tracing::debug!(hits = kept.len(), top_k = query.top_k, "retrieval done");
        Ok(RetrievalResult { hits: kept })
    }
}
