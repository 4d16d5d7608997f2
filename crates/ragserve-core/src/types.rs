//! Domain types shared by the retrieval and generation stages.

use serde::{Deserialize, Serialize};
use std::time::Instant;

pub type ChunkId = String;

/// A chunk of a source document that is independently embedded and indexed.
///
/// - `id`: `"{source}:{chunk_index}"`, unique within a corpus
/// - `source`: stable document identity (file stem or external name)
/// - `text`: the payload handed to the embedder and, later, the prompt
/// - `chunk_index`/`total_chunks`: position within the parent document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub source: String,
    pub text: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// A query as the pipeline sees it. `top_k` is already resolved to either
/// the request value or the configured default.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub top_k: usize,
}

/// One retrieved snippet. `score` is inner product over L2-normalized
/// vectors, so higher is always better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub source: String,
    pub text: String,
}

/// Ordered retrieval output: at most `top_k` hits, scores non-increasing,
/// ties kept in stored order. Empty is a valid outcome, not a failure.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub hits: Vec<SearchHit>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// An assembled generation prompt. `truncated` records that at least one
/// retrieved snippet was dropped to respect the token budget; the user
/// question itself is never dropped.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub text: String,
    pub token_estimate: usize,
    pub truncated: bool,
}

/// Per-call generation knobs. `deadline` is wall-clock; once it has passed
/// the generator must stop promptly and hand back whatever it produced.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub max_new_tokens: usize,
    pub stop_sequences: Vec<String>,
    pub deadline: Option<Instant>,
}

/// Generator output. `finished` is false only when the deadline halted
/// decoding; `truncated` is true only when the new-token budget ran out
/// before a natural stop (EOS or a stop sequence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub finished: bool,
    pub truncated: bool,
}

/// Reference to a snippet that backed an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: ChunkId,
    pub score: f32,
}

/// User-visible pipeline output. The flags are metadata beside a valid
/// answer and are reported distinctly from hard failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
    pub prompt_truncated: bool,
    pub finished: bool,
    pub truncated: bool,
}

/// Lifecycle of one request through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Retrieving,
    Assembling,
    Generating,
    Completed,
    Failed,
}

impl RequestState {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestState::Received => "received",
            RequestState::Retrieving => "retrieving",
            RequestState::Assembling => "assembling",
            RequestState::Generating => "generating",
            RequestState::Completed => "completed",
            RequestState::Failed => "failed",
        }
    }
}
