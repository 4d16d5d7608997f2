use thiserror::Error;

/// Failure taxonomy shared by every pipeline component.
///
/// The pipeline maps any of these into a terminal `Failed` request state and
/// exactly one user-visible error. Truncation is never an error; it travels
/// as metadata on successful answers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Vector index not loaded")]
    IndexNotLoaded,

    #[error("Query alone exceeds the prompt budget ({query_tokens} tokens, budget {budget})")]
    PromptTooLarge { query_tokens: usize, budget: usize },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Generator busy, retry later")]
    ServiceBusy,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
