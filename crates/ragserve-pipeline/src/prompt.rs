use ragserve_core::chunker::estimate_tokens;
use ragserve_core::error::{Error, Result};
use ragserve_core::types::{Prompt, Query, RetrievalResult};

/// Instruction header placed in front of every prompt.
pub const SYSTEM_HEADER: &str = "You are a helpful assistant. Answer the question using the \
retrieved context below when it is relevant, and say clearly when it is not.";

const EMPTY_CONTEXT: &str = "No retrieved context.";

/// Merges retrieved snippets with the user question into one prompt under a
/// token budget.
///
/// Layout is deterministic: header, numbered context blocks in retrieval
/// order, then the literal question. Snippets are included greedily in
/// relevance order and dropped from the tail when the budget runs out; the
/// question itself is never cut. Only a question that does not fit on its
/// own is an error.
pub struct PromptAssembler {
    max_context_tokens: usize,
    reserved_generation_tokens: usize,
}

impl PromptAssembler {
    pub fn new(max_context_tokens: usize, reserved_generation_tokens: usize) -> Self {
        Self { max_context_tokens, reserved_generation_tokens }
    }

    /// Prompt-side token budget: the model context minus what generation
    /// may add.
    pub fn budget(&self) -> usize {
        self.max_context_tokens.saturating_sub(self.reserved_generation_tokens)
    }

    pub fn assemble(&self, query: &Query, retrieval: &RetrievalResult) -> Result<Prompt> {
        let budget = self.budget();

        let frame = render(&[], query);
        if estimate_tokens(&frame) > budget {
            return Err(Error::PromptTooLarge {
                query_tokens: estimate_tokens(&query.text),
                budget,
            });
        }

        // Greedy inclusion in relevance order; re-estimate the whole prompt
        // each step so the budget check matches the final text exactly.
        let mut blocks: Vec<String> = Vec::new();
        let mut truncated = false;
        for (i, hit) in retrieval.hits.iter().enumerate() {
            blocks.push(format!(
                "[{}] Source: {} (score={:.3})\n{}",
                i + 1,
                hit.source,
                hit.score,
                hit.text
            ));
            if estimate_tokens(&render(&blocks, query)) > budget {
                blocks.pop();
                truncated = true;
                break;
            }
        }

        let text = render(&blocks, query);
        let token_estimate = estimate_tokens(&text);
        Ok(Prompt { text, token_estimate, truncated })
    }
}

fn render(blocks: &[String], query: &Query) -> String {
    let context = if blocks.is_empty() {
        EMPTY_CONTEXT.to_string()
    } else {
        blocks.join("\n\n")
    };
    format!(
        "{SYSTEM_HEADER}\n\nContext:\n{context}\n\nQuestion:\n{}\n\nAnswer:\n",
        query.text
    )
}
