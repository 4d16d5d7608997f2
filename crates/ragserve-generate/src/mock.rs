use std::time::{Duration, Instant};

use ragserve_core::error::{Error, Result};
use ragserve_core::traits::TextGenerator;
use ragserve_core::types::{GenerationOptions, GenerationResult};

use crate::find_stop;

const DEFAULT_REPLY: &str =
    "I understood your request. Here is a structured answer grounded in the retrieved context.";

/// Deterministic stand-in for the GGUF model. One word is one "token":
/// the reply is emitted word by word against the same budget, stop and
/// deadline rules as real decoding, so pipeline behavior can be tested
/// without weights. An optional per-token delay makes timeout and
/// admission races reproducible.
pub struct MockGenerator {
    reply: Option<String>,
    echo_prompt: bool,
    token_delay: Option<Duration>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self { reply: None, echo_prompt: false, token_delay: None }
    }

    /// Answer with a fixed text instead of the default reply.
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self { reply: Some(reply.into()), echo_prompt: false, token_delay: None }
    }

    /// Answer with the prompt itself, so tests can assert on what the
    /// assembler actually produced.
    pub fn echo() -> Self {
        Self { reply: None, echo_prompt: true, token_delay: None }
    }

    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TextGenerator for MockGenerator {
    fn context_window(&self) -> usize {
        4096
    }

    fn generate(&mut self, prompt: &str, opts: &GenerationOptions) -> Result<GenerationResult> {
        if prompt.trim().is_empty() {
            return Err(Error::Generation("empty prompt".to_string()));
        }
        let reply = if self.echo_prompt {
            prompt.to_string()
        } else {
            self.reply.clone().unwrap_or_else(|| DEFAULT_REPLY.to_string())
        };

        let words: Vec<&str> = reply.split_whitespace().collect();
        let mut text = String::new();
        let mut finished = true;
        let mut truncated = false;

        for (emitted, word) in words.iter().enumerate() {
            if emitted >= opts.max_new_tokens {
                truncated = true;
                break;
            }
            if opts.deadline.is_some_and(|d| Instant::now() >= d) {
                finished = false;
                break;
            }
            if let Some(delay) = self.token_delay {
                std::thread::sleep(delay);
            }
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(word);
            if let Some(cut) = find_stop(&text, &opts.stop_sequences) {
                text.truncate(cut);
                break;
            }
        }

        Ok(GenerationResult { text: text.trim().to_string(), finished, truncated })
    }
}
