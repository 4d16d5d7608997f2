use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use ragserve_core::error::{Error, Result};
use ragserve_core::traits::TextGenerator;
use ragserve_core::types::{
    Answer, GenerationOptions, Query, RequestState, RetrievalResult, SourceRef,
};

use crate::intent::{detect_intent, Intent, GREETING_REPLY};
use crate::prompt::PromptAssembler;
use crate::retriever::Retriever;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Wall-clock deadline for one request; generation stops promptly once
    /// it has passed and the partial answer is returned.
    pub request_timeout: Duration,
    pub max_new_tokens: usize,
    /// Budget for short conversational inputs that skip retrieval.
    pub short_chat_max_new_tokens: usize,
    /// `None`: reject immediately when the generator is taken. `Some(d)`:
    /// wait in line up to `d` before rejecting. An explicit choice, not a
    /// hidden default.
    pub queue_max_wait: Option<Duration>,
    pub stop_sequences: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(240),
            max_new_tokens: 1024,
            short_chat_max_new_tokens: 100,
            queue_max_wait: None,
            stop_sequences: vec![],
        }
    }
}

/// Sequences Retriever → PromptAssembler → Generator for one request.
///
/// The generator holds the only loaded model instance, so at most one
/// request may occupy the generating stage process-wide. The semaphore is
/// that admission token; the mutex behind it makes the exclusivity hold
/// even if the gate were misconfigured. Retrieval and assembly are cheap
/// and run without the token.
pub struct QueryPipeline {
    retriever: Retriever,
    assembler: PromptAssembler,
    generator: Arc<Mutex<Box<dyn TextGenerator>>>,
    gate: Arc<Semaphore>,
    cfg: PipelineConfig,
}

impl QueryPipeline {
    pub fn new(
        retriever: Retriever,
        assembler: PromptAssembler,
        generator: Box<dyn TextGenerator>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            retriever,
            assembler,
            generator: Arc::new(Mutex::new(generator)),
            gate: Arc::new(Semaphore::new(1)),
            cfg,
        }
    }

    pub async fn query(&self, query: Query) -> Result<Answer> {
        let started = Instant::now();
        match self.run(&query).await {
            Ok(answer) => {
                trace_state(RequestState::Completed);
                tracing::info!(
                    ms = started.elapsed().as_millis() as u64,
                    sources = answer.sources.len(),
                    finished = answer.finished,
                    "request completed"
                );
                Ok(answer)
            }
            Err(err) => {
                trace_state(RequestState::Failed);
                tracing::warn!(error = %err, "request failed");
                Err(err)
            }
        }
    }

    async fn run(&self, query: &Query) -> Result<Answer> {
        trace_state(RequestState::Received);
        if query.text.trim().is_empty() {
            return Err(Error::Embedding("empty query text".to_string()));
        }
        let deadline = Instant::now() + self.cfg.request_timeout;

        let intent = detect_intent(&query.text);
        if intent == Intent::Greeting {
            // Greetings never touch the index or the model.
            return Ok(Answer {
                text: GREETING_REPLY.to_string(),
                sources: vec![],
                prompt_truncated: false,
                finished: true,
                truncated: false,
            });
        }

        let retrieval = if intent == Intent::ShortChat {
            RetrievalResult::default()
        } else {
            trace_state(RequestState::Retrieving);
            self.retriever.retrieve(query)?
        };

        trace_state(RequestState::Assembling);
        let prompt = self.assembler.assemble(query, &retrieval)?;

        trace_state(RequestState::Generating);
        let permit = self.admit().await?;
        let max_new_tokens = match intent {
            Intent::ShortChat => self.cfg.short_chat_max_new_tokens,
            _ => self.cfg.max_new_tokens,
        };
        let options = GenerationOptions {
            max_new_tokens,
            stop_sequences: self.cfg.stop_sequences.clone(),
            deadline: Some(deadline),
        };
        let generator = Arc::clone(&self.generator);
        let prompt_text = prompt.text.clone();
        let generation = tokio::task::spawn_blocking(move || {
            let mut guard = generator
                .lock()
                .map_err(|_| Error::Generation("generator lock poisoned".to_string()))?;
            guard.generate(&prompt_text, &options)
        })
        .await
        .map_err(|e| Error::Generation(format!("generation task failed: {e}")))??;
        drop(permit);

        Ok(Answer {
            text: generation.text,
            sources: retrieval
                .hits
                .iter()
                .map(|h| SourceRef { id: h.id.clone(), score: h.score })
                .collect(),
            prompt_truncated: prompt.truncated,
            finished: generation.finished,
            truncated: generation.truncated,
        })
    }

    /// Acquire the single-flight admission token, or fail with
    /// `ServiceBusy` per the configured queue policy.
    async fn admit(&self) -> Result<OwnedSemaphorePermit> {
        match self.cfg.queue_max_wait {
            None => Arc::clone(&self.gate)
                .try_acquire_owned()
                .map_err(|_| Error::ServiceBusy),
            Some(wait) => tokio::time::timeout(wait, Arc::clone(&self.gate).acquire_owned())
                .await
                .map_err(|_| Error::ServiceBusy)?
                .map_err(|_| Error::ServiceBusy),
        }
    }
}

fn trace_state(state: RequestState) {
    tracing::debug!(state = state.as_str(), "pipeline state");
}
