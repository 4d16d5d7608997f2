//! Request orchestration: Retriever → PromptAssembler → Generator under a
//! single-flight admission gate.

pub mod intent;
pub mod pipeline;
pub mod prompt;
pub mod retriever;

pub use intent::{detect_intent, Intent};
pub use pipeline::{PipelineConfig, QueryPipeline};
pub use prompt::PromptAssembler;
pub use retriever::Retriever;
