use std::sync::Arc;
use std::time::Duration;

use ragserve_core::error::Error;
use ragserve_core::traits::{Embedder, TextGenerator, VectorSearcher};
use ragserve_core::types::Query;
use ragserve_embed::FakeEmbedder;
use ragserve_generate::MockGenerator;
use ragserve_index::{IndexEntry, IndexSlot, VectorIndex};
use ragserve_pipeline::{PipelineConfig, PromptAssembler, QueryPipeline, Retriever};

const DIM: usize = 1024;

fn loaded_slot(docs: &[(&str, &str)]) -> Arc<IndexSlot> {
    let embedder = FakeEmbedder::default();
    let entries: Vec<IndexEntry> = docs
        .iter()
        .map(|(source, text)| {
            let vector = embedder
                .embed_batch(&[(*text).to_string()])
                .expect("embed")
                .remove(0);
            IndexEntry {
                id: format!("{source}:0"),
                source: (*source).to_string(),
                text: (*text).to_string(),
                vector,
            }
        })
        .collect();
    let slot = IndexSlot::empty();
    slot.install(VectorIndex::from_entries(DIM, entries).expect("index"));
    Arc::new(slot)
}

fn pipeline_with(
    docs: &[(&str, &str)],
    generator: Box<dyn TextGenerator>,
    threshold: f32,
    cfg: PipelineConfig,
) -> QueryPipeline {
    let slot = loaded_slot(docs);
    let retriever = Retriever::new(
        Box::new(FakeEmbedder::default()),
        slot as Arc<dyn VectorSearcher>,
        threshold,
    );
    let assembler = PromptAssembler::new(4096, cfg.max_new_tokens);
    QueryPipeline::new(retriever, assembler, generator, cfg)
}

fn query(text: &str, top_k: usize) -> Query {
    Query { text: text.to_string(), top_k }
}

const CORPUS: &[(&str, &str)] = &[
    ("d1", "cats are mammals"),
    ("d2", "rockets use propellant"),
];

#[tokio::test]
async fn retrieves_the_right_document_and_keeps_the_question_verbatim() {
    let pipeline = pipeline_with(CORPUS, Box::new(MockGenerator::echo()), 0.0, PipelineConfig::default());
    let answer = pipeline
        .query(query("tell me about cats", 1))
        .await
        .expect("query");

    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].id, "d1:0");
    // Echo generator returns the assembled prompt: it must carry the query
    // text verbatim and the retrieved snippet.
    assert!(answer.text.contains("tell me about cats"));
    assert!(answer.text.contains("cats are mammals"));
    assert!(!answer.text.contains("rockets use propellant"));
}

#[tokio::test]
async fn all_hits_below_threshold_is_an_answer_not_an_error() {
    let pipeline = pipeline_with(CORPUS, Box::new(MockGenerator::echo()), 0.99, PipelineConfig::default());
    let answer = pipeline
        .query(query("what is the meaning of life", 5))
        .await
        .expect("empty retrieval must still answer");

    assert!(answer.sources.is_empty());
    assert!(answer.text.contains("No retrieved context."));
}

#[tokio::test]
async fn second_request_is_rejected_while_generating() {
    let generator = MockGenerator::with_reply("word ".repeat(500))
        .with_token_delay(Duration::from_millis(10));
    let pipeline = Arc::new(pipeline_with(CORPUS, Box::new(generator), 0.0, PipelineConfig::default()));

    let first = {
        let p = Arc::clone(&pipeline);
        tokio::spawn(async move { p.query(query("tell me all about cats", 1)).await })
    };
    // Let the first request reach the generator before contending.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let second = pipeline.query(query("tell me all about rockets", 1)).await;
    assert!(matches!(second, Err(Error::ServiceBusy)), "got {second:?}");

    let first = first.await.expect("join").expect("first query succeeds");
    assert!(!first.text.is_empty());
}

#[tokio::test]
async fn queued_requests_run_one_after_another_without_interleaving() {
    let generator = MockGenerator::echo().with_token_delay(Duration::from_millis(2));
    let cfg = PipelineConfig { queue_max_wait: Some(Duration::from_secs(30)), ..PipelineConfig::default() };
    let pipeline = Arc::new(pipeline_with(CORPUS, Box::new(generator), 0.0, cfg));

    let a = {
        let p = Arc::clone(&pipeline);
        tokio::spawn(async move { p.query(query("first question about cats", 1)).await })
    };
    let b = {
        let p = Arc::clone(&pipeline);
        tokio::spawn(async move { p.query(query("second question about rockets", 1)).await })
    };

    let a = a.await.expect("join").expect("first answer");
    let b = b.await.expect("join").expect("second answer");

    // Each echoed prompt contains exactly its own question: interleaved
    // generation would mix them.
    assert!(a.text.contains("first question about cats"));
    assert!(!a.text.contains("second question about rockets"));
    assert!(b.text.contains("second question about rockets"));
    assert!(!b.text.contains("first question about cats"));
}

#[tokio::test]
async fn deadline_expiry_returns_partial_output() {
    let generator = MockGenerator::with_reply("word ".repeat(1000))
        .with_token_delay(Duration::from_millis(5));
    let cfg = PipelineConfig {
        request_timeout: Duration::from_millis(150),
        ..PipelineConfig::default()
    };
    let pipeline = pipeline_with(CORPUS, Box::new(generator), 0.0, cfg);

    let answer = pipeline
        .query(query("tell me a very long story", 1))
        .await
        .expect("timeout must surface as a partial answer, not an error");

    assert!(!answer.finished, "deadline expiry reports finished=false");
    assert!(!answer.text.is_empty(), "partial text is preserved");
}

#[tokio::test]
async fn generation_budget_bounds_the_answer() {
    let cfg = PipelineConfig { max_new_tokens: 5, ..PipelineConfig::default() };
    let pipeline = pipeline_with(CORPUS, Box::new(MockGenerator::new()), 0.0, cfg);

    let answer = pipeline
        .query(query("please explain everything about cats", 1))
        .await
        .expect("query");

    assert!(answer.text.split_whitespace().count() <= 5);
    assert!(answer.truncated, "budget exhaustion is reported as truncation");
}

#[tokio::test]
async fn greeting_short_circuits_the_model() {
    let pipeline = pipeline_with(CORPUS, Box::new(MockGenerator::echo()), 0.0, PipelineConfig::default());
    let answer = pipeline.query(query("hi", 5)).await.expect("greeting");

    assert!(answer.sources.is_empty());
    assert!(answer.finished);
    // Not an echoed prompt: generation never ran.
    assert!(!answer.text.contains("Context:"));
}

#[tokio::test]
async fn short_chat_skips_retrieval() {
    let pipeline = pipeline_with(CORPUS, Box::new(MockGenerator::echo()), 0.0, PipelineConfig::default());
    let answer = pipeline.query(query("thanks a lot", 5)).await.expect("short chat");

    assert!(answer.sources.is_empty(), "short inputs skip retrieval");
    assert!(answer.text.contains("No retrieved context."));
}

#[tokio::test]
async fn empty_query_fails_with_embedding_error() {
    let pipeline = pipeline_with(CORPUS, Box::new(MockGenerator::new()), 0.0, PipelineConfig::default());
    let err = pipeline.query(query("   ", 5)).await.expect_err("empty query");
    assert!(matches!(err, Error::Embedding(_)), "got {err:?}");
}
