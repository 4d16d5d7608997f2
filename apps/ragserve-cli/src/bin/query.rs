use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ragserve_core::config::Config;
use ragserve_core::traits::VectorSearcher;
use ragserve_core::types::Query;
use ragserve_embed::get_default_embedder;
use ragserve_generate::get_default_generator;
use ragserve_index::store::DOCUMENTS_TABLE;
use ragserve_index::{IndexSlot, VectorIndex};
use ragserve_pipeline::{PipelineConfig, PromptAssembler, QueryPipeline, Retriever};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <question> [--top-k N]", args[0]);
        eprintln!("Example: {} 'tell me about cats' --top-k 3", args[0]);
        std::process::exit(1);
    }
    let question = args[1].clone();
    let mut top_k_arg = None;
    let mut i = 2;
    while i < args.len() {
        if args[i] == "--top-k" {
            if let Some(n) = args.get(i + 1).and_then(|v| v.parse::<usize>().ok()) {
                top_k_arg = Some(n);
                i += 1;
            } else {
                eprintln!("Error: --top-k requires a number");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let index_dir: String = config
        .get("paths.index_dir")
        .unwrap_or_else(|_| "storage/index".to_string());
    let embed_model_dir = config.get::<String>("paths.embed_model_dir").ok();
    let generator_model = config.get::<String>("paths.generator_model").ok();
    let backend: String = config
        .get("generation.backend")
        .unwrap_or_else(|_| "gguf".to_string());
    let top_k = top_k_arg
        .or_else(|| config.get::<usize>("retrieval.top_k").ok())
        .unwrap_or(5)
        .max(1);
    let score_threshold: f32 = config.get("retrieval.score_threshold").unwrap_or_else(|_| 0.25);
    let max_new_tokens: usize = config.get("generation.max_new_tokens").unwrap_or_else(|_| 1024);
    let max_context_tokens: usize =
        config.get("generation.max_context_tokens").unwrap_or_else(|_| 4096);

    println!("🔍 ragserve query\n================");
    println!("Query: {}", question);

    let embedder = get_default_embedder(embed_model_dir.as_deref().map(Path::new))?;
    let conn = ragserve_index::store::open_db(&index_dir).await?;
    let index = VectorIndex::load(&conn, DOCUMENTS_TABLE, Some(embedder.id())).await?;
    let slot = Arc::new(IndexSlot::empty());
    slot.install(index);

    let generator = get_default_generator(&backend, generator_model.as_deref().map(Path::new))?;
    let retriever = Retriever::new(
        embedder,
        Arc::clone(&slot) as Arc<dyn VectorSearcher>,
        score_threshold,
    );
    let assembler = PromptAssembler::new(max_context_tokens, max_new_tokens);
    let cfg = PipelineConfig {
        request_timeout: Duration::from_secs(
            config.get("server.request_timeout_secs").unwrap_or_else(|_| 240),
        ),
        max_new_tokens,
        ..PipelineConfig::default()
    };
    let pipeline = QueryPipeline::new(retriever, assembler, generator, cfg);

    let answer = pipeline.query(Query { text: question, top_k }).await?;

    println!("\n💬 {}", answer.text);
    if !answer.sources.is_empty() {
        println!("\nSources:");
        for (i, s) in answer.sources.iter().enumerate() {
            println!("  {}. score={:.4}  id={}", i + 1, s.score, s.id);
        }
    }
    if answer.prompt_truncated {
        println!("\n⚠️  some retrieved context was dropped to fit the prompt budget");
    }
    if !answer.finished {
        println!("⚠️  generation stopped at the request deadline; answer is partial");
    }
    Ok(())
}
