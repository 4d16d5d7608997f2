use std::{env, fs, path::Path, path::PathBuf};

use ragserve_core::chunker::{Chunker, ChunkingConfig};
use ragserve_core::config::Config;
use ragserve_embed::get_default_embedder;
use ragserve_index::store::DOCUMENTS_TABLE;
use ragserve_index::DocumentWriter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut corpus_dir = None;
    let mut limit = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--limit" => {
                if i + 1 < args.len() {
                    if let Ok(n) = args[i + 1].parse::<usize>() {
                        limit = Some(n);
                        i += 1;
                    } else {
                        eprintln!("Error: --limit requires a number");
                        std::process::exit(1);
                    }
                } else {
                    eprintln!("Error: --limit requires a number");
                    std::process::exit(1);
                }
            }
            _ if !args[i].starts_with('-') => corpus_dir = Some(PathBuf::from(&args[i])),
            _ => {}
        }
        i += 1;
    }
    let corpus_dir = corpus_dir.unwrap_or_else(|| {
        let dir: String = config
            .get("ingest.corpus_dir")
            .unwrap_or_else(|_| "data/corpus".to_string());
        PathBuf::from(dir)
    });

    println!("ragserve indexer\n================");
    println!("Corpus directory: {}", corpus_dir.display());

    let chunking = ChunkingConfig {
        chunk_chars: config.get("ingest.chunk_chars").unwrap_or_else(|_| 800),
        max_chunks_per_doc: config.get("ingest.max_chunks_per_doc").unwrap_or_else(|_| 200),
        max_text_chars: config.get("ingest.max_text_chars").unwrap_or_else(|_| 200_000),
    };
    let chunker = Chunker::new(chunking);
    let chunks = match limit {
        Some(n) => {
            println!("🔢 Limiting to first {} files", n);
            chunker.process_directory_limited(&corpus_dir, n)?
        }
        None => chunker.process_directory(&corpus_dir)?,
    };
    if chunks.is_empty() {
        println!("Nothing to index");
        return Ok(());
    }

    let index_dir = PathBuf::from(
        config
            .get::<String>("paths.index_dir")
            .unwrap_or_else(|_| "storage/index".to_string()),
    );
    // Full rebuild: the previous dataset is replaced, never appended to.
    if index_dir.exists() {
        fs::remove_dir_all(&index_dir)?;
    }
    fs::create_dir_all(&index_dir)?;

    let embed_model_dir = config.get::<String>("paths.embed_model_dir").ok();
    let embedder = get_default_embedder(embed_model_dir.as_deref().map(Path::new))?;

    let rt = tokio::runtime::Runtime::new()?;
    let written = rt.block_on(async {
        let writer = DocumentWriter::new(&index_dir, DOCUMENTS_TABLE).await?;
        writer.index_chunks(&chunks, embedder.as_ref()).await
    })?;

    println!("\n✅ Indexing completed ({} chunks)", written);
    println!("💡 To serve: cargo run --bin ragserve-server");
    println!("💡 To query once: cargo run --bin ragserve-query \"<question>\"");
    Ok(())
}
