use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use ragserve_core::config::Config;
use ragserve_core::error::Error;
use ragserve_core::traits::VectorSearcher;
use ragserve_core::types::Query;
use ragserve_embed::get_default_embedder;
use ragserve_generate::get_default_generator;
use ragserve_index::store::DOCUMENTS_TABLE;
use ragserve_index::{IndexSlot, VectorIndex};
use ragserve_pipeline::{PipelineConfig, PromptAssembler, QueryPipeline, Retriever};

#[derive(Clone)]
struct AppState {
    pipeline: Arc<QueryPipeline>,
    slot: Arc<IndexSlot>,
    default_top_k: usize,
}

#[derive(Deserialize)]
struct QueryRequest {
    message: String,
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    index_loaded: bool,
    documents: usize,
}

// One worker, one async lane: requests are handled strictly in arrival
// order, and the admission gate in the pipeline keeps that true even if the
// runtime is ever widened.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
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

    let index_dir: String = config
        .get("paths.index_dir")
        .unwrap_or_else(|_| "storage/index".to_string());
    let embed_model_dir = config.get::<String>("paths.embed_model_dir").ok();
    let generator_model = config.get::<String>("paths.generator_model").ok();
    let backend: String = config
        .get("generation.backend")
        .unwrap_or_else(|_| "gguf".to_string());
    let default_top_k: usize = config.get("retrieval.top_k").unwrap_or_else(|_| 5);
    let score_threshold: f32 = config.get("retrieval.score_threshold").unwrap_or_else(|_| 0.25);
    let max_new_tokens: usize = config.get("generation.max_new_tokens").unwrap_or_else(|_| 1024);
    let max_context_tokens: usize =
        config.get("generation.max_context_tokens").unwrap_or_else(|_| 4096);
    let request_timeout_secs: u64 =
        config.get("server.request_timeout_secs").unwrap_or_else(|_| 240);
    let queue_max_wait_secs: u64 =
        config.get("admission.queue_max_wait_secs").unwrap_or_else(|_| 0);

    if !(180..=300).contains(&request_timeout_secs) {
        tracing::warn!(
            request_timeout_secs,
            "request timeout outside the expected 180-300s range for local generation"
        );
    }
    let workers: usize = config.get("server.workers").unwrap_or_else(|_| 1);
    if workers != 1 {
        tracing::warn!(
            workers,
            "this deployment shape is single-worker; the model is loaded once \
             and the admission gate serializes generation regardless"
        );
    }

    let embedder = get_default_embedder(embed_model_dir.as_deref().map(Path::new))?;

    // Load the index before serving. A missing table only means the indexer
    // has not run yet: serve anyway and answer 503 until it has. Any other
    // load failure is fatal rather than serving a half-initialized process.
    let slot = Arc::new(IndexSlot::empty());
    let conn = ragserve_index::store::open_db(&index_dir).await?;
    match VectorIndex::load(&conn, DOCUMENTS_TABLE, Some(embedder.id())).await {
        Ok(index) => slot.install(index),
        Err(Error::NotFound(msg)) => {
            tracing::warn!("{msg}; queries get 503 until the indexer has run");
        }
        Err(e) => return Err(e.into()),
    }

    let generator = get_default_generator(&backend, generator_model.as_deref().map(Path::new))?;

    let retriever = Retriever::new(
        embedder,
        Arc::clone(&slot) as Arc<dyn VectorSearcher>,
        score_threshold,
    );
    let assembler = PromptAssembler::new(max_context_tokens, max_new_tokens);
    let pipeline_cfg = PipelineConfig {
        request_timeout: Duration::from_secs(request_timeout_secs),
        max_new_tokens,
        short_chat_max_new_tokens: 100,
        queue_max_wait: (queue_max_wait_secs > 0).then(|| Duration::from_secs(queue_max_wait_secs)),
        stop_sequences: vec![],
    };
    let pipeline = Arc::new(QueryPipeline::new(retriever, assembler, generator, pipeline_cfg));

    let state = AppState { pipeline, slot, default_top_k };
    let app = Router::new()
        .route("/api/query", post(handle_query))
        .route("/healthz", get(handle_healthz))
        .with_state(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .or_else(|| config.get::<u16>("server.port").ok())
        .unwrap_or(8000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "ragserve listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_query(State(state): State<AppState>, Json(req): Json<QueryRequest>) -> Response {
    if req.message.trim().is_empty() {
        return error_response(&Error::Embedding("message must not be empty".to_string()));
    }
    let query = Query {
        text: req.message,
        top_k: req.top_k.unwrap_or(state.default_top_k).max(1),
    };
    match state.pipeline.query(query).await {
        Ok(answer) => Json(answer).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn handle_healthz(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        index_loaded: state.slot.is_loaded(),
        documents: state.slot.document_count(),
    })
}

fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::ServiceBusy | Error::IndexNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
        Error::PromptTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        Error::Embedding(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = Json(ErrorBody { error: err.to_string() });
    if matches!(err, Error::ServiceBusy) {
        (status, [(header::RETRY_AFTER, "5")], body).into_response()
    } else {
        (status, body).into_response()
    }
}
