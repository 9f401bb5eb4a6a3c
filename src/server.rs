//! Long-lived HTTP query service.
//!
//! Binds immediately and loads the engine (model download included) in a
//! background task; until the engine is published, every request that
//! needs it gets `503 Service Unavailable`, which lets callers tell "not
//! yet initialized" apart from "bad query". Queries are pure reads, so
//! concurrent requests share one engine behind an `Arc`; a rebuilt index
//! would be published by swapping the whole engine reference.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::clip::ClipEmbedder;
use crate::engine::{SearchEngine, SearchResult};
use crate::error::{Error, Result};

type SharedEngine = Arc<RwLock<Option<Arc<SearchEngine<ClipEmbedder>>>>>;

#[derive(Clone)]
struct AppState {
    engine: SharedEngine,
    model_id: String,
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default)]
    category_filter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchQueryParams {
    q: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    top_k: usize,
    results: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index_size: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

/// Run the query service until the process is terminated.
///
/// # Errors
///
/// Returns [`Error::Config`] for an unparseable bind address and
/// [`Error::Io`] if the listener cannot be bound.
pub async fn serve(
    bind: &str,
    model_id: String,
    index_path: PathBuf,
    metadata_path: PathBuf,
) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|_| Error::Config(format!("invalid bind address: {bind}")))?;

    let state = AppState {
        engine: Arc::new(RwLock::new(None)),
        model_id: model_id.clone(),
    };

    // Model loading can take minutes on a cold cache; publish the engine
    // once it is ready so health checks respond in the meantime.
    let slot = state.engine.clone();
    tokio::task::spawn_blocking(move || {
        match ClipEmbedder::new(&model_id)
            .and_then(|embedder| SearchEngine::open(embedder, &index_path, &metadata_path))
        {
            Ok(engine) => {
                info!(index_size = engine.len(), "search engine ready");
                *slot.blocking_write() = Some(Arc::new(engine));
            }
            Err(e) => {
                error!(error = %e, "failed to initialize search engine");
                std::process::exit(1);
            }
        }
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/search", post(search_handler).get(search_get_handler))
        .with_state(state);

    info!(addr = %addr, "query service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ready_engine(
    state: &AppState,
) -> std::result::Result<Arc<SearchEngine<ClipEmbedder>>, (StatusCode, Json<ErrorBody>)> {
    state
        .engine
        .read()
        .await
        .clone()
        .ok_or_else(|| error_response(&Error::ServiceNotReady))
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.engine.read().await.clone() {
        Some(engine) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                model: state.model_id.clone(),
                device: Some(engine.embedder().device_name()),
                index_size: Some(engine.len()),
            }),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "loading",
                model: state.model_id.clone(),
                device: None,
                index_size: None,
            }),
        ),
    }
}

async fn search_handler(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> std::result::Result<Json<SearchResponse>, (StatusCode, Json<ErrorBody>)> {
    run_search(state, request).await
}

async fn search_get_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchQueryParams>,
) -> std::result::Result<Json<SearchResponse>, (StatusCode, Json<ErrorBody>)> {
    run_search(
        state,
        SearchRequest {
            query: params.q,
            top_k: params.top_k,
            category_filter: params.category,
        },
    )
    .await
}

async fn run_search(
    state: AppState,
    request: SearchRequest,
) -> std::result::Result<Json<SearchResponse>, (StatusCode, Json<ErrorBody>)> {
    let engine = ready_engine(&state).await?;

    // Embedding and the index scan are synchronous, potentially
    // accelerator-backed calls; keep them off the async workers.
    let SearchRequest {
        query,
        top_k,
        category_filter,
    } = request;
    let query_for_task = query.clone();
    let results = tokio::task::spawn_blocking(move || {
        engine.search(&query_for_task, top_k, category_filter.as_deref())
    })
    .await
    .map_err(|e| error_response(&Error::Index(format!("search task failed: {e}"))))?
    .map_err(|e| error_response(&e))?;

    Ok(Json(SearchResponse {
        query,
        top_k,
        results,
    }))
}

fn error_response(err: &Error) -> (StatusCode, Json<ErrorBody>) {
    let status = match err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::ServiceNotReady => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            message: err.to_string(),
        }),
    )
}
