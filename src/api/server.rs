//! HTTP server setup: router and API routes.
//!
//! Every route answers plain text. Errors from the core are logged and
//! rendered as a text description; nothing here crashes the serving process.

use axum::Router;
use axum::extract::{Query, State};
use axum::routing::get;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::OnceLock;
use tower_http::cors::{Any, CorsLayer};

use crate::agent::QueryOrchestrator;
use crate::vector::{MetadataIndexer, MetadataSearch, RebuildOutcome};

/// Session used when the caller does not name one.
const DEFAULT_SESSION: &str = "user-123";

/// Shared state behind the API routes.
pub struct ApiState {
    pub orchestrator: Arc<QueryOrchestrator>,
    pub indexer: Arc<MetadataIndexer>,
    pub search: Arc<MetadataSearch>,
}

/// Start the HTTP server on the given address.
///
/// Returns a handle that resolves when the server shuts down. The caller
/// passes a `tokio::sync::watch::Receiver<bool>` for graceful shutdown.
pub async fn start_http_server(
    bind: SocketAddr,
    state: Arc<ApiState>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/ai", get(direct_ask))
        .route("/ai/ask", get(smart_ask))
        .route("/admin/reindex", get(reindex));

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "HTTP server listening");

    let handle = tokio::spawn(async move {
        let mut shutdown = shutdown_rx;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|v| *v).await;
            })
            .await
            .ok();
    });

    Ok(handle)
}

// -- API handlers --

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct DirectParams {
    prompt: Option<String>,
}

async fn direct_ask(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<DirectParams>,
) -> String {
    let prompt = params.prompt.unwrap_or_else(|| "Hello.".to_string());
    tracing::info!(%prompt, "direct question");

    match state.orchestrator.direct_answer(&prompt).await {
        Ok(answer) => answer,
        Err(error) => {
            tracing::error!(%error, "direct answer failed");
            format!("Request failed: {error}")
        }
    }
}

#[derive(Deserialize)]
struct AskParams {
    prompt: String,
    session: Option<String>,
}

async fn smart_ask(State(state): State<Arc<ApiState>>, Query(params): Query<AskParams>) -> String {
    // Help requests are answered from the index alone; the LLM is never
    // involved.
    if is_help_request(&params.prompt) {
        return match state.search.list_all_entities().await {
            Ok(listing) => help_reply(&listing),
            Err(error) => {
                tracing::error!(%error, "entity listing failed");
                format!("Request failed: {error}")
            }
        };
    }

    let session = params.session.as_deref().unwrap_or(DEFAULT_SESSION);
    match state.orchestrator.smart_answer(session, &params.prompt).await {
        Ok(answer) => answer,
        Err(error) => {
            tracing::error!(%error, "smart answer failed");
            format!("Request failed: {error}")
        }
    }
}

async fn reindex(State(state): State<Arc<ApiState>>) -> String {
    tracing::info!("manual metadata reindex requested");

    match state.indexer.rebuild_index().await {
        Ok(RebuildOutcome::Completed(stats)) => format!(
            "Indexing finished: {}/{} documents indexed, {} failed. Check the logs for details.",
            stats.indexed, stats.total, stats.failed
        ),
        Ok(RebuildOutcome::AlreadyRunning) => "Indexing is already in progress.".to_string(),
        Err(error) => {
            tracing::error!(%error, "reindex failed");
            format!("Indexing failed: {error}")
        }
    }
}

// -- Help intercept --

/// Cheap local check for "what can this thing do" questions.
fn is_help_request(prompt: &str) -> bool {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        regex::Regex::new(r"(?i)(help|what can you do|what do you know|tables|available data)")
            .expect("valid help pattern")
    });
    pattern.is_match(prompt)
}

fn help_reply(listing: &str) -> String {
    format!(
        "### Available backend data:\n{listing}\n\n*Example: 'Show 5 warehouses' or 'How many counterparties are in the base'*"
    )
}
