//! HTTP backend for the test-selector wizard
//!
//! Serves the tree document and resolves completed answer paths against the
//! rule table. Health and tree are plain JSON; resolve and reset share one
//! backend session answer map.

use crate::error::{Result, SelectorError};
use crate::rules::{self, Rejection};
use crate::tree::{Answers, DecisionTree};
use axum::{
    Json, Router,
    error_handling::HandleErrorLayer,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

/// Shared state for HTTP server
#[derive(Clone)]
pub struct AppState {
    pub tree: Arc<DecisionTree>,
    pub session: Arc<Mutex<Answers>>,
}

impl AppState {
    pub fn new(tree: DecisionTree) -> Self {
        Self {
            tree: Arc::new(tree),
            session: Arc::new(Mutex::new(Answers::new())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveBody {
    pub answers: Option<Answers>,
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "success": true, "status": "ok" }))
}

pub async fn tree_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "version": state.tree.version,
        "tree": &*state.tree,
    }))
}

pub async fn reset_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.session.lock().await.clear();
    tracing::debug!("backend session cleared");
    Json(json!({ "success": true, "message": "Session cleared." }))
}

/// Resolve an answer map; a missing or empty body falls back to the session answers
pub async fn resolve_handler(
    State(state): State<AppState>,
    body: Option<Json<ResolveBody>>,
) -> Response {
    let requested = body.and_then(|Json(b)| b.answers);
    let answers = match requested {
        Some(answers) => answers,
        None => state.session.lock().await.clone(),
    };

    if let Err(message) = rules::validate_answers(&state.tree, &answers) {
        return bad_request(json!({ "success": false, "error": message }));
    }

    *state.session.lock().await = answers.clone();

    let rejection = match rules::resolve(&state.tree, &answers) {
        Ok(result) => {
            return (
                StatusCode::OK,
                Json(json!({ "success": true, "result": result, "answers": answers })),
            )
                .into_response();
        }
        Err(rejection) => rejection,
    };

    let error = rejection.message();
    match rejection {
        Rejection::Incomplete { missing, active } => bad_request(json!({
            "success": false,
            "error": error,
            "missing_questions": missing,
            "active_questions": active,
        })),
        Rejection::Invalid(_) | Rejection::NoRule => bad_request(json!({
            "success": false,
            "error": error,
            "answers": answers,
        })),
    }
}

fn bad_request(body: serde_json::Value) -> Response {
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn handle_layer_error(err: axum::BoxError, timeout_ms: u64) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        SelectorError::Timeout {
            operation: "request".to_string(),
            timeout_ms,
        }
        .into_response()
    } else {
        SelectorError::Internal {
            message: err.to_string(),
        }
        .into_response()
    }
}

/// Build the `/api` router
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let timeout_ms = request_timeout.as_millis() as u64;
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/tree", get(tree_handler))
        .route("/api/reset", post(reset_handler))
        .route("/api/resolve", post(resolve_handler))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(move |err: axum::BoxError| async move {
                    handle_layer_error(err, timeout_ms)
                }))
                .timeout(request_timeout),
        )
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// Start the HTTP server and run until the listener fails
pub async fn start_http_server(
    tree: DecisionTree,
    bind: SocketAddr,
    request_timeout: Duration,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| SelectorError::Internal {
            message: format!("Failed to bind HTTP listener: {}", e),
        })?;
    serve(listener, tree, request_timeout).await
}

/// Serve on an already-bound listener
pub async fn serve(
    listener: tokio::net::TcpListener,
    tree: DecisionTree,
    request_timeout: Duration,
) -> Result<()> {
    let local = listener.local_addr()?;
    tracing::info!(
        "Starting HTTP server on {} ({} questions, {} rules)",
        local,
        tree.questions.len(),
        tree.rules.len()
    );

    let app = router(AppState::new(tree), request_timeout);
    axum::serve(listener, app)
        .await
        .map_err(|e| SelectorError::Internal {
            message: format!("HTTP server error: {}", e),
        })?;

    Ok(())
}
