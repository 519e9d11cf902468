//! HTTP API server for the VQP node.
//!
//! Provides endpoints for health, query processing, response verification
//! and the recent audit trail.

use axum::{
    extract::{Query as QueryParams, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use vqp_core::{ErrorKind, Response, VqpError};
use vqp_engine::adapters::{AuditEntry, MemoryAuditLog};
use vqp_engine::VqpService;

/// Shared state of the HTTP handlers.
pub struct AppState {
    pub service: Arc<VqpService>,
    pub audit: Arc<MemoryAuditLog>,
    pub responder: String,
    pub public_key: Option<String>,
}

// --- Response types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub responder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct VerifyResponse {
    pub valid: bool,
}

#[derive(Deserialize)]
pub struct AuditParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct AuditResponse {
    pub entries: Vec<AuditEntry>,
    pub count: usize,
}

const DEFAULT_AUDIT_LIMIT: usize = 100;

type ApiError = (StatusCode, Json<VqpError>);

/// HTTP status for a protocol error.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidQuery
        | ErrorKind::EvaluationError
        | ErrorKind::UnsupportedResponseMode => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized
        | ErrorKind::ConsentDenied
        | ErrorKind::ReciprocalVerificationFailed => StatusCode::FORBIDDEN,
        ErrorKind::VocabularyNotFound => StatusCode::NOT_FOUND,
        ErrorKind::ObfuscationError => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::NetworkError => StatusCode::BAD_GATEWAY,
        ErrorKind::SignatureFailed | ErrorKind::CryptoError | ErrorKind::ConfigurationError => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn api_error(error: VqpError) -> ApiError {
    (status_for(error.kind()), Json(error))
}

// --- Handlers ---

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        responder: state.responder.clone(),
        public_key: state.public_key.clone(),
    })
}

async fn handle_query(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<serde_json::Value>,
) -> Result<Json<Response>, ApiError> {
    state
        .service
        .process_raw(&raw, None)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn handle_verify(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<serde_json::Value>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let response: Response = serde_json::from_value(raw).map_err(|e| {
        api_error(VqpError::invalid_query(format!("malformed response: {}", e)))
    })?;
    let valid = state.service.verify_response(&response).await;
    Ok(Json(VerifyResponse { valid }))
}

async fn handle_audit(
    State(state): State<Arc<AppState>>,
    QueryParams(params): QueryParams<AuditParams>,
) -> Json<AuditResponse> {
    let entries = state
        .audit
        .recent(params.limit.unwrap_or(DEFAULT_AUDIT_LIMIT))
        .await;
    let count = entries.len();
    Json(AuditResponse { entries, count })
}

// --- Server ---

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/vqp/query", post(handle_query))
        .route("/vqp/verify", post(handle_verify))
        .route("/vqp/audit", get(handle_audit))
        .with_state(state)
}

pub async fn start_api_server(listen_addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(%listen_addr, "HTTP API server started");
    axum::serve(listener, app).await?;
    Ok(())
}
