//! HTTP wire protocol for AccessChain
//!
//! Exposes the peer-to-peer routes every node serves (chain exchange, join,
//! block validation, local access-key checks) alongside the client routes
//! (save-transaction, lookups, reliability verification) and a few health
//! endpoints.

use axum::{
    extract::{Request, State},
    http::{self, header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::blockchain::{Block, NOT_FOUND};
use crate::error::ChainError;
use crate::ledger::{Ledger, NodeState, NodeStatus};
use crate::network::{AccessForm, AccessKeyForm, BlockEnvelope, DoorIdForm, JoinForm, JoinResponse, LookupResponse};
use crate::registry::PeerEntry;

/// Shared state behind every route.
#[derive(Clone)]
pub struct ApiNode {
    pub ledger: Arc<Ledger>,
    stats: Arc<RwLock<ApiStats>>,
}

impl ApiNode {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            stats: Arc::new(RwLock::new(ApiStats::new())),
        }
    }
}

/// API statistics and monitoring
#[derive(Debug, Default, Clone)]
pub struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Ledger(ChainError),
    InvalidInput(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Ledger(e) => {
                let status = match &e {
                    ChainError::InvalidState(_) => StatusCode::CONFLICT,
                    ChainError::DecryptionFault | ChainError::Crypto(_) | ChainError::ChainIntegrity(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    ChainError::Transport(_) => StatusCode::BAD_GATEWAY,
                    ChainError::Persistence(_)
                    | ChainError::Io(_)
                    | ChainError::Serialization(_)
                    | ChainError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::Ledger(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// A decryption fault is an answer, not a failure: the caller gets the marker.
fn join_reply(result: Result<Vec<PeerEntry>, ChainError>) -> ApiResult<JoinResponse> {
    match result {
        Ok(peers) => Ok(Json(JoinResponse::Peers(peers))),
        Err(ChainError::DecryptionFault) => Ok(Json(JoinResponse::Fault(ChainError::DecryptionFault.to_string()))),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Middleware
// ============================================================================

async fn logging_middleware(State(node): State<Arc<ApiNode>>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();
    let node_state = node.ledger.state();

    info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        node_state = ?node_state,
        "api.request"
    );

    response
}

async fn stats_middleware(State(node): State<Arc<ApiNode>>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    let success = response.status().is_success();
    node.stats.write().record_request(success);
    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints (for testing)
pub fn build_api_router(node: Arc<ApiNode>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(vec![header::CONTENT_TYPE]);

    Router::new()
        // Peer protocol
        .route("/get-chain", get(get_chain))
        .route("/network-identity", get(network_identity))
        .route("/request-join", post(request_join))
        .route("/accept-join", post(accept_join))
        .route("/local-validation", post(local_validation))
        .route("/validate-block", post(validate_block))
        .route("/verify-access-key-locally", post(verify_access_key_locally))
        // Client routes
        .route("/save-transaction", post(save_transaction))
        .route("/lookup-by-access-key", post(lookup_by_access_key))
        .route("/lookup-by-door-id", post(lookup_by_door_id))
        .route("/request-reliability-verification", post(request_reliability_verification))
        .route("/request-chain-integrity", get(request_chain_integrity))
        .route("/request-network-integrity", get(request_network_integrity))
        // System
        .route("/node-state", get(node_state))
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        .layer(middleware::from_fn_with_state(node.clone(), logging_middleware))
        .layer(middleware::from_fn_with_state(node.clone(), stats_middleware))
        .with_state(node)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serves the wire protocol on `0.0.0.0:port` until the listener fails.
pub async fn run_api_server(ledger: Arc<Ledger>, port: u16) -> Result<(), ChainError> {
    let app = build_api_router(Arc::new(ApiNode::new(ledger)));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "API server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn get_chain(State(node): State<Arc<ApiNode>>) -> Result<Response, ApiError> {
    let body = node.ledger.chain_json()?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

async fn network_identity(State(node): State<Arc<ApiNode>>) -> Json<PeerEntry> {
    Json(node.ledger.network_identity())
}

async fn request_join(State(node): State<Arc<ApiNode>>, Form(form): Form<JoinForm>) -> ApiResult<JoinResponse> {
    join_reply(node.ledger.handle_request_join(&form).await)
}

async fn accept_join(State(node): State<Arc<ApiNode>>, Form(form): Form<JoinForm>) -> ApiResult<JoinResponse> {
    join_reply(node.ledger.accept_join(&form).await)
}

async fn local_validation(State(node): State<Arc<ApiNode>>, Json(envelope): Json<BlockEnvelope>) -> ApiResult<bool> {
    Ok(Json(node.ledger.accept_local_validation(envelope.block).await?))
}

async fn validate_block(State(node): State<Arc<ApiNode>>, Json(envelope): Json<BlockEnvelope>) -> ApiResult<bool> {
    Ok(Json(node.ledger.save_incoming_block(envelope.block).await?))
}

async fn verify_access_key_locally(State(node): State<Arc<ApiNode>>, Form(form): Form<AccessForm>) -> ApiResult<i64> {
    let found = node.ledger.verify_access_key_locally(&form.door_id, &form.access_key)?;
    Ok(Json(found.map_or(NOT_FOUND, |n| n as i64)))
}

async fn save_transaction(State(node): State<Arc<ApiNode>>, Form(form): Form<AccessForm>) -> ApiResult<Block> {
    require("doorId", &form.door_id)?;
    require("accessKey", &form.access_key)?;
    Ok(Json(node.ledger.save_transaction(&form.door_id, &form.access_key).await?))
}

async fn lookup_by_access_key(State(node): State<Arc<ApiNode>>, Form(form): Form<AccessKeyForm>) -> ApiResult<LookupResponse> {
    Ok(Json(node.ledger.lookup_by_access_key(&form.access_key)?.into()))
}

async fn lookup_by_door_id(State(node): State<Arc<ApiNode>>, Form(form): Form<DoorIdForm>) -> ApiResult<LookupResponse> {
    Ok(Json(node.ledger.lookup_by_door_id(&form.door_id)?.into()))
}

async fn request_reliability_verification(
    State(node): State<Arc<ApiNode>>,
    Form(form): Form<AccessForm>,
) -> ApiResult<bool> {
    Ok(Json(
        node.ledger
            .request_reliability_verification(&form.door_id, &form.access_key)
            .await?,
    ))
}

async fn request_chain_integrity(State(node): State<Arc<ApiNode>>) -> ApiResult<bool> {
    Ok(Json(node.ledger.request_chain_integrity().await?))
}

async fn request_network_integrity(State(node): State<Arc<ApiNode>>) -> ApiResult<bool> {
    Ok(Json(node.ledger.request_network_integrity().await?))
}

async fn node_state(State(node): State<Arc<ApiNode>>) -> ApiResult<NodeStatus> {
    Ok(Json(node.ledger.status()?))
}

async fn health_check(State(node): State<Arc<ApiNode>>) -> impl IntoResponse {
    let state = node.ledger.state();
    let status = match state {
        NodeState::Active => StatusCode::OK,
        NodeState::Uninitialized | NodeState::AwaitingGenesisOrJoin => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        status,
        Json(serde_json::json!({
            "status": if status == StatusCode::OK { "healthy" } else { "unhealthy" },
            "node_state": state,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

async fn get_api_stats(State(node): State<Arc<ApiNode>>) -> Json<serde_json::Value> {
    let stats = node.stats.read().clone();
    let uptime = stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0);
    Json(serde_json::json!({
        "total_requests": stats.total_requests,
        "successful_requests": stats.successful_requests,
        "failed_requests": stats.failed_requests,
        "uptime_seconds": uptime
    }))
}
