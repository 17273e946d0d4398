//! # HTTP API
//!
//! The axum router exposing the node's HTTP surface. These handlers are
//! thin adapters: they parse requests, call into the node runtime's
//! narrow API, and translate the results — nothing here touches the chain
//! directly.
//!
//! ## Endpoints
//!
//! | Method | Path                | Description                               |
//! |--------|---------------------|-------------------------------------------|
//! | GET    | `/health`           | Liveness probe                            |
//! | GET    | `/status`           | Height and peer counts                    |
//! | POST   | `/upload`           | Notarize a document hash, returns 201     |
//! | GET    | `/list`             | All blocks, tip first                     |
//! | GET    | `/verify?hash=<hex>`| Whether a content hash is on the chain    |

use axum::extract::{Query, State};
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use selo_protocol::ledger::{Block, BlockRecord};
use selo_protocol::network::node::NodeHandle;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state available to all request handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Handle into the node runtime's decision loop.
    pub node: NodeHandle,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// A notarization record as it appears in API requests and responses:
/// hex-encoded content hash plus the identifier set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDto {
    /// Hex-encoded digest of the notarized document.
    pub hash: String,
    #[serde(rename = "documentId")]
    pub document_id: String,
    #[serde(rename = "notaryId")]
    pub notary_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub cnpj: String,
}

impl RecordDto {
    fn into_record(self) -> Result<BlockRecord, hex::FromHexError> {
        Ok(BlockRecord {
            content_hash: hex::decode(&self.hash)?,
            document_id: self.document_id,
            notary_id: self.notary_id,
            user_id: self.user_id,
            cnpj: self.cnpj,
        })
    }

    fn from_record(record: &BlockRecord) -> Self {
        Self {
            hash: hex::encode(&record.content_hash),
            document_id: record.document_id.clone(),
            notary_id: record.notary_id.clone(),
            user_id: record.user_id.clone(),
            cnpj: record.cnpj.clone(),
        }
    }
}

/// A block as returned by the API, with hex-encoded hashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDto {
    pub hash: String,
    #[serde(rename = "prevHash")]
    pub prev_hash: String,
    pub nonce: u64,
    pub timestamp: i64,
    pub data: RecordDto,
}

impl BlockDto {
    fn from_block(block: &Block) -> Self {
        Self {
            hash: block.hash_hex(),
            prev_hash: block.prev_hash_hex(),
            nonce: block.nonce,
            timestamp: block.timestamp,
            data: RecordDto::from_record(&block.data),
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/upload", post(upload_handler))
        .route("/list", get(list_handler))
        .route("/verify", get(verify_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.node.status().await {
        Ok(status) => (
            StatusCode::OK,
            Json(json!({
                "version": state.version,
                "height": status.height,
                "knownPeers": status.known_peers,
                "connectedPeers": status.connected_peers,
            })),
        )
            .into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

/// `POST /upload` — notarize a document hash. 201 with the created block,
/// 400 on a malformed body, 500 when insertion fails.
async fn upload_handler(
    State(state): State<AppState>,
    Json(body): Json<RecordDto>,
) -> impl IntoResponse {
    let record = match body.into_record() {
        Ok(record) => record,
        Err(err) => {
            state.metrics.upload_failures_total.inc();
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid content hash: {err}") })),
            )
                .into_response();
        }
    };

    match state.node.add_block(record).await {
        Ok(block) => {
            state.metrics.uploads_total.inc();
            (StatusCode::CREATED, Json(BlockDto::from_block(&block))).into_response()
        }
        Err(err) => {
            state.metrics.upload_failures_total.inc();
            tracing::error!(%err, "failed to notarize upload");
            internal_error(err).into_response()
        }
    }
}

/// `GET /list` — every block, tip first, genesis last.
async fn list_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.node.list_blocks().await {
        Ok(blocks) => {
            let dtos: Vec<BlockDto> = blocks.iter().map(BlockDto::from_block).collect();
            (StatusCode::OK, Json(dtos)).into_response()
        }
        Err(err) => internal_error(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    hash: Option<String>,
}

/// `GET /verify?hash=<hex>` — whether the content hash has been
/// notarized. 400 when the parameter is missing or not hex.
async fn verify_handler(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> impl IntoResponse {
    let Some(hash) = query.hash else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing hash parameter" })),
        )
            .into_response();
    };

    let content_hash = match hex::decode(&hash) {
        Ok(bytes) => bytes,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid hash: {err}") })),
            )
                .into_response();
        }
    };

    match state.node.contains_record(content_hash).await {
        Ok(result) => (StatusCode::OK, Json(json!({ "result": result }))).into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

fn internal_error(err: impl std::fmt::Display) -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.to_string() })),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
