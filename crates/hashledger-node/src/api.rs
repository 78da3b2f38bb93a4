use crate::constants::{DEFAULT_TAIL, MAX_TAIL_BLOCKS};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hashledger_core::{Block, Blockchain, ChainStats, LedgerError, Transaction, TransactionRecord};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<Blockchain>,
    pub miner_id: String,
    /// Pending count that triggers a background mine, 0 disables.
    pub auto_mine_threshold: usize,
}

impl AppState {
    pub fn new(chain: Arc<Blockchain>, miner_id: impl Into<String>) -> Self {
        Self {
            chain,
            miner_id: miner_id.into(),
            auto_mine_threshold: 0,
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Deserialize, Default)]
struct MineRequest {
    miner: Option<String>,
}

#[derive(Deserialize)]
struct TailQuery {
    n: Option<usize>,
}

#[derive(Serialize)]
struct Balance {
    address: String,
    balance: f64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/transactions", post(submit_transaction))
        .route("/mempool", get(mempool))
        .route("/mine", post(mine))
        .route("/balance/{address}", get(balance))
        .route("/history/{address}", get(history))
        .route("/chain", get(chain))
        .route("/chain/tail", get(chain_tail))
        .route("/chain/valid", get(chain_valid))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run one mining attempt on the blocking pool.
pub async fn mine_blocking(chain: Arc<Blockchain>, miner: String) -> Result<Block, ApiError> {
    tokio::task::spawn_blocking(move || chain.mine_pending(&miner))
        .await
        .map_err(|e| ApiError::Internal(format!("mining task failed: {e}")))?
        .map_err(ApiError::from)
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn stats(State(state): State<AppState>) -> Json<ChainStats> {
    Json(state.chain.stats())
}

async fn submit_transaction(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let record: TransactionRecord = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid transaction: {e}")))?;
    let tx = state.chain.submit_record(record)?;
    let pending = state.chain.mempool().len();
    if state.auto_mine_threshold > 0 && pending >= state.auto_mine_threshold {
        debug!(pending, threshold = state.auto_mine_threshold, "auto-mine threshold reached");
        let chain = Arc::clone(&state.chain);
        let miner = state.miner_id.clone();
        tokio::spawn(async move {
            match mine_blocking(chain, miner).await {
                Ok(block) => info!(index = block.index(), "auto-mined block"),
                Err(ApiError::Ledger(e)) if e.is_noop() => {}
                Err(e) => warn!(error = %e, "auto-mine failed"),
            }
        });
    }
    Ok((StatusCode::CREATED, Json(tx)))
}

async fn mempool(State(state): State<AppState>) -> Json<Vec<Transaction>> {
    Json(state.chain.pending_transactions())
}

async fn mine(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: MineRequest = if body.iter().all(u8::is_ascii_whitespace) {
        MineRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid mine request: {e}")))?
    };
    let miner = request.miner.unwrap_or_else(|| state.miner_id.clone());
    match mine_blocking(Arc::clone(&state.chain), miner).await {
        Ok(block) => Ok((StatusCode::CREATED, Json(block)).into_response()),
        Err(ApiError::Ledger(e)) if e.is_noop() => {
            Ok((StatusCode::OK, Json(json!({ "status": "noop" }))).into_response())
        }
        Err(e) => Err(e),
    }
}

async fn balance(State(state): State<AppState>, Path(address): Path<String>) -> Json<Balance> {
    let balance = state.chain.get_balance(&address);
    Json(Balance { address, balance })
}

async fn history(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Json<Vec<Transaction>> {
    Json(state.chain.get_history(&address))
}

async fn chain(State(state): State<AppState>) -> Json<Vec<Block>> {
    Json(state.chain.blocks())
}

async fn chain_tail(
    State(state): State<AppState>,
    Query(query): Query<TailQuery>,
) -> Json<Vec<Block>> {
    let n = query.n.unwrap_or(DEFAULT_TAIL).min(MAX_TAIL_BLOCKS);
    Json(state.chain.get_chain_tail(n))
}

async fn chain_valid(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.chain.validate()?;
    Ok(Json(json!({ "valid": true })))
}

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    BadRequest(String),
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Ledger(e) => write!(f, "{e}"),
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => f.write_str(msg),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError::Ledger(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match self {
            ApiError::Ledger(e) => match e {
                LedgerError::Validation(_) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
                LedgerError::EmptyMempool => (StatusCode::OK, json!({ "status": "noop" })),
                LedgerError::Integrity { index, .. } => (
                    StatusCode::CONFLICT,
                    json!({ "valid": false, "index": index, "error": message }),
                ),
                LedgerError::MiningInterrupted(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": message }))
                }
                LedgerError::NotPersisted { index, .. } => {
                    error!(index, error = %message, "block not persisted");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({ "error": message, "index": index }),
                    )
                }
                LedgerError::Persistence(_) | LedgerError::Config(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message }))
                }
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            ApiError::Internal(_) => {
                error!(error = %message, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message }))
            }
        };
        (status, Json(body)).into_response()
    }
}
