//! Leaderboard HTTP API.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use crate::leaderboard::board::{
    Leaderboard, LeaderboardError, LeaderboardRow, ScoreSubmission, Stats, MAX_LEADERBOARD_ROWS,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    board: Arc<RwLock<Leaderboard>>,
}

impl AppState {
    /// Wrap a store.
    pub fn new(board: Leaderboard) -> Self {
        Self { board: Arc::new(RwLock::new(board)) }
    }
}

/// Response to an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Rank of the submitted score.
    pub rank: usize,
    /// Confirmation text.
    pub message: String,
}

/// Leaderboard listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    /// Ranked rows.
    pub leaderboard: Vec<LeaderboardRow>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

impl From<LeaderboardError> for ApiError {
    fn from(e: LeaderboardError) -> Self {
        match e {
            LeaderboardError::Validation(_) => api_error(StatusCode::BAD_REQUEST, "Invalid player name"),
            other => {
                error!("Leaderboard storage failed: {}", other);
                api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

/// Routes with permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/submit-score", post(submit_score))
        .route("/api/leaderboard", get(leaderboard))
        .route("/api/stats", get(stats))
        .with_state(state)
        .layer(cors)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn submit_score(
    State(state): State<AppState>,
    payload: Result<Json<ScoreSubmission>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(submission) = payload.map_err(|e| {
        warn!("Rejected score submission: {}", e);
        api_error(StatusCode::BAD_REQUEST, e.body_text())
    })?;

    let rank = state.board.write().await.submit(submission, Utc::now())?;
    Ok(Json(SubmitResponse {
        rank,
        message: "Score submitted successfully".to_string(),
    }))
}

async fn leaderboard(State(state): State<AppState>) -> Json<LeaderboardResponse> {
    let rows = state.board.read().await.top(MAX_LEADERBOARD_ROWS, Utc::now());
    Json(LeaderboardResponse { leaderboard: rows })
}

async fn stats(State(state): State<AppState>) -> Json<Stats> {
    Json(state.board.read().await.stats())
}
